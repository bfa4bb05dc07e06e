//! PostgreSQL store backed by an sqlx connection pool

use super::{CredentialStore, StoreConnector};
use crate::acl::{AclRule, RuleRow};
use crate::auth::UserRecord;
use crate::config::{safe_dsn, EngineConfig, PoolConfig, QueryConfig};
use crate::error::{ConfigError, EngineError, EngineResult, RowError};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Store reads over a live PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    queries: Arc<QueryConfig>,
}

impl PgStore {
    pub fn new(pool: PgPool, queries: Arc<QueryConfig>) -> Self {
        Self { pool, queries }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn fetch_user(&self, username: &str) -> EngineResult<Option<UserRecord>> {
        let row = sqlx::query(&self.queries.user)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, "users"))?;

        row.map(|row| decode_user(&row)).transpose().map_err(EngineError::from)
    }

    async fn client_binding_exists(&self, username: &str, client_id: &str) -> EngineResult<bool> {
        let row = sqlx::query(&self.queries.client_binding)
            .bind(username)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, "client_bindings"))?;

        Ok(row.is_some())
    }

    async fn fetch_acl_rules(&self, username: &str) -> EngineResult<Vec<RuleRow>> {
        let rows = sqlx::query(&self.queries.acl)
            .bind(username)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(e, "acls"))?;

        debug!(username = %username, rows = rows.len(), "Fetched ACL rows");

        Ok(rows
            .iter()
            .enumerate()
            .map(|(index, row)| decode_rule(index, row, username))
            .collect())
    }
}

fn decode_user(row: &PgRow) -> Result<UserRecord, RowError> {
    let password_hash = row
        .try_get::<String, _>("password_hash")
        .map_err(|e| RowError::new("users", 0, e.to_string()))?;
    let enabled = row
        .try_get::<bool, _>("enabled")
        .map_err(|e| RowError::new("users", 0, e.to_string()))?;

    // Optional columns; absent from the default query
    let scheme = row.try_get::<Option<String>, _>("scheme").ok().flatten();
    let salt = row.try_get::<Option<String>, _>("salt").ok().flatten();

    Ok(UserRecord {
        password_hash,
        enabled,
        scheme,
        salt,
    })
}

fn decode_rule(index: usize, row: &PgRow, username: &str) -> RuleRow {
    let owner = row
        .try_get::<String, _>("username")
        .unwrap_or_else(|_| username.to_string());
    let pattern = row
        .try_get::<String, _>("pattern")
        .map_err(|e| RowError::new("acls", index, e.to_string()))?;
    let acc = decode_acc(row).map_err(|e| RowError::new("acls", index, e.to_string()))?;

    AclRule::from_row(index, owner, pattern, acc)
}

/// `acc` as integer, smallint or bigint
fn decode_acc(row: &PgRow) -> Result<i64, sqlx::Error> {
    row.try_get::<i32, _>("acc")
        .map(i64::from)
        .or_else(|_| row.try_get::<i64, _>("acc"))
        .or_else(|_| row.try_get::<i16, _>("acc").map(i64::from))
}

fn classify(err: sqlx::Error, table: &'static str) -> EngineError {
    match err {
        sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => {
            EngineError::StoreProtocol(RowError::new(table, 0, err.to_string()))
        }
        other => EngineError::StoreUnavailable(other.to_string()),
    }
}

/// Opens sqlx pools from the engine configuration
pub struct PgConnector {
    options: PgConnectOptions,
    pool: PoolConfig,
    queries: Arc<QueryConfig>,
    acquire_timeout: Duration,
    target: String,
}

impl PgConnector {
    /// Parse the DSN; an invalid DSN blocks engine start
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        if config.dsn.trim().is_empty() {
            return Err(ConfigError::MissingDsn);
        }
        let options = PgConnectOptions::from_str(config.dsn.trim())
            .map_err(|e| ConfigError::InvalidDsn(e.to_string()))?;

        Ok(Self {
            options,
            pool: config.pool.clone(),
            queries: Arc::new(config.queries.clone()),
            acquire_timeout: config.timeout(),
            target: safe_dsn(&config.dsn),
        })
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    type Store = PgStore;

    async fn connect(&self) -> EngineResult<Arc<PgStore>> {
        let pool = PgPoolOptions::new()
            .max_connections(self.pool.max_connections)
            .min_connections(self.pool.min_connections)
            .idle_timeout(self.pool.idle_timeout())
            .acquire_timeout(self.acquire_timeout)
            .test_before_acquire(true)
            .connect_with(self.options.clone())
            .await
            .map_err(|e| EngineError::StoreUnavailable(format!("pool init failed: {}", e)))?;

        let store = PgStore::new(pool, Arc::clone(&self.queries));
        if let Err(e) = self.ping(&store).await {
            store.pool.close().await;
            return Err(e);
        }

        info!(
            target_dsn = %self.target,
            max_connections = self.pool.max_connections,
            min_connections = self.pool.min_connections,
            "Connected to PostgreSQL"
        );
        Ok(Arc::new(store))
    }

    async fn ping(&self, store: &PgStore) -> EngineResult<()> {
        sqlx::query("SELECT 1")
            .execute(&store.pool)
            .await
            .map(|_| ())
            .map_err(|e| EngineError::StoreUnavailable(format!("ping failed: {}", e)))
    }

    async fn close(&self, store: &PgStore) {
        store.pool.close().await;
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}
