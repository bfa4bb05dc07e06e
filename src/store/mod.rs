//! Credential and policy store
//!
//! The engine needs three read-only queries. [`CredentialStore`] abstracts
//! them; [`StoreConnector`] creates, probes and closes the store handle so
//! that the pool manager can own its lifecycle.

mod memory;
mod postgres;

pub use memory::{MemoryConnector, MemoryStore};
pub use postgres::{PgConnector, PgStore};

use crate::acl::RuleRow;
use crate::auth::UserRecord;
use crate::error::EngineResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Read-only access to users, client bindings and ACL rules
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch a user by username
    async fn fetch_user(&self, username: &str) -> EngineResult<Option<UserRecord>>;

    /// Whether a (username, client id) binding exists
    async fn client_binding_exists(&self, username: &str, client_id: &str) -> EngineResult<bool>;

    /// Fetch ACL rows owned by `username` or by `*`
    ///
    /// Rows that cannot be decoded are returned as errors in place so the
    /// evaluator can skip them individually.
    async fn fetch_acl_rules(&self, username: &str) -> EngineResult<Vec<RuleRow>>;
}

/// Creates and manages store handles for the pool manager
#[async_trait]
pub trait StoreConnector: Send + Sync + 'static {
    type Store: CredentialStore + 'static;

    /// Open a new store handle (a connection pool)
    async fn connect(&self) -> EngineResult<Arc<Self::Store>>;

    /// Liveness probe
    async fn ping(&self, store: &Self::Store) -> EngineResult<()>;

    /// Close a store handle
    async fn close(&self, store: &Self::Store);

    /// Connection target for logging, with secrets masked
    fn target(&self) -> String;
}
