//! Auth engine implementation
//!
//! The engine is the context object a broker adapter constructs once at load
//! time and calls for every CONNECT (authenticate) and every topic operation
//! (authorize). Each call reads fresh data from the store; nothing is cached
//! between calls.

use crate::acl::{
    hooks_from_config, Access, AccessRequest, Decision, PolicyEvaluator, PolicyHook, Requester,
};
use crate::auth::{CredentialVerifier, SchemeRegistry};
use crate::config::EngineConfig;
use crate::error::{ConfigError, EngineError};
use crate::failure::FailurePolicy;
use crate::pool::ConnectionPoolManager;
use crate::store::{CredentialStore, PgConnector, StoreConnector};

use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Status codes returned to the broker's plugin callbacks
pub const BROKER_SUCCESS: i32 = 0;
pub const BROKER_AUTH_DENIED: i32 = 11;
pub const BROKER_ACL_DENIED: i32 = 12;

/// Broker event kinds, for mapping decisions to status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerEvent {
    BasicAuth,
    AclCheck,
}

impl BrokerEvent {
    /// Broker status code for a decision on this event
    pub fn status(self, decision: &Decision) -> i32 {
        match (decision.is_allowed(), self) {
            (true, _) => BROKER_SUCCESS,
            (false, BrokerEvent::BasicAuth) => BROKER_AUTH_DENIED,
            (false, BrokerEvent::AclCheck) => BROKER_ACL_DENIED,
        }
    }
}

/// MQTT authentication and topic authorization engine
pub struct Engine<C: StoreConnector> {
    /// Configuration
    config: EngineConfig,
    /// Store pool lifecycle
    pool: ConnectionPoolManager<C>,
    /// Password verification
    verifier: CredentialVerifier,
    /// ACL evaluation
    evaluator: PolicyEvaluator,
    /// Timeout and fail-open handling
    failure: FailurePolicy,
}

impl Engine<PgConnector> {
    /// Create a PostgreSQL-backed engine
    ///
    /// Fails on missing or invalid settings. No connection is opened until
    /// the first event.
    pub fn from_config(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let connector = PgConnector::new(&config)?;
        Self::with_connector(config, connector)
    }
}

impl<C: StoreConnector> Engine<C> {
    /// Create an engine over an arbitrary store connector
    pub fn with_connector(config: EngineConfig, connector: C) -> Result<Self, ConfigError> {
        config.validate()?;

        let hooks = hooks_from_config(&config.hooks)?;
        let pool = ConnectionPoolManager::new(connector, config.pool.health_check_period());
        let failure = FailurePolicy::new(config.timeout(), config.fail_open);

        info!(
            store = %pool.connector().target(),
            timeout_ms = config.timeout_ms,
            fail_open = config.fail_open,
            enforce_bind = config.enforce_bind,
            hooks = hooks.len(),
            "Auth engine configured"
        );

        Ok(Self {
            config,
            pool,
            verifier: CredentialVerifier::default(),
            evaluator: PolicyEvaluator::new(hooks),
            failure,
        })
    }

    /// Replace the password scheme registry
    pub fn with_schemes(mut self, registry: SchemeRegistry) -> Self {
        self.verifier = CredentialVerifier::new(registry);
        self
    }

    /// Replace the policy hook chain
    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn PolicyHook>>) -> Self {
        self.evaluator = PolicyEvaluator::new(hooks);
        self
    }

    /// Decide whether a connection attempt is authenticated
    pub async fn authenticate(&self, username: &str, password: &str, client_id: &str) -> Decision {
        if username.is_empty() || password.is_empty() {
            debug!(client_id = %client_id, "Empty username or password");
            return Decision::deny("empty username or password");
        }

        let decision = self
            .failure
            .wrap("authenticate", self.check_credentials(username, password, client_id))
            .await;

        if decision.is_allowed() {
            debug!(username = %username, client_id = %client_id, "Authentication allowed");
        } else {
            info!(
                username = %username,
                client_id = %client_id,
                reason = %decision.reason(),
                "Authentication denied"
            );
        }
        decision
    }

    async fn check_credentials(
        &self,
        username: &str,
        password: &str,
        client_id: &str,
    ) -> Result<Decision, EngineError> {
        let store = self.pool.ensure().await?;
        let user = store.fetch_user(username).await?;

        // Hash verification blocks; run it on the blocking pool
        let verifier = self.verifier.clone();
        let (name, candidate) = (username.to_string(), password.to_string());
        let decision =
            tokio::task::spawn_blocking(move || verifier.check(&name, user.as_ref(), &candidate))
                .await
                .map_err(|e| EngineError::Fault(format!("password verification task: {}", e)))?;

        if !decision.is_allowed() || !self.config.enforce_bind {
            return Ok(decision);
        }

        if store.client_binding_exists(username, client_id).await? {
            Ok(decision)
        } else {
            Ok(Decision::deny("client id not bound to user"))
        }
    }

    /// Decide whether a topic operation is authorized
    pub async fn authorize(
        &self,
        username: &str,
        client_id: &str,
        address: Option<IpAddr>,
        topic: &str,
        access: Access,
    ) -> Decision {
        if username.is_empty() || topic.is_empty() {
            debug!(client_id = %client_id, topic = %topic, "Empty username or topic");
            return Decision::deny("empty username or topic");
        }

        let requester = Requester {
            username: username.to_string(),
            client_id: client_id.to_string(),
            address,
        };
        let request = AccessRequest {
            requester: &requester,
            topic,
            access,
        };

        let decision = self
            .failure
            .wrap("authorize", self.check_access(&request))
            .await;

        debug!(
            username = %username,
            client_id = %client_id,
            topic = %topic,
            access = %access,
            allowed = decision.is_allowed(),
            reason = %decision.reason(),
            "Authorization decided"
        );
        decision
    }

    async fn check_access(&self, request: &AccessRequest<'_>) -> Result<Decision, EngineError> {
        if let Some(decision) = self.evaluator.hook_decision(request) {
            return Ok(decision);
        }

        let store = self.pool.ensure().await?;
        let rules = store.fetch_acl_rules(&request.requester.username).await?;
        Ok(self.evaluator.scan_rules(request, &rules))
    }

    /// Close the store pool; later events reconnect transparently
    pub async fn teardown(&self) {
        self.pool.teardown().await;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPoolManager<C> {
        &self.pool
    }
}
