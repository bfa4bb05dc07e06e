//! In-memory store
//!
//! Holds users, bindings and ACL rows in process memory. Useful for embedding
//! the engine without a database and for tests.

use super::{CredentialStore, StoreConnector};
use crate::acl::{AclRule, RuleRow};
use crate::auth::UserRecord;
use crate::error::{EngineError, EngineResult, RowError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory users, client bindings and ACL rows
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, UserRecord>>,
    bindings: RwLock<HashSet<(String, String)>>,
    acls: RwLock<Vec<RuleRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a user
    pub fn set_user(&self, username: &str, record: UserRecord) {
        self.users.write().insert(username.to_string(), record);
    }

    /// Remove a user
    pub fn remove_user(&self, username: &str) -> bool {
        self.users.write().remove(username).is_some()
    }

    /// Get user count
    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    pub fn bind_client(&self, username: &str, client_id: &str) {
        self.bindings
            .write()
            .insert((username.to_string(), client_id.to_string()));
    }

    /// Add a rule row, decoded the same way as a database row
    pub fn add_rule(&self, rule: AclRule) {
        let mut acls = self.acls.write();
        let index = acls.len();
        acls.push(AclRule::from_row(
            index,
            rule.owner,
            rule.pattern,
            i64::from(rule.access.bits()),
        ));
    }

    /// Insert a row that fails to decode
    pub fn add_malformed_rule(&self, reason: &str) {
        let mut acls = self.acls.write();
        let index = acls.len();
        acls.push(Err(RowError::new("acls", index, reason)));
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn fetch_user(&self, username: &str) -> EngineResult<Option<UserRecord>> {
        Ok(self.users.read().get(username).cloned())
    }

    async fn client_binding_exists(&self, username: &str, client_id: &str) -> EngineResult<bool> {
        Ok(self
            .bindings
            .read()
            .contains(&(username.to_string(), client_id.to_string())))
    }

    async fn fetch_acl_rules(&self, username: &str) -> EngineResult<Vec<RuleRow>> {
        Ok(self
            .acls
            .read()
            .iter()
            .filter(|row| match row {
                Ok(rule) => rule.applies_to(username),
                Err(_) => true,
            })
            .cloned()
            .collect())
    }
}

/// Connector handing out a shared [`MemoryStore`]
///
/// Counts connections and can simulate an unreachable store.
#[derive(Default)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            ..Default::default()
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Make subsequent connects and pings fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful connects
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> EngineResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::StoreUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    type Store = MemoryStore;

    async fn connect(&self) -> EngineResult<Arc<MemoryStore>> {
        self.check_available()?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.store))
    }

    async fn ping(&self, _store: &MemoryStore) -> EngineResult<()> {
        self.check_available()
    }

    async fn close(&self, _store: &MemoryStore) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn target(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::Access;

    #[tokio::test]
    async fn test_fetch_user() {
        let store = MemoryStore::new();
        store.set_user("alice", UserRecord::bcrypt("$2b$04$hash"));
        assert_eq!(store.user_count(), 1);

        assert!(store.fetch_user("alice").await.unwrap().is_some());
        assert!(store.fetch_user("bob").await.unwrap().is_none());

        assert!(store.remove_user("alice"));
        assert!(store.fetch_user("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acl_rows_filtered_by_owner() {
        let store = MemoryStore::new();
        store.add_rule(AclRule::new("alice", "a/#", Access::READ));
        store.add_rule(AclRule::new("bob", "b/#", Access::READ));
        store.add_rule(AclRule::global("public/#", Access::READ));
        store.add_malformed_rule("acc is NULL");

        let rows = store.fetch_acl_rules("alice").await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().filter_map(|r| r.as_ref().ok()).all(|r| r.owner != "bob"));
    }

    #[tokio::test]
    async fn test_invalid_pattern_stored_as_malformed_row() {
        let store = MemoryStore::new();
        store.add_rule(AclRule::new("alice", "a/#/b", Access::READ));
        store.add_rule(AclRule::new("alice", "/devices/#", Access::READ));

        let rows = store.fetch_acl_rules("alice").await.unwrap();
        assert!(rows[0].is_err());
        assert!(rows[1].is_ok());
    }

    #[tokio::test]
    async fn test_client_bindings() {
        let store = MemoryStore::new();
        store.bind_client("alice", "c1");

        assert!(store.client_binding_exists("alice", "c1").await.unwrap());
        assert!(!store.client_binding_exists("alice", "c2").await.unwrap());
        assert!(!store.client_binding_exists("bob", "c1").await.unwrap());
    }

    #[tokio::test]
    async fn test_connector_availability() {
        let connector = MemoryConnector::default();
        assert!(connector.connect().await.is_ok());
        assert_eq!(connector.connect_count(), 1);

        connector.set_unavailable(true);
        assert!(matches!(
            connector.connect().await,
            Err(EngineError::StoreUnavailable(_))
        ));
        assert_eq!(connector.connect_count(), 1);
    }
}
