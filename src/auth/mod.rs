//! Authentication module
//!
//! Verifies a candidate password against the stored user record. Hash
//! schemes are pluggable: each implements [`PasswordScheme`] and is looked up
//! by the scheme identifier stored alongside the hash.

mod credentials;
mod digest;

pub use credentials::{hash_password, BcryptScheme, BCRYPT_SCHEME};
pub use digest::{sha256_pwd_salt, Sha256SaltScheme, SHA256_SALT_SCHEME};

use crate::acl::Decision;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// User row as read from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Stored password hash
    pub password_hash: String,
    /// Whether the account may log in
    pub enabled: bool,
    /// Scheme identifier, inferred from the hash when absent
    pub scheme: Option<String>,
    /// Salt for fixed-salt schemes
    pub salt: Option<String>,
}

impl UserRecord {
    /// Enabled bcrypt user
    pub fn bcrypt(password_hash: impl Into<String>) -> Self {
        Self {
            password_hash: password_hash.into(),
            enabled: true,
            scheme: Some(BCRYPT_SCHEME.to_string()),
            salt: None,
        }
    }

    /// Enabled salted SHA-256 user
    pub fn sha256_salt(password_hash: impl Into<String>, salt: impl Into<String>) -> Self {
        Self {
            password_hash: password_hash.into(),
            enabled: true,
            scheme: Some(SHA256_SALT_SCHEME.to_string()),
            salt: Some(salt.into()),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Password hash scheme
pub trait PasswordScheme: Send + Sync {
    /// Check a candidate password against the stored hash
    fn verify(&self, password: &str, stored_hash: &str, salt: Option<&str>) -> Result<bool>;

    /// Scheme identifier as stored with the user record
    fn id(&self) -> &str;
}

/// Registry of password schemes keyed by identifier
#[derive(Clone)]
pub struct SchemeRegistry {
    schemes: HashMap<String, Arc<dyn PasswordScheme>>,
}

impl SchemeRegistry {
    /// Empty registry
    pub fn empty() -> Self {
        Self {
            schemes: HashMap::new(),
        }
    }

    /// Register a scheme, replacing any scheme with the same identifier
    pub fn register(&mut self, scheme: Arc<dyn PasswordScheme>) {
        self.schemes.insert(scheme.id().to_string(), scheme);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn PasswordScheme>> {
        self.schemes.get(id).cloned()
    }

    /// Scheme identifier for a record
    ///
    /// An explicit identifier wins. Otherwise bcrypt-prefixed hashes are
    /// bcrypt, a present salt means salted SHA-256, and anything else falls
    /// back to bcrypt.
    pub fn scheme_id<'a>(&self, record: &'a UserRecord) -> &'a str {
        if let Some(id) = record.scheme.as_deref().filter(|s| !s.is_empty()) {
            return id;
        }
        if is_bcrypt_hash(&record.password_hash) {
            return BCRYPT_SCHEME;
        }
        if record.salt.as_deref().is_some_and(|s| !s.is_empty()) {
            return SHA256_SALT_SCHEME;
        }
        BCRYPT_SCHEME
    }
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(BcryptScheme));
        registry.register(Arc::new(Sha256SaltScheme));
        registry
    }
}

fn is_bcrypt_hash(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2x$", "$2y$"]
        .iter()
        .any(|prefix| hash.starts_with(prefix))
}

/// Credential verifier
#[derive(Clone, Default)]
pub struct CredentialVerifier {
    registry: SchemeRegistry,
}

impl CredentialVerifier {
    pub fn new(registry: SchemeRegistry) -> Self {
        Self { registry }
    }

    /// Verify a candidate password under the named scheme
    ///
    /// Unknown schemes and scheme errors verify as false.
    pub fn verify(
        &self,
        stored_hash: &str,
        stored_salt: Option<&str>,
        candidate: &str,
        scheme: &str,
    ) -> bool {
        let Some(handler) = self.registry.get(scheme) else {
            warn!(scheme = %scheme, "Unknown password scheme");
            return false;
        };

        match handler.verify(candidate, stored_hash, stored_salt) {
            Ok(valid) => valid,
            Err(e) => {
                warn!(scheme = %scheme, error = %e, "Password verification error");
                false
            }
        }
    }

    /// Decide authentication for a fetched user row
    ///
    /// Missing user, disabled account, empty password and mismatch all deny.
    pub fn check(&self, username: &str, user: Option<&UserRecord>, password: &str) -> Decision {
        if username.is_empty() || password.is_empty() {
            return Decision::deny("empty username or password");
        }

        let user = match user {
            Some(u) => u,
            None => return Decision::deny("user not found"),
        };

        if !user.enabled {
            return Decision::deny("user is disabled");
        }

        let scheme = self.registry.scheme_id(user);
        if self.verify(&user.password_hash, user.salt.as_deref(), password, scheme) {
            debug!(username = %username, scheme = %scheme, "Password verified");
            Decision::allow("credentials verified")
        } else {
            Decision::deny("invalid password")
        }
    }

    pub fn registry(&self) -> &SchemeRegistry {
        &self.registry
    }
}
