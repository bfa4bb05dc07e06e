//! bcrypt password scheme

use super::PasswordScheme;
use anyhow::{Context, Result};

/// Scheme identifier for bcrypt hashes
pub const BCRYPT_SCHEME: &str = "bcrypt";

/// Adaptive, self-salting bcrypt; cost and salt live in the hash itself
#[derive(Debug, Clone, Copy, Default)]
pub struct BcryptScheme;

impl PasswordScheme for BcryptScheme {
    fn verify(&self, password: &str, stored_hash: &str, _salt: Option<&str>) -> Result<bool> {
        bcrypt::verify(password, stored_hash).context("Failed to verify bcrypt hash")
    }

    fn id(&self) -> &str {
        BCRYPT_SCHEME
    }
}

/// Hash a password for storage
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).context("Failed to hash password")
}
