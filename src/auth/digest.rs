//! Fixed-salt SHA-256 password scheme
//!
//! The stored hash is the lowercase hex SHA-256 digest of the password
//! followed by the salt.

use super::PasswordScheme;
use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Scheme identifier for salted SHA-256 hashes
pub const SHA256_SALT_SCHEME: &str = "sha256-salt";

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256SaltScheme;

impl PasswordScheme for Sha256SaltScheme {
    fn verify(&self, password: &str, stored_hash: &str, salt: Option<&str>) -> Result<bool> {
        let Some(salt) = salt else {
            bail!("sha256-salt record has no salt");
        };
        let computed = sha256_pwd_salt(password, salt);
        let stored = stored_hash.trim().to_ascii_lowercase();
        Ok(computed.as_bytes().ct_eq(stored.as_bytes()).into())
    }

    fn id(&self) -> &str {
        SHA256_SALT_SCHEME
    }
}

/// Hex SHA-256 of `password ‖ salt`
pub fn sha256_pwd_salt(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        assert_eq!(
            sha256_pwd_salt("password", "salt"),
            "7a37b85c8918eac19a9089c0fa5a2ab4dce3f90528dcdeec108b23ddf3607b99"
        );
    }

    #[test]
    fn test_verify() {
        let hash = sha256_pwd_salt("password", "salt");
        let scheme = Sha256SaltScheme;

        assert!(scheme.verify("password", &hash, Some("salt")).unwrap());
        assert!(scheme
            .verify("password", &hash.to_uppercase(), Some("salt"))
            .unwrap());
        assert!(!scheme.verify("password", &hash, Some("pepper")).unwrap());
        assert!(!scheme.verify("passwords", &hash, Some("salt")).unwrap());
    }

    #[test]
    fn test_missing_salt_is_error() {
        let hash = sha256_pwd_salt("password", "salt");
        assert!(Sha256SaltScheme.verify("password", &hash, None).is_err());
    }
}
