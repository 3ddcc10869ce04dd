//! Argon2id password hashing and verification.

use anyhow::{Result, anyhow};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::rngs::OsRng;

/// Hash a password for storage using Argon2id with a fresh salt.
pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash password"))?
        .to_string();
    Ok(hash)
}

/// Verify a submitted password against a stored hash.
pub(crate) fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| anyhow!("invalid password hash"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{hash_password, verify_password};

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("secret1").unwrap();
        assert!(verify_password("secret1", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("secret1").unwrap();
        let second = hash_password("secret1").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(verify_password("secret1", "not-a-phc-string").is_err());
    }
}
