//! Password hashing.
//!
//! Argon2id with a random salt per hash. Verification goes through the
//! `password_hash` framework, which compares digests in constant time, so a
//! stored hash never leaks timing information about the candidate password.

use crate::error::{CoreError, CoreResult};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Hashes a password for storage.
///
/// # Errors
///
/// Returns [`CoreError::PasswordHash`] if the hasher fails.
pub fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CoreError::PasswordHash(e.to_string()))
}

/// Verifies a candidate password against a stored hash.
///
/// Unparsable stored hashes verify as false rather than erroring; a corrupt
/// credential row must not become a login route.
pub fn verify_password(stored_hash: &str, candidate: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("password123").expect("hashing should succeed");
        assert!(verify_password(&hash, "password123"));
        assert!(!verify_password(&hash, "password124"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password("password123").expect("hashing should succeed");
        let second = hash_password("password123").expect("hashing should succeed");
        assert_ne!(first, second, "same password must hash differently");
    }

    #[test]
    fn test_garbage_stored_hash_never_verifies() {
        assert!(!verify_password("not-a-phc-string", "password123"));
        assert!(!verify_password("", "password123"));
    }
}
