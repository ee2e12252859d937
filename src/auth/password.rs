/// Password Hashing and Verification
///
/// bcrypt with a fixed cost (12 in production, roughly a few hundred ms per
/// verify). A mismatch is a normal `Ok(false)`; only a broken hash or a
/// hashing failure is an error.
///
/// bcrypt only reads the first 72 bytes of its input. Longer passwords are
/// refused when hashing and never match when verifying, so two passwords
/// sharing a 72-byte prefix cannot stand in for each other.

use bcrypt::{hash, verify};

use crate::error::{AppError, ValidationError};
use crate::validators::MAX_PASSWORD_LENGTH;

/// Password used to build the decoy hash for unknown accounts
const DECOY_PASSWORD: &str = "decoy-password-for-unknown-accounts";

#[derive(Clone)]
pub struct CredentialHasher {
    cost: u32,
    decoy_hash: String,
}

impl CredentialHasher {
    /// Build a hasher with the given bcrypt cost.
    ///
    /// # Errors
    /// Returns `Internal` if the cost is out of range for bcrypt.
    pub fn new(cost: u32) -> Result<Self, AppError> {
        let decoy_hash = hash(DECOY_PASSWORD, cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;
        Ok(Self { cost, decoy_hash })
    }

    /// Hash a password
    ///
    /// # Errors
    /// - `Validation` if the password is longer than bcrypt can read
    /// - `Internal` if hashing fails
    pub fn hash_password(&self, password: &str) -> Result<String, AppError> {
        if password.len() > MAX_PASSWORD_LENGTH {
            return Err(
                ValidationError::TooLong("password".to_string(), MAX_PASSWORD_LENGTH).into(),
            );
        }
        hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against its hash
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        if password.len() > MAX_PASSWORD_LENGTH {
            self.verify_decoy(password);
            return Ok(false);
        }
        verify(password, hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }

    /// Spend one verification on a hash no password matches.
    ///
    /// Keeps the unknown-account login path as slow as a wrong password.
    pub fn verify_decoy(&self, password: &str) {
        let _ = verify(password, &self.decoy_hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        CredentialHasher::new(4).expect("Failed to build hasher")
    }

    #[test]
    fn test_hash_password() {
        let hash = hasher().hash_password("password123").expect("Failed to hash password");

        assert_ne!(hash, "password123");
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = hasher();
        let first = hasher.hash_password("password123").unwrap();
        let second = hasher.hash_password("password123").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_password() {
        let hasher = hasher();
        let hash = hasher.hash_password("password123").unwrap();

        assert!(hasher.verify_password("password123", &hash).unwrap());
    }

    #[test]
    fn test_verify_wrong_password() {
        let hasher = hasher();
        let hash = hasher.hash_password("password123").unwrap();

        assert!(!hasher.verify_password("password124", &hash).unwrap());
    }

    #[test]
    fn test_shared_72_byte_prefix_does_not_match() {
        let hasher = hasher();
        let prefix = "a".repeat(72);
        let hash = hasher.hash_password(&prefix).unwrap();

        assert!(hasher.verify_password(&prefix, &hash).unwrap());
        assert!(!hasher.verify_password(&format!("{}Y", prefix), &hash).unwrap());
    }

    #[test]
    fn test_overlong_password_is_not_hashed() {
        let result = hasher().hash_password(&format!("{}X", "a".repeat(72)));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_corrupt_hash_is_error() {
        let result = hasher().verify_password("password123", "not-a-bcrypt-hash");
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[test]
    fn test_invalid_cost_is_error() {
        assert!(CredentialHasher::new(99).is_err());
    }
}
