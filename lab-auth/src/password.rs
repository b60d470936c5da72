//! Password hashing.

use bcrypt::{hash, verify};
use lab_core::LabConfigSnapshot;

use crate::error::{AuthError, AuthResult};

const DEFAULT_COST: u32 = 10;

/// Hashing options for new passwords. Old hashes keep the cost they
/// were created with; `verify_password` reads it from the hash itself.
#[derive(Debug, Clone)]
pub struct PasswordOptions {
    /// bcrypt work factor.
    pub cost: u32,
}

impl Default for PasswordOptions {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordOptions {
    pub fn from_config(config: &LabConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            cost: config.get_u32("auth.hash_cost").unwrap_or(defaults.cost),
        }
    }
}

pub fn hash_password(password: &str, options: &PasswordOptions) -> AuthResult<String> {
    Ok(hash(password, options.cost)?)
}

/// Check a password against a stored hash.
///
/// A malformed hash fails the same way a wrong password does, so a
/// corrupted row cannot be told apart from a bad guess by a caller.
pub fn verify_password(password: &str, password_hash: &str) -> AuthResult<()> {
    match verify(password, password_hash) {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => Err(AuthError::InvalidCredentials),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hashed = hash_password("hunter2", &PasswordOptions::default()).unwrap();
        assert_ne!(hashed, "hunter2");
        verify_password("hunter2", &hashed).unwrap();
    }

    #[test]
    fn wrong_password_is_rejected() {
        let hashed = hash_password("hunter2", &PasswordOptions::default()).unwrap();
        let err = verify_password("hunter3", &hashed).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn garbage_hash_is_rejected_not_propagated() {
        let err = verify_password("hunter2", "not-a-bcrypt-hash").unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn cost_comes_from_config() {
        let mut config = lab_core::LabConfig::new();
        config.set("auth.hash_cost", "4");
        let options = PasswordOptions::from_config(&config.snapshot());
        assert_eq!(options.cost, 4);
        assert_eq!(PasswordOptions::default().cost, 10);
    }
}
