//! Second-factor PIN verification
//!
//! Balance-affecting operations ask the caller for a PIN in addition to the
//! session issued by the auth layer. PINs are stored as argon2 hashes.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use dashmap::DashMap;

use crate::types::LedgerError;

/// Checks a user's PIN against their stored credential
pub trait PinVerifier: Send + Sync {
    /// `Ok(true)` on match, `Ok(false)` on mismatch or unknown user
    fn verify(&self, username: &str, pin: &str) -> Result<bool, LedgerError>;
}

/// In-memory argon2 PIN credential store
pub struct Argon2PinStore {
    hashes: DashMap<String, String>,
    hasher: Argon2<'static>,
}

impl Argon2PinStore {
    /// Store using argon2's default (production) parameters
    pub fn new() -> Self {
        Self {
            hashes: DashMap::new(),
            hasher: Argon2::default(),
        }
    }

    /// Store with explicit cost parameters
    pub fn with_params(memory_kib: u32, iterations: u32) -> Result<Self, LedgerError> {
        let params = Params::new(memory_kib, iterations, 1, None).map_err(|e| {
            LedgerError::Credential {
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            hashes: DashMap::new(),
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Set or replace the PIN of a user
    pub fn set_pin(&self, username: &str, pin: &str) -> Result<(), LedgerError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher
            .hash_password(pin.as_bytes(), &salt)
            .map_err(|e| LedgerError::Credential {
                message: format!("hashing failed: {e}"),
            })?
            .to_string();
        self.hashes.insert(username.to_string(), hash);
        Ok(())
    }
}

impl Default for Argon2PinStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PinVerifier for Argon2PinStore {
    fn verify(&self, username: &str, pin: &str) -> Result<bool, LedgerError> {
        let Some(stored) = self.hashes.get(username).map(|h| h.value().clone()) else {
            return Ok(false);
        };
        let parsed = PasswordHash::new(&stored).map_err(|e| LedgerError::Credential {
            message: format!("invalid stored hash for '{username}': {e}"),
        })?;
        Ok(self.hasher.verify_password(pin.as_bytes(), &parsed).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_store() -> Argon2PinStore {
        Argon2PinStore::with_params(8, 1).unwrap()
    }

    #[test]
    fn test_correct_pin_verifies() {
        let store = cheap_store();
        store.set_pin("finance01", "123456").unwrap();

        assert!(store.verify("finance01", "123456").unwrap());
    }

    #[test]
    fn test_wrong_pin_rejected() {
        let store = cheap_store();
        store.set_pin("finance01", "123456").unwrap();

        assert!(!store.verify("finance01", "654321").unwrap());
    }

    #[test]
    fn test_unknown_user_rejected() {
        let store = cheap_store();

        assert!(!store.verify("nobody", "123456").unwrap());
    }

    #[test]
    fn test_pin_can_be_replaced() {
        let store = cheap_store();
        store.set_pin("finance01", "111111").unwrap();
        store.set_pin("finance01", "222222").unwrap();

        assert!(!store.verify("finance01", "111111").unwrap());
        assert!(store.verify("finance01", "222222").unwrap());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let result = Argon2PinStore::with_params(0, 0);

        assert!(matches!(result, Err(LedgerError::Credential { .. })));
    }
}
