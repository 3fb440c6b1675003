//! Password-based key derivation from the master secret.
//!
//! Parameters: PBKDF2-HMAC-SHA256, 100 000 iterations, 16-byte salt, 32-byte output.
//! The iteration count is fixed: envelopes do not record it, so changing it
//! would make every existing private key unreadable.

use std::sync::Arc;

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::master_secret::{MasterSecretError, MasterSecretStore};

/// Size of the per-envelope salt in bytes
pub const SALT_SIZE: usize = 16;
/// Size of the derived AES-256 key in bytes
pub const DERIVED_KEY_SIZE: usize = 32;
/// PBKDF2 iteration count
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// A derived symmetric key, zeroed on drop
pub type DerivedKey = Zeroizing<[u8; DERIVED_KEY_SIZE]>;

/// Turns (master secret, salt) into a symmetric key.
///
/// Deterministic for a fixed pair; callers draw a fresh salt per encryption so
/// no two envelopes share a key.
#[derive(Debug, Clone)]
pub struct KeyDerivationFunction {
    master: Arc<MasterSecretStore>,
}

impl KeyDerivationFunction {
    pub fn new(master: Arc<MasterSecretStore>) -> Self {
        Self { master }
    }

    /// Derive a 32-byte key for `salt`.
    ///
    /// # Errors
    ///
    /// Fails only if the master secret cannot be read or created.
    pub fn derive(&self, salt: &[u8; SALT_SIZE]) -> Result<DerivedKey, MasterSecretError> {
        let secret = self.master.get_or_create()?;
        let mut key = Zeroizing::new([0u8; DERIVED_KEY_SIZE]);
        pbkdf2_hmac::<Sha256>(secret.bytes(), salt, DEFAULT_KDF_ITERATIONS, &mut key[..]);
        Ok(key)
    }
}
