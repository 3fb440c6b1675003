use std::fmt;

use chrono::{DateTime, Utc};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default RSA modulus size in bits
pub const DEFAULT_KEY_SIZE: usize = 2048;
/// Smallest RSA modulus accepted for new keys
pub const MIN_KEY_SIZE: usize = 1024;
/// Largest RSA modulus accepted for new keys
pub const MAX_KEY_SIZE: usize = 8192;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key error: {0}")]
    Default(#[from] anyhow::Error),
}

/// The `{key_id}.meta` record.
///
/// Timestamps are unix seconds as floats, the layout existing keystores use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub key_id: String,
    pub created_at: f64,
    pub expires_at: Option<f64>,
    pub key_size: usize,
}

/// An RSA key pair owned by the keystore.
///
/// A `KeyPair` returned from [`crate::keystore::KeyPairManager::generate`] or
/// [`crate::keystore::KeyPairManager::load`] is always fully persisted. The
/// `expires_at` value is carried along but not enforced here; expiry policy
/// belongs to whoever decides to trust a key.
#[derive(Clone)]
pub struct KeyPair {
    key_id: String,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    key_size: usize,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("key_size", &self.key_size)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a fresh RSA key pair using the OS RNG.
    ///
    /// CPU-bound: 2048-bit generation takes from milliseconds to seconds.
    pub(crate) fn generate(
        key_id: &str,
        key_size: usize,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Self, rsa::Error> {
        let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, key_size)?;
        let public_key = private_key.to_public_key();
        Ok(Self {
            key_id: key_id.to_string(),
            private_key,
            public_key,
            created_at: Utc::now(),
            expires_at,
            key_size,
        })
    }

    /// Reassemble a key pair from its persisted parts.
    pub(crate) fn from_parts(
        metadata: KeyMetadata,
        private_key: RsaPrivateKey,
        public_key: RsaPublicKey,
    ) -> Self {
        Self {
            key_id: metadata.key_id,
            private_key,
            public_key,
            created_at: from_unix_seconds(metadata.created_at),
            expires_at: metadata.expires_at.map(from_unix_seconds),
            key_size: metadata.key_size,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// The metadata record as written to `{key_id}.meta`
    pub fn metadata(&self) -> KeyMetadata {
        KeyMetadata {
            key_id: self.key_id.clone(),
            created_at: to_unix_seconds(self.created_at),
            expires_at: self.expires_at.map(to_unix_seconds),
            key_size: self.key_size,
        }
    }

    /// Encode the public key as a `SubjectPublicKeyInfo` PEM
    pub fn public_key_pem(&self) -> Result<String, KeyError> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| anyhow::anyhow!("failed to encode public key: {}", e).into())
    }

    /// Hex SHA-256 of the DER `SubjectPublicKeyInfo`
    pub fn fingerprint(&self) -> Result<String, KeyError> {
        let der = self
            .public_key
            .to_public_key_der()
            .map_err(|e| anyhow::anyhow!("failed to encode public key: {}", e))?;
        Ok(hex::encode(Sha256::digest(der.as_bytes())))
    }
}

pub(crate) fn to_unix_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}

pub(crate) fn from_unix_seconds(secs: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64).unwrap_or_default()
}
