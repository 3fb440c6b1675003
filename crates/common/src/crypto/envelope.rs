//! Private key envelope encoding
//!
//! Private keys are stored as PEM (PKCS#8) wrapped in an AES-256-GCM envelope:
//!
//! ```text
//! [ salt: 16 ][ nonce: 12 ][ tag: 16 ][ ciphertext: .. ]
//! ```
//!
//! The encryption key is derived from the master secret and the envelope's own
//! salt, so every private key file is encrypted under a different key.
//!
//! Keystores written by older releases used an unauthenticated layout:
//!
//! ```text
//! [ plaintext_pem: .. ][ trailing: 16 ]
//! ```
//!
//! That layout carries no format marker. Decoding therefore tries the current
//! layout first and only falls back to the legacy one when the current parse
//! fails for any reason.

use std::fmt;

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use zeroize::Zeroizing;

use super::kdf::{KeyDerivationFunction, SALT_SIZE};
use super::master_secret::MasterSecretError;

/// Size of the AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of the AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;
/// Size of the fixed envelope header: salt || nonce || tag
pub const HEADER_SIZE: usize = SALT_SIZE + NONCE_SIZE + TAG_SIZE;
/// Size of the trailing bytes appended by the legacy layout
pub const LEGACY_TRAILER_SIZE: usize = 16;

/// Which on-disk layout a private key blob was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeFormat {
    /// `salt || nonce || tag || ciphertext`
    Current,
    /// `plaintext_pem || trailing(16)`, read-only
    Legacy,
}

/// Errors that can occur while sealing a private key
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("master secret error: {0}")]
    MasterSecret(#[from] MasterSecretError),
}

/// Errors that can occur while loading persisted key material
#[derive(Debug, thiserror::Error)]
pub enum KeyLoadError {
    #[error("invalid key id {0:?}")]
    InvalidKeyId(String),
    #[error("private key is unreadable (current format: {current}; legacy format: {legacy})")]
    Undecodable { current: String, legacy: String },
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid key metadata: {0}")]
    InvalidMetadata(#[from] serde_json::Error),
    #[error("public and private key for {0} do not match")]
    Mismatch(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A private key recovered from an envelope, tagged with the layout it came from
pub struct DecodedPrivateKey {
    pub key: RsaPrivateKey,
    pub format: EnvelopeFormat,
}

impl fmt::Debug for DecodedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedPrivateKey")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Seals and opens private key envelopes.
#[derive(Debug, Clone)]
pub struct PrivateKeyCodec {
    kdf: KeyDerivationFunction,
}

impl PrivateKeyCodec {
    pub fn new(kdf: KeyDerivationFunction) -> Self {
        Self { kdf }
    }

    /// Encrypt PEM private key bytes into a current-format envelope.
    ///
    /// A fresh salt and nonce are drawn for every call.
    ///
    /// # Errors
    ///
    /// Returns an error if the master secret is unavailable or the system RNG fails.
    pub fn encode(&self, private_key_pem: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let mut salt = [0u8; SALT_SIZE];
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut salt)
            .map_err(|e| anyhow::anyhow!("failed to generate salt: {}", e))?;
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| anyhow::anyhow!("failed to generate nonce: {}", e))?;

        let key = self.kdf.derive(&salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));

        let mut buffer = private_key_pem.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce_bytes), b"", &mut buffer)
            .map_err(|_| anyhow::anyhow!("encrypt error"))?;

        let mut out = Vec::with_capacity(HEADER_SIZE + buffer.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(tag.as_slice());
        out.extend_from_slice(&buffer);
        Ok(out)
    }

    /// Encode an RSA private key as PKCS#8 PEM and seal it.
    pub fn encode_key(&self, key: &RsaPrivateKey) -> Result<Vec<u8>, EnvelopeError> {
        let pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| anyhow::anyhow!("failed to encode private key as PEM: {}", e))?;
        self.encode(pem.as_bytes())
    }

    /// Recover the private key from an envelope.
    ///
    /// The current layout is tried first. Any failure there (blob too short,
    /// authentication failure, malformed PEM after decryption) falls back to the
    /// legacy layout.
    ///
    /// # Errors
    ///
    /// Returns [`KeyLoadError::Undecodable`] with both failure reasons when
    /// neither layout yields a private key.
    pub fn decode(&self, blob: &[u8]) -> Result<DecodedPrivateKey, KeyLoadError> {
        let current = match self.decode_current(blob) {
            Ok(key) => {
                return Ok(DecodedPrivateKey {
                    key,
                    format: EnvelopeFormat::Current,
                })
            }
            Err(e) => e,
        };

        match decode_legacy(blob) {
            Ok(key) => {
                tracing::warn!("private key decoded from deprecated legacy envelope");
                Ok(DecodedPrivateKey {
                    key,
                    format: EnvelopeFormat::Legacy,
                })
            }
            Err(legacy) => Err(KeyLoadError::Undecodable {
                current: current.to_string(),
                legacy: legacy.to_string(),
            }),
        }
    }

    fn decode_current(&self, blob: &[u8]) -> anyhow::Result<RsaPrivateKey> {
        if blob.len() <= HEADER_SIZE {
            anyhow::bail!("envelope too short: {} bytes", blob.len());
        }

        let (salt, rest) = blob.split_at(SALT_SIZE);
        let (nonce, rest) = rest.split_at(NONCE_SIZE);
        let (tag, ciphertext) = rest.split_at(TAG_SIZE);

        let mut salt_bytes = [0u8; SALT_SIZE];
        salt_bytes.copy_from_slice(salt);
        let key = self.kdf.derive(&salt_bytes)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));

        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce),
                b"",
                &mut *buffer,
                Tag::from_slice(tag),
            )
            .map_err(|_| anyhow::anyhow!("authentication failed"))?;

        parse_private_key_pem(&buffer)
    }
}

fn decode_legacy(blob: &[u8]) -> anyhow::Result<RsaPrivateKey> {
    if blob.len() < LEGACY_TRAILER_SIZE {
        anyhow::bail!("blob too short: {} bytes", blob.len());
    }
    parse_private_key_pem(&blob[..blob.len() - LEGACY_TRAILER_SIZE])
}

/// Parse a PEM private key, accepting PKCS#8 (`PRIVATE KEY`) and PKCS#1
/// (`RSA PRIVATE KEY`) encodings.
fn parse_private_key_pem(bytes: &[u8]) -> anyhow::Result<RsaPrivateKey> {
    let pem = std::str::from_utf8(bytes).map_err(|_| anyhow::anyhow!("PEM is not UTF-8"))?;
    let pem = pem.trim();

    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs1_pem(pem)
        .map_err(|e| anyhow::anyhow!("not a PKCS#8 or PKCS#1 RSA private key: {}", e))
}
