//! Cryptographic primitives for the modseal keystore
//!
//! This module provides everything below the plugin-packaging layer:
//!
//! - **Master secret**: a single 32-byte process-wide secret, persisted once
//! - **Key derivation**: PBKDF2-HMAC-SHA256 turning (master secret, salt) into an AES key
//! - **Envelope**: AES-256-GCM encryption of PEM private keys at rest
//! - **Signing**: RSA-PSS (SHA-256, maximal salt) over arbitrary payloads
//!
//! # Security Model
//!
//! ## Key material at rest
//! Private keys never touch the disk in plaintext. Every private key file is its
//! own envelope with a fresh salt and nonce, so no two blobs share an encryption key.
//!
//! ## Legacy envelopes
//! Older keystores wrote `plaintext_pem || trailing(16)`. Those files are still
//! readable but are never produced; see [`PrivateKeyCodec::decode`] and
//! [`crate::keystore::KeyPairManager::migrate_legacy`].
//!
//! ## Verification
//! Verification is total: it answers `true` or `false` and never fails, because
//! untrusted input is the normal case for a plugin loader.

pub mod envelope;
pub mod kdf;
pub mod keys;
pub mod master_secret;
pub mod signature;

pub use envelope::{
    DecodedPrivateKey, EnvelopeError, EnvelopeFormat, KeyLoadError, PrivateKeyCodec,
};
pub use kdf::{KeyDerivationFunction, DEFAULT_KDF_ITERATIONS};
pub use keys::{KeyError, KeyMetadata, KeyPair, DEFAULT_KEY_SIZE, MAX_KEY_SIZE, MIN_KEY_SIZE};
pub use master_secret::{MasterSecret, MasterSecretError, MasterSecretStore};
pub use signature::{SignError, SignatureEngine, SIGNATURE_ALGORITHM};
