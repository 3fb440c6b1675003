//! RSA-PSS signing and verification
//!
//! Parameters: SHA-256 digest, MGF1 with SHA-256, maximal salt length
//! (`emLen - hLen - 2`). PSS is randomized, so signing the same bytes twice
//! yields different signatures; never compare signature bytes as a trust check.

use std::sync::Arc;

use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};

use super::envelope::KeyLoadError;
use crate::keystore::KeyPairManager;

/// Algorithm tag recorded in signature records
pub const SIGNATURE_ALGORITHM: &str = "RSA-PSS-SHA256";

/// Errors that can occur while signing
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("key load error: {0}")]
    KeyLoad(#[from] KeyLoadError),
    #[error("signing failed: {0}")]
    Backend(#[from] rsa::signature::Error),
}

/// Signs and verifies byte payloads with keys from a [`KeyPairManager`].
#[derive(Debug, Clone)]
pub struct SignatureEngine {
    keys: Arc<KeyPairManager>,
}

impl SignatureEngine {
    pub fn new(keys: Arc<KeyPairManager>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &Arc<KeyPairManager> {
        &self.keys
    }

    /// Sign `data` with the private key of `key_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No key with this id is persisted ([`SignError::KeyNotFound`])
    /// - The key exists but cannot be loaded
    /// - The RSA backend fails
    pub fn sign(&self, data: &[u8], key_id: &str) -> Result<Vec<u8>, SignError> {
        let pair = self
            .keys
            .load(key_id)?
            .ok_or_else(|| SignError::KeyNotFound(key_id.to_string()))?;

        let salt_len = max_pss_salt_len(pair.public_key());
        let signing_key =
            BlindedSigningKey::<Sha256>::new_with_salt_len(pair.private_key().clone(), salt_len);
        let signature = signing_key.try_sign_with_rng(&mut rand::rngs::OsRng, data)?;
        Ok(signature.to_vec())
    }

    /// Verify `signature` over `data` against the public key of `key_id`.
    ///
    /// Only the public half is loaded; the master secret is never touched.
    /// Never fails: a missing or unreadable key, a malformed signature and a
    /// cryptographic mismatch all answer `false`.
    pub fn verify(&self, data: &[u8], signature: &[u8], key_id: &str) -> bool {
        let public_key = match self.keys.load_public(key_id) {
            Ok(Some(public_key)) => public_key,
            Ok(None) => {
                tracing::debug!("verification against unknown key {}", key_id);
                return false;
            }
            Err(e) => {
                tracing::debug!("verification key {} unavailable: {}", key_id, e);
                return false;
            }
        };
        verify_with_public_key(&public_key, data, signature)
    }
}

/// Verify an RSA-PSS signature against a bare public key.
pub fn verify_with_public_key(public_key: &RsaPublicKey, data: &[u8], signature: &[u8]) -> bool {
    let Ok(signature) = Signature::try_from(signature) else {
        tracing::debug!("malformed signature bytes");
        return false;
    };
    let salt_len = max_pss_salt_len(public_key);
    let verifying_key = VerifyingKey::<Sha256>::new_with_salt_len(public_key.clone(), salt_len);
    match verifying_key.verify(data, &signature) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("signature rejected: {}", e);
            false
        }
    }
}

/// Largest PSS salt for this modulus and SHA-256
fn max_pss_salt_len(public_key: &RsaPublicKey) -> usize {
    let em_bits = public_key.n().bits() - 1;
    let em_len = em_bits.div_ceil(8);
    em_len.saturating_sub(<Sha256 as Digest>::output_size() + 2)
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    use crate::crypto::{KeyDerivationFunction, MasterSecretStore, PrivateKeyCodec};

    fn engine_in(dir: &TempDir) -> SignatureEngine {
        let master = Arc::new(MasterSecretStore::new(dir.path().join("master.key")));
        let codec = PrivateKeyCodec::new(KeyDerivationFunction::new(master));
        SignatureEngine::new(Arc::new(KeyPairManager::new(dir.path().join("keys"), codec)))
    }

    #[test]
    fn test_sign_and_verify() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.keys().generate("vendor", 1024).unwrap();
        let message = b"hello, world!";

        let signature = engine.sign(message, "vendor").unwrap();
        assert!(engine.verify(message, &signature, "vendor"));

        // Verify fails with wrong message
        assert!(!engine.verify(b"hello, world?", &signature, "vendor"));

        // Verify fails with wrong key
        engine.keys().generate("other", 1024).unwrap();
        assert!(!engine.verify(message, &signature, "other"));
    }

    #[test]
    fn test_signatures_are_randomized() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.keys().generate("vendor", 1024).unwrap();

        let sig1 = engine.sign(b"payload", "vendor").unwrap();
        let sig2 = engine.sign(b"payload", "vendor").unwrap();

        assert_ne!(sig1, sig2);
        assert!(engine.verify(b"payload", &sig1, "vendor"));
        assert!(engine.verify(b"payload", &sig2, "vendor"));
    }

    #[test]
    fn test_sign_with_missing_key() {
        let dir = TempDir::new().unwrap();
        let result = engine_in(&dir).sign(b"payload", "ghost");
        assert!(matches!(result, Err(SignError::KeyNotFound(id)) if id == "ghost"));
    }

    #[test]
    fn test_verify_never_fails() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.keys().generate("vendor", 1024).unwrap();

        assert!(!engine.verify(b"payload", b"", "vendor"));
        assert!(!engine.verify(b"payload", &[0u8; 128], "vendor"));
        assert!(!engine.verify(b"payload", &[1u8; 7], "vendor"));
        assert!(!engine.verify(b"payload", &[0u8; 128], "ghost"));
        assert!(!engine.verify(b"payload", &[0u8; 128], "../bad id"));
    }

    #[test]
    fn test_verify_from_another_process() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.keys().generate("vendor", 1024).unwrap();
        let signature = engine.sign(b"payload", "vendor").unwrap();

        assert!(engine_in(&dir).verify(b"payload", &signature, "vendor"));
    }

    #[test]
    fn test_verify_without_master_secret() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.keys().generate("vendor", 1024).unwrap();
        let signature = engine.sign(b"payload", "vendor").unwrap();
        std::fs::remove_file(dir.path().join("master.key")).unwrap();

        let verifier = engine_in(&dir);
        assert!(verifier.verify(b"payload", &signature, "vendor"));
        assert!(!verifier.verify(b"payload!", &signature, "vendor"));
        assert!(!dir.path().join("master.key").exists());
    }

    #[test]
    fn test_max_salt_len() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        let pair = engine.keys().generate("vendor", 1024).unwrap();

        // 1024-bit modulus: emLen = 128, minus 32-byte digest, minus 2
        assert_eq!(max_pss_salt_len(pair.public_key()), 94);
    }
}
