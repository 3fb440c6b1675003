//! File-backed keystore
//!
//! Each key lives in a single directory as three sibling files:
//!
//! ```text
//! {key_id}.private   envelope-encrypted PKCS#8 PEM (see crate::crypto::envelope)
//! {key_id}.public    SubjectPublicKeyInfo PEM
//! {key_id}.meta      JSON {"key_id", "created_at", "expires_at", "key_size"}
//! ```
//!
//! A key exists only when all three files are present. Metadata is written last,
//! so its presence marks a complete key.

mod manager;

use std::path::PathBuf;
use std::sync::Arc;

pub use manager::{KeyPairManager, MigrationReport};

use crate::crypto::envelope::EnvelopeError;
use crate::crypto::keys::{KeyError, MAX_KEY_SIZE, MIN_KEY_SIZE};
use crate::crypto::{
    KeyDerivationFunction, KeyLoadError, MasterSecretStore, PrivateKeyCodec, SignatureEngine,
};
use crate::module::ModuleSigner;

/// File extension of the metadata record
pub const META_EXT: &str = "meta";
/// File extension of the public key PEM
pub const PUBLIC_EXT: &str = "public";
/// File extension of the private key envelope
pub const PRIVATE_EXT: &str = "private";
/// Longest accepted key id
pub const MAX_KEY_ID_LEN: usize = 128;

/// Errors that can occur while generating a key pair
#[derive(Debug, thiserror::Error)]
pub enum KeyGenerationError {
    #[error("invalid key id {0:?}")]
    InvalidKeyId(String),
    #[error("unsupported key size {0}, expected {MIN_KEY_SIZE}..={MAX_KEY_SIZE} bits")]
    InvalidKeySize(usize),
    #[error("key {0} already exists")]
    AlreadyExists(String),
    #[error("key generation failed: {0}")]
    Backend(#[from] rsa::Error),
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("metadata encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from keystore operations other than generation and loading
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Generation(#[from] KeyGenerationError),
    #[error(transparent)]
    Load(#[from] KeyLoadError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether `key_id` is safe to use as a file name stem.
///
/// Accepts 1..=128 ASCII alphanumerics, `-`, `_` and `.`, not starting with `.`.
pub fn is_valid_key_id(key_id: &str) -> bool {
    !key_id.is_empty()
        && key_id.len() <= MAX_KEY_ID_LEN
        && !key_id.starts_with('.')
        && key_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Every keystore component, wired together.
///
/// ```ignore
/// let keystore = Keystore::open("/var/lib/modseal/keys", "/var/lib/modseal/master.key");
/// keystore.keys().generate("vendorA", 2048)?;
/// let signature = keystore.signer().sign_module("plugin.zip".as_ref(), "vendorA")?;
/// assert!(keystore.signer().verify_module_signature("plugin.zip".as_ref(), &signature)?);
/// ```
#[derive(Debug, Clone)]
pub struct Keystore {
    master: Arc<MasterSecretStore>,
    keys: Arc<KeyPairManager>,
    engine: Arc<SignatureEngine>,
    signer: Arc<ModuleSigner>,
}

impl Keystore {
    /// Wire a keystore rooted at `keys_dir` using the master secret at
    /// `master_secret_path`. Nothing is read or created until first use.
    pub fn open(keys_dir: impl Into<PathBuf>, master_secret_path: impl Into<PathBuf>) -> Self {
        let master = Arc::new(MasterSecretStore::new(master_secret_path));
        let codec = PrivateKeyCodec::new(KeyDerivationFunction::new(master.clone()));
        let keys = Arc::new(KeyPairManager::new(keys_dir, codec));
        let engine = Arc::new(SignatureEngine::new(keys.clone()));
        let signer = Arc::new(ModuleSigner::new(engine.clone()));
        Self {
            master,
            keys,
            engine,
            signer,
        }
    }

    /// Replace the module signer with one that looks for `file_name` manifests
    pub fn with_manifest_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.signer = Arc::new(
            ModuleSigner::new(self.engine.clone()).with_manifest_file_name(file_name),
        );
        self
    }

    pub fn master(&self) -> &Arc<MasterSecretStore> {
        &self.master
    }

    pub fn keys(&self) -> &Arc<KeyPairManager> {
        &self.keys
    }

    pub fn engine(&self) -> &Arc<SignatureEngine> {
        &self.engine
    }

    pub fn signer(&self) -> &Arc<ModuleSigner> {
        &self.signer
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_id_validation() {
        assert!(is_valid_key_id("vendorA"));
        assert!(is_valid_key_id("vendor-a_2.release"));

        assert!(!is_valid_key_id(""));
        assert!(!is_valid_key_id(".hidden"));
        assert!(!is_valid_key_id("../escape"));
        assert!(!is_valid_key_id("a/b"));
        assert!(!is_valid_key_id("white space"));
        assert!(!is_valid_key_id(&"k".repeat(MAX_KEY_ID_LEN + 1)));
        assert!(is_valid_key_id(&"k".repeat(MAX_KEY_ID_LEN)));
    }
}
