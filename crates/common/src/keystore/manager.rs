use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use tempfile::NamedTempFile;
use zeroize::Zeroizing;

use super::{
    is_valid_key_id, KeyGenerationError, KeystoreError, META_EXT, PRIVATE_EXT, PUBLIC_EXT,
};
use crate::crypto::keys::{KeyMetadata, KeyPair, MAX_KEY_SIZE, MIN_KEY_SIZE};
use crate::crypto::{EnvelopeFormat, KeyLoadError, PrivateKeyCodec};

/// Paths of the three files that make up one key
struct KeyPaths {
    meta: PathBuf,
    public: PathBuf,
    private: PathBuf,
}

/// Outcome of [`KeyPairManager::migrate_all`]
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Keys rewritten in the current envelope format
    pub migrated: Vec<String>,
    /// Keys that could not be migrated, with the reason
    pub failed: Vec<(String, KeystoreError)>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Raw contents of the three files, read in one pass
struct KeyFiles {
    meta: Vec<u8>,
    public: Vec<u8>,
    private: Zeroizing<Vec<u8>>,
}

/// Generates, persists, caches and loads key pairs.
///
/// The cache is owned by the manager instance; share the manager through an
/// `Arc` rather than constructing one per call. Generation and the first load of
/// a key id are serialized on a per-id lock, so concurrent callers never generate
/// the same key twice or read a half-written key.
#[derive(Debug)]
pub struct KeyPairManager {
    dir: PathBuf,
    codec: PrivateKeyCodec,
    cache: RwLock<HashMap<String, Arc<KeyPair>>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyPairManager {
    pub fn new(dir: impl Into<PathBuf>, codec: PrivateKeyCodec) -> Self {
        Self {
            dir: dir.into(),
            codec,
            cache: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The keystore directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn codec(&self) -> &PrivateKeyCodec {
        &self.codec
    }

    fn paths(&self, key_id: &str) -> KeyPaths {
        KeyPaths {
            meta: self.dir.join(format!("{}.{}", key_id, META_EXT)),
            public: self.dir.join(format!("{}.{}", key_id, PUBLIC_EXT)),
            private: self.dir.join(format!("{}.{}", key_id, PRIVATE_EXT)),
        }
    }

    fn key_lock(&self, key_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(key_id.to_string())
            .or_default()
            .clone()
    }

    fn cached(&self, key_id: &str) -> Option<Arc<KeyPair>> {
        self.cache.read().get(key_id).cloned()
    }

    /// Generate and persist a new key pair with no expiry.
    pub fn generate(
        &self,
        key_id: &str,
        key_size: usize,
    ) -> Result<Arc<KeyPair>, KeyGenerationError> {
        self.generate_with_expiry(key_id, key_size, None)
    }

    /// Generate and persist a new key pair.
    ///
    /// Files are written private, then public, then metadata, each through a
    /// temp file and rename. A crash part-way leaves no metadata, so the key
    /// reads as absent rather than torn.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The key id or key size is invalid
    /// - A key with this id already exists
    /// - The RSA backend, envelope encryption or file writes fail
    pub fn generate_with_expiry(
        &self,
        key_id: &str,
        key_size: usize,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Arc<KeyPair>, KeyGenerationError> {
        if !is_valid_key_id(key_id) {
            return Err(KeyGenerationError::InvalidKeyId(key_id.to_string()));
        }
        if !(MIN_KEY_SIZE..=MAX_KEY_SIZE).contains(&key_size) {
            return Err(KeyGenerationError::InvalidKeySize(key_size));
        }

        let lock = self.key_lock(key_id);
        let _guard = lock.lock();

        let paths = self.paths(key_id);
        if paths.meta.exists() {
            return Err(KeyGenerationError::AlreadyExists(key_id.to_string()));
        }
        fs::create_dir_all(&self.dir)?;

        let pair = KeyPair::generate(key_id, key_size, expires_at)?;
        let private_blob = self.codec.encode_key(pair.private_key())?;
        let public_pem = pair.public_key_pem()?;
        let metadata = serde_json::to_vec_pretty(&pair.metadata())?;

        write_atomic(&paths.private, &private_blob, FileMode::Private)?;
        write_atomic(&paths.public, public_pem.as_bytes(), FileMode::Public)?;
        write_atomic(&paths.meta, &metadata, FileMode::Public)?;

        let pair = Arc::new(pair);
        self.cache
            .write()
            .insert(key_id.to_string(), pair.clone());

        tracing::info!("generated {}-bit key pair {}", key_size, key_id);
        Ok(pair)
    }

    /// Load a key pair, from the cache if possible.
    ///
    /// Returns `Ok(None)` when any of the three files is missing. The private
    /// envelope is decoded in the current format first and the legacy format
    /// second.
    ///
    /// # Errors
    ///
    /// Returns an error if the files exist but cannot be read or decoded, or if
    /// the public key does not belong to the private key.
    pub fn load(&self, key_id: &str) -> Result<Option<Arc<KeyPair>>, KeyLoadError> {
        if !is_valid_key_id(key_id) {
            return Err(KeyLoadError::InvalidKeyId(key_id.to_string()));
        }
        if let Some(pair) = self.cached(key_id) {
            tracing::debug!("key {} served from cache", key_id);
            return Ok(Some(pair));
        }

        // Unknown ids never get an entry in the lock table
        if !self.paths(key_id).meta.exists() {
            tracing::debug!("key {} not found in {}", key_id, self.dir.display());
            return Ok(None);
        }

        let lock = self.key_lock(key_id);
        let _guard = lock.lock();

        // Another caller may have finished loading while we waited for the lock
        if let Some(pair) = self.cached(key_id) {
            return Ok(Some(pair));
        }

        let Some(files) = self.read_files(key_id)? else {
            tracing::debug!("key {} not found in {}", key_id, self.dir.display());
            return Ok(None);
        };

        let metadata: KeyMetadata = serde_json::from_slice(&files.meta)?;
        let public_key = parse_public_key(&files.public)?;
        let decoded = self.codec.decode(&files.private)?;

        if decoded.key.to_public_key() != public_key {
            return Err(KeyLoadError::Mismatch(key_id.to_string()));
        }
        if metadata.key_id != key_id {
            tracing::warn!(
                "metadata for {} names key id {}, using the file name",
                key_id,
                metadata.key_id
            );
        }
        if decoded.format == EnvelopeFormat::Legacy {
            tracing::warn!(
                "key {} is stored in the legacy envelope format and should be migrated",
                key_id
            );
        }

        let metadata = KeyMetadata {
            key_id: key_id.to_string(),
            ..metadata
        };
        let pair = Arc::new(KeyPair::from_parts(metadata, decoded.key, public_key));
        self.cache
            .write()
            .insert(key_id.to_string(), pair.clone());
        Ok(Some(pair))
    }

    /// Load only the public key of `key_id`.
    ///
    /// Follows the same rule as [`load`](Self::load), all three files must be
    /// present, but never opens the private envelope. Verification therefore
    /// works on hosts without the master secret and costs no key derivation.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata or public key cannot be read or parsed.
    pub fn load_public(&self, key_id: &str) -> Result<Option<RsaPublicKey>, KeyLoadError> {
        if !is_valid_key_id(key_id) {
            return Err(KeyLoadError::InvalidKeyId(key_id.to_string()));
        }
        if let Some(pair) = self.cached(key_id) {
            return Ok(Some(pair.public_key().clone()));
        }

        let paths = self.paths(key_id);
        let Some(meta) = read_optional(&paths.meta)? else {
            return Ok(None);
        };
        let Some(public) = read_optional(&paths.public)? else {
            return Ok(None);
        };
        if !paths.private.is_file() {
            return Ok(None);
        }

        let _: KeyMetadata = serde_json::from_slice(&meta)?;
        parse_public_key(&public).map(Some)
    }

    /// Ids of every key with a metadata file, sorted
    pub fn list_key_ids(&self) -> Result<Vec<String>, KeystoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(META_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                if is_valid_key_id(stem) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// The public key PEM of `key_id`, or `None` if the key does not exist
    pub fn export_public(&self, key_id: &str) -> Result<Option<String>, KeystoreError> {
        match self.load(key_id)? {
            Some(pair) => Ok(Some(pair.public_key_pem()?)),
            None => Ok(None),
        }
    }

    /// Rewrite a legacy private key envelope in the current format.
    ///
    /// Returns `true` if the key was migrated and `false` if it already used the
    /// current format. The key material itself does not change.
    pub fn migrate_legacy(&self, key_id: &str) -> Result<bool, KeystoreError> {
        if !is_valid_key_id(key_id) {
            return Err(KeyLoadError::InvalidKeyId(key_id.to_string()).into());
        }

        if !self.paths(key_id).meta.exists() {
            return Err(KeystoreError::NotFound(key_id.to_string()));
        }

        let lock = self.key_lock(key_id);
        let _guard = lock.lock();

        let Some(files) = self.read_files(key_id)? else {
            return Err(KeystoreError::NotFound(key_id.to_string()));
        };
        let decoded = self.codec.decode(&files.private)?;
        if decoded.format == EnvelopeFormat::Current {
            return Ok(false);
        }

        let blob = self.codec.encode_key(&decoded.key)?;
        write_atomic(&self.paths(key_id).private, &blob, FileMode::Private)?;

        tracing::info!("migrated key {} to the current envelope format", key_id);
        Ok(true)
    }

    /// Migrate every legacy key in the keystore.
    ///
    /// A key that fails to migrate is recorded in the report and the pass moves
    /// on to the next one. Only failing to list the keystore is an error.
    pub fn migrate_all(&self) -> Result<MigrationReport, KeystoreError> {
        let mut report = MigrationReport::default();
        for key_id in self.list_key_ids()? {
            match self.migrate_legacy(&key_id) {
                Ok(true) => report.migrated.push(key_id),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("failed to migrate key {}: {}", key_id, e);
                    report.failed.push((key_id, e));
                }
            }
        }
        Ok(report)
    }

    fn read_files(&self, key_id: &str) -> Result<Option<KeyFiles>, std::io::Error> {
        let paths = self.paths(key_id);
        let Some(meta) = read_optional(&paths.meta)? else {
            return Ok(None);
        };
        let Some(public) = read_optional(&paths.public)? else {
            return Ok(None);
        };
        let Some(private) = read_optional(&paths.private)? else {
            return Ok(None);
        };
        Ok(Some(KeyFiles {
            meta,
            public,
            private: Zeroizing::new(private),
        }))
    }
}

#[derive(Clone, Copy)]
enum FileMode {
    Private,
    Public,
}

/// Replace `path` with `bytes` via a temp file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8], mode: FileMode) -> Result<(), std::io::Error> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let bits = match mode {
            FileMode::Private => 0o600,
            FileMode::Public => 0o644,
        };
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(bits))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, std::io::Error> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_public_key(bytes: &[u8]) -> Result<RsaPublicKey, KeyLoadError> {
    let pem = std::str::from_utf8(bytes)
        .map_err(|_| KeyLoadError::InvalidPublicKey("PEM is not UTF-8".to_string()))?;
    RsaPublicKey::from_public_key_pem(pem.trim())
        .map_err(|e| KeyLoadError::InvalidPublicKey(e.to_string()))
}
