//! Process-wide master secret
//!
//! Every symmetric key in the keystore is derived from one 32-byte secret that
//! lives in a single owner-only file. The secret is created lazily the first time
//! it is needed and then read once per process.

use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use zeroize::Zeroizing;

/// Size of the master secret in bytes
pub const MASTER_SECRET_SIZE: usize = 32;

/// Errors that can occur while reading or creating the master secret
#[derive(Debug, thiserror::Error)]
pub enum MasterSecretError {
    #[error("master secret error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("invalid master secret size, expected {MASTER_SECRET_SIZE}, got {0}")]
    InvalidLength(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The raw master secret. Zeroed on drop and never printed.
#[derive(Clone)]
pub struct MasterSecret(Zeroizing<[u8; MASTER_SECRET_SIZE]>);

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(..)")
    }
}

impl Deref for MasterSecret {
    type Target = [u8; MASTER_SECRET_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; MASTER_SECRET_SIZE]> for MasterSecret {
    fn from(bytes: [u8; MASTER_SECRET_SIZE]) -> Self {
        MasterSecret(Zeroizing::new(bytes))
    }
}

impl MasterSecret {
    /// Generate a new random secret using the OS RNG
    pub fn generate() -> Result<Self, MasterSecretError> {
        let mut bytes = Zeroizing::new([0u8; MASTER_SECRET_SIZE]);
        getrandom::getrandom(&mut bytes[..])
            .map_err(|e| anyhow::anyhow!("failed to generate random bytes: {}", e))?;
        Ok(MasterSecret(bytes))
    }

    /// Create a secret from a byte slice of exactly `MASTER_SECRET_SIZE` bytes
    pub fn from_slice(data: &[u8]) -> Result<Self, MasterSecretError> {
        if data.len() != MASTER_SECRET_SIZE {
            return Err(MasterSecretError::InvalidLength(data.len()));
        }
        let mut bytes = Zeroizing::new([0u8; MASTER_SECRET_SIZE]);
        bytes.copy_from_slice(data);
        Ok(MasterSecret(bytes))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

/// Owner of the master secret file.
///
/// The first successful [`MasterSecretStore::get_or_create`] caches the secret
/// for the lifetime of the store. No rotation API: a new secret orphans every
/// private key envelope already on disk.
#[derive(Debug)]
pub struct MasterSecretStore {
    path: PathBuf,
    cached: Mutex<Option<MasterSecret>>,
}

impl MasterSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the master secret, creating and persisting it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The secret file exists but is not exactly 32 bytes
    /// - The secret file cannot be read or created
    pub fn get_or_create(&self) -> Result<MasterSecret, MasterSecretError> {
        let mut cached = self.cached.lock();
        if let Some(secret) = cached.as_ref() {
            return Ok(secret.clone());
        }

        let secret = match Self::read(&self.path)? {
            Some(secret) => secret,
            None => self.create()?,
        };
        *cached = Some(secret.clone());
        Ok(secret)
    }

    fn read(path: &Path) -> Result<Option<MasterSecret>, MasterSecretError> {
        match fs::read(path) {
            Ok(bytes) => {
                let bytes = Zeroizing::new(bytes);
                MasterSecret::from_slice(&bytes).map(Some)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a fresh secret with exclusive-create semantics.
    ///
    /// The bytes go to a private temp file in the target directory which is then
    /// hard-linked into place without clobbering. If another process won the race
    /// its secret is read back instead, so both processes agree.
    fn create(&self) -> Result<MasterSecret, MasterSecretError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let secret = MasterSecret::generate()?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        tmp.write_all(secret.bytes())?;
        tmp.as_file().sync_all()?;

        match tmp.persist_noclobber(&self.path) {
            Ok(_) => {
                tracing::info!("created master secret at {}", self.path.display());
                Ok(secret)
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(
                    "master secret at {} was created concurrently, reading it back",
                    self.path.display()
                );
                Self::read(&self.path)?.ok_or_else(|| {
                    anyhow::anyhow!("master secret disappeared after concurrent creation")
                        .into()
                })
            }
            Err(e) => Err(e.error.into()),
        }
    }
}
