//! Plugin package signing
//!
//! A [`ModuleSigner`] binds a package's content hash to the name and version
//! from its manifest and signs the result with a keystore key. The output is a
//! [`DigitalSignature`] record that can travel alongside the package.
//!
//! # Signing
//! 1. Read the package bytes (see [`package`] for directories)
//! 2. SHA-256 the bytes
//! 3. Resolve name and version from the manifest
//! 4. Sign the canonical payload with RSA-PSS
//!
//! # Verification
//! Re-hash the package; on mismatch answer `false` without touching keys.
//! Otherwise rebuild the payload from the record and verify it against the
//! public key named by `signer_key_id`.

mod manifest;
pub mod package;
mod record;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::crypto::keys::to_unix_seconds;
use crate::crypto::{SignError, SignatureEngine, SIGNATURE_ALGORITHM};

pub use manifest::{ManifestInfo, DEFAULT_MANIFEST_FILE_NAME, DEFAULT_VERSION};
pub use record::DigitalSignature;

use manifest::ManifestResolver;
use package::{hash_content, read_package};

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("sign error: {0}")]
    Sign(#[from] SignError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Signs and verifies plugin packages.
#[derive(Debug, Clone)]
pub struct ModuleSigner {
    engine: Arc<SignatureEngine>,
    manifests: ManifestResolver,
}

impl ModuleSigner {
    pub fn new(engine: Arc<SignatureEngine>) -> Self {
        Self {
            engine,
            manifests: ManifestResolver::default(),
        }
    }

    /// Look for manifests named `file_name` instead of `manifest.json`
    pub fn with_manifest_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.manifests = ManifestResolver::new(file_name);
        self
    }

    pub fn engine(&self) -> &Arc<SignatureEngine> {
        &self.engine
    }

    /// Resolve the manifest info a signature for `package_path` would carry.
    pub fn manifest_info(&self, package_path: &Path) -> Result<ManifestInfo, ModuleError> {
        let content = read(package_path)?;
        Ok(self.manifests.resolve(package_path, &content))
    }

    /// Sign the package at `package_path` with `key_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the package cannot be read, or if `key_id` does not
    /// exist or cannot be loaded.
    pub fn sign_module(
        &self,
        package_path: &Path,
        key_id: &str,
    ) -> Result<DigitalSignature, ModuleError> {
        let content = read(package_path)?;
        let file_hash = hash_content(&content);
        let ManifestInfo { name, version } = self.manifests.resolve(package_path, &content);
        let timestamp = to_unix_seconds(Utc::now());

        let payload = record::canonical_payload(
            &name,
            &version,
            &file_hash,
            timestamp,
            SIGNATURE_ALGORITHM,
        )?;
        let signature = self.engine.sign(&payload, key_id)?;

        tracing::info!(
            "signed {} {} ({}) with key {}",
            name,
            version,
            package_path.display(),
            key_id
        );

        Ok(DigitalSignature {
            module_name: name,
            version,
            file_hash,
            signature,
            signer_key_id: key_id.to_string(),
            timestamp,
            algorithm: SIGNATURE_ALGORITHM.to_string(),
        })
    }

    /// Check `signature` against the package currently at `package_path`.
    ///
    /// Returns `Ok(false)` for any integrity or authenticity failure. Only an
    /// unreadable package is an error.
    pub fn verify_module_signature(
        &self,
        package_path: &Path,
        signature: &DigitalSignature,
    ) -> Result<bool, ModuleError> {
        let content = read(package_path)?;

        if !hash_content(&content).eq_ignore_ascii_case(&signature.file_hash) {
            tracing::warn!("content hash mismatch for {}", package_path.display());
            return Ok(false);
        }
        if signature.algorithm != SIGNATURE_ALGORITHM {
            tracing::warn!(
                "unsupported signature algorithm {} for {}",
                signature.algorithm,
                package_path.display()
            );
            return Ok(false);
        }

        let payload = match signature.payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("unencodable signature record: {}", e);
                return Ok(false);
            }
        };
        let valid = self
            .engine
            .verify(&payload, &signature.signature, &signature.signer_key_id);
        if !valid {
            tracing::warn!(
                "signature by {} rejected for {}",
                signature.signer_key_id,
                package_path.display()
            );
        }
        Ok(valid)
    }
}

fn read(package_path: &Path) -> Result<Vec<u8>, ModuleError> {
    read_package(package_path).map_err(|source| ModuleError::Io {
        path: package_path.to_path_buf(),
        source,
    })
}
