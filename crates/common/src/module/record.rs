use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use super::ModuleError;
use crate::crypto::keys::from_unix_seconds;

/// A self-contained signature record for a plugin package.
///
/// Everything a verifier needs besides the package bytes and the signer's
/// public key travels in the record. Serialized as JSON with the raw
/// signature hex-encoded.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalSignature {
    pub module_name: String,
    pub version: String,
    /// Lowercase hex SHA-256 of the package content
    pub file_hash: String,
    #[serde_as(as = "Hex")]
    pub signature: Vec<u8>,
    pub signer_key_id: String,
    /// Unix seconds with sub-second precision
    pub timestamp: f64,
    pub algorithm: String,
}

/// Bytes actually signed. Field order is fixed and sorted, so the encoding
/// is byte-identical between signing and verification.
#[derive(Serialize)]
struct SignedPayload<'a> {
    algorithm: &'a str,
    file_hash: &'a str,
    module_name: &'a str,
    timestamp: f64,
    version: &'a str,
}

pub(crate) fn canonical_payload(
    module_name: &str,
    version: &str,
    file_hash: &str,
    timestamp: f64,
    algorithm: &str,
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&SignedPayload {
        algorithm,
        file_hash,
        module_name,
        timestamp,
        version,
    })
}

impl DigitalSignature {
    /// The canonical payload covered by [`Self::signature`]
    pub fn payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        canonical_payload(
            &self.module_name,
            &self.version,
            &self.file_hash,
            self.timestamp,
            &self.algorithm,
        )
    }

    pub fn signed_at(&self) -> DateTime<Utc> {
        from_unix_seconds(self.timestamp)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ModuleError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| ModuleError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read_from(path: &Path) -> Result<Self, ModuleError> {
        let json = std::fs::read_to_string(path).map_err(|source| ModuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_json(&json)?)
    }
}
