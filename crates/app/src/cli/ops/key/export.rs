use std::path::PathBuf;

use clap::Args;

use common::keystore::KeystoreError;

/// Print (or write) a key's public PEM
#[derive(Args, Debug, Clone)]
pub struct Export {
    pub key_id: String,

    /// Write the PEM to this file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Export {
    type Error = ExportError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let keystore = ctx.state()?.keystore();
        let pem = keystore
            .keys()
            .export_public(&self.key_id)?
            .ok_or_else(|| ExportError::NotFound(self.key_id.clone()))?;

        match &self.out {
            Some(path) => {
                std::fs::write(path, &pem).map_err(|source| ExportError::Write {
                    path: path.clone(),
                    source,
                })?;
                Ok(format!(
                    "Exported public key {} to {}",
                    self.key_id,
                    path.display()
                ))
            }
            None => Ok(pem.trim_end().to_string()),
        }
    }
}
