use std::path::PathBuf;

use clap::Args;

use common::module::{DigitalSignature, ModuleError};

use super::sign::default_signature_path;

/// Check a package against its signature record
#[derive(Args, Debug, Clone)]
pub struct Verify {
    /// Package file or directory
    pub package: PathBuf,

    /// Signature record (default: `<package>.sig.json`)
    #[arg(long)]
    pub signature: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error("signature INVALID for {0}")]
    Invalid(PathBuf),
    #[error("verification task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Verify {
    type Error = VerifyError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let keystore = ctx.state()?.keystore();
        let signature_path = self
            .signature
            .clone()
            .unwrap_or_else(|| default_signature_path(&self.package));
        let signature = DigitalSignature::read_from(&signature_path)?;

        let package = self.package.clone();
        let record = signature.clone();
        let valid = tokio::task::spawn_blocking(move || {
            keystore.signer().verify_module_signature(&package, &record)
        })
        .await??;

        if !valid {
            return Err(VerifyError::Invalid(self.package.clone()));
        }

        Ok(format!(
            "VALID: {} {} signed by {} at {}",
            signature.module_name,
            signature.version,
            signature.signer_key_id,
            signature.signed_at().to_rfc3339()
        ))
    }
}
