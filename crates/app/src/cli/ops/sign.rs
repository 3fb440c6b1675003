use std::path::{Path, PathBuf};

use clap::Args;

use common::module::ModuleError;

/// Sign a plugin package and write a `.sig.json` record beside it
#[derive(Args, Debug, Clone)]
pub struct Sign {
    /// Package file or directory
    pub package: PathBuf,

    /// Key to sign with
    #[arg(long)]
    pub key: String,

    /// Signature record path (default: `<package>.sig.json`)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error("signing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// `<dir>/<name>.sig.json` for a package at `<dir>/<name>`
pub fn default_signature_path(package: &Path) -> PathBuf {
    let name = package
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());
    let parent = package.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{}.sig.json", name))
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Sign {
    type Error = SignError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let keystore = ctx.state()?.keystore();
        let package = self.package.clone();
        let key_id = self.key.clone();
        let out = self
            .out
            .clone()
            .unwrap_or_else(|| default_signature_path(&self.package));

        let signature = {
            let out = out.clone();
            tokio::task::spawn_blocking(move || -> Result<_, ModuleError> {
                let signature = keystore.signer().sign_module(&package, &key_id)?;
                signature.write_to(&out)?;
                Ok(signature)
            })
            .await??
        };

        Ok(format!(
            "Signed {} {} with key {}\n\
             - Hash: {}\n\
             - Signature: {}",
            signature.module_name,
            signature.version,
            signature.signer_key_id,
            signature.file_hash,
            out.display()
        ))
    }
}
