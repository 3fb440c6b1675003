use clap::Args;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Default RSA key size for `key generate` (bits)
    #[arg(long, default_value_t = common::crypto::DEFAULT_KEY_SIZE)]
    pub key_size: usize,

    /// Manifest file name looked up beside or inside packages
    #[arg(long, default_value = common::module::DEFAULT_MANIFEST_FILE_NAME)]
    pub manifest_file_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            default_key_size: self.key_size,
            manifest_file_name: self.manifest_file_name.clone(),
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let output = format!(
            "Initialized modseal directory at: {}\n\
             - Keys: {}\n\
             - Master secret: {}\n\
             - Config: {}\n\
             - Default key size: {} bits\n\
             - Manifest file name: {}",
            state.modseal_dir.display(),
            state.keys_path.display(),
            state.master_key_path.display(),
            state.config_path.display(),
            state.config.default_key_size,
            state.config.manifest_file_name,
        );

        Ok(output)
    }
}
