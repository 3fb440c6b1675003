use chrono::{Duration, Utc};
use clap::Args;

use common::keystore::KeyGenerationError;

#[derive(Args, Debug, Clone)]
pub struct Generate {
    /// Identifier for the new key pair
    pub key_id: String,

    /// RSA modulus size in bits (default from config)
    #[arg(long)]
    pub key_size: Option<usize>,

    /// Record an expiry this many days from now
    #[arg(long)]
    pub expires_in_days: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Generation(#[from] KeyGenerationError),
    #[error("key error: {0}")]
    Key(#[from] common::crypto::KeyError),
    #[error("key generation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Generate {
    type Error = GenerateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let keystore = state.keystore();
        let key_id = self.key_id.clone();
        let key_size = self.key_size.unwrap_or(state.config.default_key_size);
        let expires_at = self
            .expires_in_days
            .map(|days| Utc::now() + Duration::days(i64::from(days)));

        let pair = tokio::task::spawn_blocking(move || {
            keystore
                .keys()
                .generate_with_expiry(&key_id, key_size, expires_at)
        })
        .await??;

        let expires = pair
            .expires_at()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());

        Ok(format!(
            "Generated key {}\n\
             - Size: {} bits\n\
             - Expires: {}\n\
             - Fingerprint: {}",
            pair.key_id(),
            pair.key_size(),
            expires,
            pair.fingerprint()?
        ))
    }
}
