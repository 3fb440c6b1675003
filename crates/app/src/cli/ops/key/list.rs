use clap::Args;

use common::crypto::{KeyError, KeyLoadError};
use common::keystore::KeystoreError;

/// List every key in the keystore
#[derive(Args, Debug, Clone)]
pub struct List;

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
    #[error(transparent)]
    Load(#[from] KeyLoadError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("key list task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for List {
    type Error = ListError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let keystore = ctx.state()?.keystore();

        let lines = tokio::task::spawn_blocking(move || -> Result<Vec<String>, ListError> {
            let mut lines = Vec::new();
            for key_id in keystore.keys().list_key_ids()? {
                // Partially written keys are listed by id only
                let Some(pair) = keystore.keys().load(&key_id)? else {
                    lines.push(format!("{} (incomplete)", key_id));
                    continue;
                };
                let mut line = format!(
                    "{} ({} bits, created {}",
                    key_id,
                    pair.key_size(),
                    pair.created_at().to_rfc3339()
                );
                if let Some(expires_at) = pair.expires_at() {
                    line.push_str(&format!(", expires {}", expires_at.to_rfc3339()));
                }
                line.push_str(&format!(")\n  fingerprint {}", pair.fingerprint()?));
                lines.push(line);
            }
            Ok(lines)
        })
        .await??;

        if lines.is_empty() {
            Ok("No keys found".to_string())
        } else {
            Ok(lines.join("\n"))
        }
    }
}
