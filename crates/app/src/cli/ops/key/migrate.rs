use clap::Args;

use common::keystore::{KeystoreError, MigrationReport};

/// Re-encrypt legacy private keys in the current format
#[derive(Args, Debug, Clone)]
pub struct Migrate {
    /// Migrate only this key (default: every key)
    pub key_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
    #[error("migration task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("{0}")]
    Incomplete(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Migrate {
    type Error = MigrateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let keystore = ctx.state()?.keystore();
        let key_id = self.key_id.clone();

        let report = tokio::task::spawn_blocking(move || match key_id {
            Some(key_id) => keystore
                .keys()
                .migrate_legacy(&key_id)
                .map(|migrated| MigrationReport {
                    migrated: if migrated { vec![key_id] } else { Vec::new() },
                    failed: Vec::new(),
                }),
            None => keystore.keys().migrate_all(),
        })
        .await??;

        let summary = summarize(&report);
        if report.is_clean() {
            Ok(summary)
        } else {
            Err(MigrateError::Incomplete(summary))
        }
    }
}

fn summarize(report: &MigrationReport) -> String {
    let mut lines = Vec::new();
    if report.migrated.is_empty() {
        lines.push("No legacy keys to migrate".to_string());
    } else {
        lines.push(format!("Migrated: {}", report.migrated.join(", ")));
    }
    for (key_id, e) in &report.failed {
        lines.push(format!("Failed: {} ({})", key_id, e));
    }
    lines.join("\n")
}
