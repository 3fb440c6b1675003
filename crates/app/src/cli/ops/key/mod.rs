use clap::{Args, Subcommand};

pub mod export;
pub mod generate;
pub mod list;
pub mod migrate;

use crate::cli::op::Op;

crate::command_enum! {
    (Generate, generate::Generate),
    (List, list::List),
    (Export, export::Export),
    (Migrate, migrate::Migrate),
}

// Rename the generated Command to KeyCommand for clarity
pub type KeyCommand = Command;

/// Manage signing keys
#[derive(Args, Debug, Clone)]
pub struct Key {
    #[command(subcommand)]
    pub command: KeyCommand,
}

#[async_trait::async_trait]
impl Op for Key {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
