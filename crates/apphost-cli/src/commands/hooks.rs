//! Hook inspection CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use apphost_core::config::AppConfig;
use apphost_core::error::AppError;

use crate::output::{self, OutputFormat};

/// Arguments for hook commands
#[derive(Debug, Args)]
pub struct HooksArgs {
    /// Hook subcommand
    #[command(subcommand)]
    pub command: HooksCommand,
}

/// Hook subcommands
#[derive(Debug, Subcommand)]
pub enum HooksCommand {
    /// List defined hooks and the modules implementing them
    List,
}

/// Hook display row for table output
#[derive(Debug, Serialize, Tabled)]
struct HookRow {
    /// Hook name
    name: String,
    /// Aggregation policy
    policy: String,
    /// Argument and result types
    signature: String,
    /// Defining module
    defined_by: String,
    /// Implementing modules, in dispatch order
    implementations: String,
}

/// Execute hook commands
pub async fn execute(
    args: &HooksArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let runtime = super::boot_runtime(config).await?;
    let dispatcher = runtime.dispatcher();

    match &args.command {
        HooksCommand::List => {
            let mut rows = Vec::new();
            for definition in dispatcher.definitions().await {
                let implementations = dispatcher.implementations(&definition.name).await?;
                rows.push(HookRow {
                    name: definition.name,
                    policy: definition.policy.to_string(),
                    signature: definition.signature.to_string(),
                    defined_by: definition.defined_by,
                    implementations: implementations.join(", "),
                });
            }
            output::print_list(&rows, format);
        }
    }

    Ok(())
}
