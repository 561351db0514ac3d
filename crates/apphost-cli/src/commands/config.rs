//! Configuration management CLI commands.

use std::path::Path;

use clap::{Args, Subcommand};

use apphost_core::config::AppConfig;
use apphost_core::error::AppError;

use crate::output::{self, OutputFormat};

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Validate the configuration and the modules directory
    Validate,
}

/// Execute config commands
pub async fn execute(
    args: &ConfigArgs,
    config: &AppConfig,
    config_path: &Path,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            output::print_item(config, format);
        }
        ConfigCommand::Validate => {
            let modules = &config.modules;
            if modules.hook_timeout_ms == 0 {
                return Err(AppError::configuration("modules.hook_timeout_ms must be positive"));
            }
            if modules.manifest_file.trim().is_empty() || modules.disabled_marker.trim().is_empty() {
                return Err(AppError::configuration(
                    "modules.manifest_file and modules.disabled_marker must not be empty",
                ));
            }

            output::print_success(&format!(
                "Configuration '{}' is valid",
                config_path.display()
            ));
            output::print_kv("modules root", &modules.root.display().to_string());
            output::print_kv("core module", &modules.core_module);
            output::print_kv("hook timeout", &format!("{} ms", modules.hook_timeout_ms));
            output::print_kv("log level", &config.logging.level);

            if !tokio::fs::try_exists(&modules.root).await.unwrap_or(false) {
                output::print_warning(&format!(
                    "Modules directory '{}' does not exist",
                    modules.root.display()
                ));
            }
        }
    }

    Ok(())
}
