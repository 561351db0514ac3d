//! CLI command definitions and dispatch.

pub mod config;
pub mod hooks;
pub mod modules;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use apphost_core::config::AppConfig;
use apphost_core::error::AppError;
use apphost_module::{ActivationPipeline, Runtime};

use crate::builtin;
use crate::output::OutputFormat;

/// AppHost — modular application host administration
#[derive(Debug, Parser)]
#[command(name = "apphost", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Environment overlay used when the configuration file does not exist
    #[arg(short, long, env = "APPHOST_ENV", default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Module inspection and enable/disable
    Modules(modules::ModulesArgs),
    /// Hook inspection
    Hooks(hooks::HooksArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Loads configuration from `--config`, or from the layered defaults
    /// when that file does not exist.
    pub fn load_config(&self) -> Result<AppConfig, AppError> {
        if self.config.exists() {
            AppConfig::load_from(&self.config)
        } else {
            AppConfig::load(&self.env)
        }
    }

    /// Execute the CLI command
    pub async fn execute(&self, config: &AppConfig) -> Result<(), AppError> {
        match &self.command {
            Commands::Modules(args) => modules::execute(args, config, self.format).await,
            Commands::Hooks(args) => hooks::execute(args, config, self.format).await,
            Commands::Config(args) => config::execute(args, config, &self.config, self.format).await,
        }
    }
}

/// Helper: boot the module runtime with the compiled-in catalog
pub async fn boot_runtime(config: &AppConfig) -> Result<Runtime, AppError> {
    debug!(root = %config.modules.root.display(), "Booting module runtime");
    let runtime = ActivationPipeline::from_config(&config.modules, builtin::catalog())
        .boot()
        .await?;
    Ok(runtime)
}
