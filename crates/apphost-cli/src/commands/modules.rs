//! Module management CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use apphost_core::config::AppConfig;
use apphost_core::error::AppError;
use apphost_module::surface::{self, AppTile, ModuleEntry};

use crate::output::{self, OutputFormat};

/// Arguments for module commands
#[derive(Debug, Args)]
pub struct ModulesArgs {
    /// Module subcommand
    #[command(subcommand)]
    pub command: ModulesCommand,
}

/// Module subcommands
#[derive(Debug, Subcommand)]
pub enum ModulesCommand {
    /// List every discovered module with its state
    List,
    /// List active app modules (the applications grid)
    Apps,
    /// Show the resolved activation order
    Order,
    /// Report manifest, dependency, and activation problems
    Check,
    /// Enable an app module
    Enable {
        /// Module name
        name: String,
    },
    /// Disable an app module
    Disable {
        /// Module name
        name: String,
        /// Skip the confirmation when active modules depend on it
        #[arg(short, long)]
        yes: bool,
    },
    /// Show which module owns a request path
    Route {
        /// Request path, e.g. /billing/invoices
        path: String,
    },
}

/// Module display row for table output
#[derive(Debug, Serialize, Tabled)]
struct ModuleRow {
    /// Name
    name: String,
    /// Version
    version: String,
    /// Kind
    kind: String,
    /// Enabled flag
    enabled: bool,
    /// Active flag
    active: bool,
    /// Status
    status: String,
    /// Dependencies
    depends: String,
}

impl From<ModuleEntry> for ModuleRow {
    fn from(entry: ModuleEntry) -> Self {
        Self {
            name: entry.name,
            version: entry.version,
            kind: entry.kind.to_string(),
            enabled: entry.enabled,
            active: entry.active,
            status: entry.status,
            depends: entry.depends.join(", "),
        }
    }
}

/// App tile row for table output
#[derive(Debug, Serialize, Tabled)]
struct AppRow {
    /// Name
    name: String,
    /// Version
    version: String,
    /// Route
    route: String,
    /// Icon
    icon: String,
    /// Description
    description: String,
}

impl From<AppTile> for AppRow {
    fn from(tile: AppTile) -> Self {
        Self {
            name: tile.name,
            version: tile.version,
            route: tile.route.unwrap_or_default(),
            icon: tile.icon_class.unwrap_or_default(),
            description: tile.description.unwrap_or_default(),
        }
    }
}

/// Activation order row
#[derive(Debug, Serialize, Tabled)]
struct OrderRow {
    /// Position
    position: usize,
    /// Module
    module: String,
    /// Active flag
    active: bool,
}

/// Problem row for `modules check`
#[derive(Debug, Serialize, Tabled)]
struct ProblemRow {
    /// Stage that reported the problem
    stage: String,
    /// Module name or manifest location
    subject: String,
    /// Detail
    detail: String,
}

/// Execute module commands
pub async fn execute(
    args: &ModulesArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let runtime = super::boot_runtime(config).await?;

    match &args.command {
        ModulesCommand::List => {
            let rows: Vec<ModuleRow> = surface::module_catalog_view(runtime.registry())
                .await
                .into_iter()
                .map(ModuleRow::from)
                .collect();
            output::print_list(&rows, format);
        }
        ModulesCommand::Apps => {
            let rows: Vec<AppRow> = surface::apps_grid(runtime.registry())
                .await
                .into_iter()
                .map(AppRow::from)
                .collect();
            output::print_list(&rows, format);
        }
        ModulesCommand::Order => {
            let mut rows = Vec::new();
            for (index, module) in runtime.registry().activation_order().await.into_iter().enumerate() {
                let active = runtime.registry().is_active(&module).await;
                rows.push(OrderRow {
                    position: index + 1,
                    module,
                    active,
                });
            }
            output::print_list(&rows, format);
        }
        ModulesCommand::Check => {
            let report = runtime.report();
            let mut rows: Vec<ProblemRow> = report
                .rejected
                .iter()
                .map(|r| ProblemRow {
                    stage: "manifest".to_string(),
                    subject: r.location.clone(),
                    detail: r.error.to_string(),
                })
                .collect();
            rows.extend(report.resolve_failures.iter().map(|f| ProblemRow {
                stage: "resolve".to_string(),
                subject: f.module.clone(),
                detail: f.error.to_string(),
            }));
            rows.extend(report.activation_failures.iter().map(|f| ProblemRow {
                stage: "activate".to_string(),
                subject: f.module.clone(),
                detail: f.reason.clone(),
            }));
            rows.extend(report.orphaned.iter().map(|name| ProblemRow {
                stage: "catalog".to_string(),
                subject: name.clone(),
                detail: "compiled-in module has no manifest".to_string(),
            }));

            if rows.is_empty() {
                output::print_success(&format!(
                    "{} module(s) resolved without problems (booted {})",
                    runtime.registry().count().await,
                    report.booted_at.format("%Y-%m-%d %H:%M:%S UTC")
                ));
                return Ok(());
            }

            output::print_list(&rows, format);
            if report.fault_count() > 0 {
                return Err(AppError::module(format!(
                    "{} module fault(s) found",
                    report.fault_count()
                )));
            }
        }
        ModulesCommand::Enable { name } => {
            let outcome = runtime.toggle(name, true).await?;
            output::print_success(&format!("Module '{}' enabled", outcome.module));
            for module in &outcome.activated {
                output::print_kv("activated", module);
            }
            if outcome.restart_required {
                output::print_warning("Restart the host to apply hook registrations");
            }
        }
        ModulesCommand::Disable { name, yes } => {
            let mut affected = Vec::new();
            for dependent in runtime.registry().dependents_of(name).await? {
                if runtime.registry().is_active(&dependent).await {
                    affected.push(dependent);
                }
            }

            if !affected.is_empty() && !yes {
                let confirm = dialoguer::Confirm::new()
                    .with_prompt(format!(
                        "Disabling '{}' also deactivates: {}. Continue?",
                        name,
                        affected.join(", ")
                    ))
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::internal(format!("Input error: {}", e)))?;

                if !confirm {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let outcome = runtime.toggle(name, false).await?;
            output::print_success(&format!("Module '{}' disabled", outcome.module));
            for module in &outcome.deactivated {
                output::print_kv("deactivated", module);
            }
            if outcome.restart_required {
                output::print_warning("Restart the host to apply hook registrations");
            }
        }
        ModulesCommand::Route { path } => match runtime.current_module(path).await {
            Some(state) => {
                let entry = ModuleEntry::from(&state);
                output::print_item(&entry, format);
            }
            None => {
                return Err(AppError::not_found(format!(
                    "No active module owns '{}' and '{}' is not active",
                    path, config.modules.core_module
                )));
            }
        },
    }

    Ok(())
}
