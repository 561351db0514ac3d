//! Activation pipeline — manifests → resolution → registry → module callbacks.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use apphost_core::config::modules::ModulesConfig;

use crate::catalog::ModuleCatalog;
use crate::error::ModuleError;
use crate::hooks::dispatcher::{DEFAULT_HOOK_TIMEOUT, HookDispatcher};
use crate::hooks::registry::HookRegistry;
use crate::manifest::{FsManifestStore, ManifestRejection, ManifestStore};
use crate::registry::ModuleRegistry;
use crate::resolver::ResolveFailure;
use crate::runtime::Runtime;
use crate::surface;
use crate::traits::ActivationContext;

/// A module whose activation callback failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationFailure {
    /// Display name of the module.
    pub module: String,
    /// Error or panic message.
    pub reason: String,
    /// Dependents faulted as a consequence.
    pub cascaded: Vec<String>,
}

/// What happened during one boot.
#[derive(Debug, Clone)]
pub struct BootReport {
    /// When the boot finished.
    pub booted_at: DateTime<Utc>,
    /// Manifests excluded by the store.
    pub rejected: Vec<ManifestRejection>,
    /// Modules excluded by dependency resolution.
    pub resolve_failures: Vec<ResolveFailure>,
    /// Modules whose activation callback failed.
    pub activation_failures: Vec<ActivationFailure>,
    /// Modules activated with a catalog entry, in activation order.
    pub activated: Vec<String>,
    /// Active modules without a catalog entry.
    pub data_only: Vec<String>,
    /// Catalog entries without a manifest.
    pub orphaned: Vec<String>,
}

impl BootReport {
    fn new() -> Self {
        Self {
            booted_at: Utc::now(),
            rejected: Vec::new(),
            resolve_failures: Vec::new(),
            activation_failures: Vec::new(),
            activated: Vec::new(),
            data_only: Vec::new(),
            orphaned: Vec::new(),
        }
    }

    /// Whether every discovered module came up without a fault.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
            && self.resolve_failures.is_empty()
            && self.activation_failures.is_empty()
    }

    /// Number of rejected, unresolvable, or failed modules.
    pub fn fault_count(&self) -> usize {
        self.rejected.len() + self.resolve_failures.len() + self.activation_failures.len()
    }
}

/// Builds a [`Runtime`] from a manifest store and a module catalog.
#[derive(Debug, Clone)]
pub struct ActivationPipeline {
    /// Manifest source.
    store: Arc<dyn ManifestStore>,
    /// Compiled-in module code.
    catalog: ModuleCatalog,
    /// Per-call hook timeout.
    hook_timeout: Duration,
    /// Fallback owner for request paths.
    core_module: String,
}

impl ActivationPipeline {
    /// Creates a pipeline over an arbitrary store.
    pub fn new(store: Arc<dyn ManifestStore>, catalog: ModuleCatalog) -> Self {
        Self {
            store,
            catalog,
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
            core_module: ModulesConfig::default().core_module,
        }
    }

    /// Creates a filesystem-backed pipeline from configuration.
    pub fn from_config(config: &ModulesConfig, catalog: ModuleCatalog) -> Self {
        Self {
            store: Arc::new(FsManifestStore::from_config(config)),
            catalog,
            hook_timeout: config.hook_timeout(),
            core_module: config.core_module.clone(),
        }
    }

    /// Overrides the per-call hook timeout.
    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = timeout;
        self
    }

    /// Overrides the fallback module for request paths.
    pub fn with_core_module(mut self, name: impl Into<String>) -> Self {
        self.core_module = name.into();
        self
    }

    /// The manifest store.
    pub fn store(&self) -> &Arc<dyn ManifestStore> {
        &self.store
    }

    /// Fallback module for request paths.
    pub fn core_module(&self) -> &str {
        &self.core_module
    }

    /// Runs the full pipeline.
    ///
    /// Only an unreadable store or a clash with the host's own hooks fails
    /// the boot; module-level problems are recorded in the [`BootReport`].
    pub async fn boot(&self) -> Result<Runtime, ModuleError> {
        let mut report = BootReport::new();

        let scan = self.store.list_manifests().await?;
        let disabled = self.store.disabled_flags(&scan.manifests).await?;
        report.rejected = scan.rejected;

        let registry = Arc::new(ModuleRegistry::new());
        let resolution = registry.load(&scan.manifests, &disabled).await;
        report.resolve_failures = resolution.failures;

        let dispatcher = Arc::new(HookDispatcher::with_timeout(
            Arc::new(HookRegistry::new()),
            self.hook_timeout,
        ));
        dispatcher.set_activation_order(&resolution.order).await;
        surface::define_surface_hooks(&dispatcher).await?;

        for name in &resolution.order {
            if !registry.is_active(name).await {
                debug!(module = %name, "Skipping inactive module");
                continue;
            }

            let Some(module) = self.catalog.get(name) else {
                debug!(module = %name, "No code registered, activating as data-only module");
                report.data_only.push(name.clone());
                continue;
            };

            let mut ctx = ActivationContext::new(name.clone(), &dispatcher);
            let outcome = AssertUnwindSafe(module.activate(&mut ctx)).catch_unwind().await;

            let reason = match outcome {
                Ok(Ok(())) => {
                    info!(
                        module = %name,
                        defined = ctx.defined_hooks().len(),
                        registered = ctx.registered_count(),
                        "Module activated"
                    );
                    report.activated.push(name.clone());
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => "activation callback panicked".to_string(),
            };

            error!(module = %name, reason = %reason, "Module activation failed");
            let removed = dispatcher.unregister_module(name).await;
            let cascaded = registry.mark_failed(name, &reason).await?;
            debug!(module = %name, removed, "Implementations of failed module removed");

            report.activation_failures.push(ActivationFailure {
                module: name.clone(),
                reason,
                cascaded,
            });
        }

        for name in self.catalog.names() {
            if registry.get(&name).await.is_none() {
                warn!(module = %name, "Module code has no manifest, ignored");
                report.orphaned.push(name);
            }
        }

        report.booted_at = Utc::now();
        info!(
            modules = registry.count().await,
            active = registry.list_active().await.len(),
            faults = report.fault_count(),
            "Boot complete"
        );

        Ok(Runtime::new(registry, dispatcher, self.clone(), report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apphost_core::error::AppError;
    use apphost_core::result::AppResult;
    use async_trait::async_trait;

    use crate::hooks::definitions::{AggregationPolicy, HookSpec};
    use crate::manifest::{MemoryManifestStore, ModuleKind, ModuleManifest};
    use crate::surface::{MODIFY_VIEW, render_view_fragments};
    use crate::traits::Module;

    const LEDGER: HookSpec<(), Vec<String>> =
        HookSpec::new("ledger_lines", AggregationPolicy::CollectAll);

    #[derive(Debug)]
    struct Billing;

    #[async_trait]
    impl Module for Billing {
        fn name(&self) -> &str {
            "billing"
        }

        async fn activate(&self, ctx: &mut ActivationContext<'_>) -> AppResult<()> {
            ctx.define(&LEDGER).await?;
            ctx.register_fn(&MODIFY_VIEW, |_: &()| Ok(Some(vec!["<billing/>".to_string()])))
                .await?;
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Reports;

    #[async_trait]
    impl Module for Reports {
        fn name(&self) -> &str {
            "reports"
        }

        async fn activate(&self, ctx: &mut ActivationContext<'_>) -> AppResult<()> {
            ctx.register_fn(&LEDGER, |_: &()| Ok(Some(vec!["total".to_string()])))
                .await?;
            ctx.register_fn(&MODIFY_VIEW, |_: &()| Ok(Some(vec!["<reports/>".to_string()])))
                .await?;
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Broken;

    #[async_trait]
    impl Module for Broken {
        fn name(&self) -> &str {
            "billing"
        }

        async fn activate(&self, ctx: &mut ActivationContext<'_>) -> AppResult<()> {
            ctx.register_fn(&MODIFY_VIEW, |_: &()| Ok(Some(vec!["<half/>".to_string()])))
                .await?;
            Err(AppError::internal("database unavailable"))
        }
    }

    #[derive(Debug)]
    struct Redefiner;

    #[async_trait]
    impl Module for Redefiner {
        fn name(&self) -> &str {
            "billing"
        }

        async fn activate(&self, ctx: &mut ActivationContext<'_>) -> AppResult<()> {
            ctx.register_fn(&MODIFY_VIEW, |_: &()| Ok(Some(vec!["<billing/>".to_string()])))
                .await?;
            ctx.define(&MODIFY_VIEW).await?;
            Ok(())
        }
    }

    fn store() -> MemoryManifestStore {
        MemoryManifestStore::new().with_manifests([
            ModuleManifest::new("core", "1.0", ModuleKind::System),
            ModuleManifest::new("billing", "1.0", ModuleKind::App).depends_on("core"),
            ModuleManifest::new("reports", "1.0", ModuleKind::App).depends_on("billing"),
        ])
    }

    #[tokio::test]
    async fn test_boot_activates_in_order() {
        let pipeline = ActivationPipeline::new(
            Arc::new(store()),
            ModuleCatalog::new().with(Reports).with(Billing),
        );
        let runtime = pipeline.boot().await.unwrap();
        let report = runtime.report();

        assert!(report.is_clean());
        assert_eq!(report.activated, vec!["billing", "reports"]);
        assert_eq!(report.data_only, vec!["core"]);
        assert_eq!(
            render_view_fragments(runtime.dispatcher()).await.unwrap(),
            "<billing/>\n<reports/>"
        );
        assert_eq!(
            runtime.dispatcher().definitions().await.iter().find(|d| d.name == "ledger_lines").unwrap().defined_by,
            "billing"
        );
    }

    #[tokio::test]
    async fn test_activation_failure_cascades() {
        let pipeline = ActivationPipeline::new(
            Arc::new(store()),
            ModuleCatalog::new().with(Broken).with(Reports),
        );
        let runtime = pipeline.boot().await.unwrap();
        let report = runtime.report();

        assert_eq!(report.activation_failures.len(), 1);
        let failure = &report.activation_failures[0];
        assert_eq!(failure.module, "billing");
        assert!(failure.reason.contains("database unavailable"));
        assert_eq!(failure.cascaded, vec!["reports"]);

        let active: Vec<String> = runtime
            .registry()
            .list_active()
            .await
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(active, vec!["core"]);
        // The partial registration was rolled back.
        assert_eq!(render_view_fragments(runtime.dispatcher()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_unknown_hook_fails_module_only() {
        // Reports registers against a hook only billing defines.
        let store = store().with_disabled("billing");
        let pipeline = ActivationPipeline::new(
            Arc::new(store),
            ModuleCatalog::new().with(Billing).with(Reports),
        );
        let runtime = pipeline.boot().await.unwrap();
        assert!(runtime.report().activation_failures.is_empty());
        assert!(!runtime.registry().is_active("reports").await);

        let manifests = MemoryManifestStore::new().with_manifests([
            ModuleManifest::new("core", "1.0", ModuleKind::System),
            ModuleManifest::new("reports", "1.0", ModuleKind::App).depends_on("core"),
        ]);
        let runtime = ActivationPipeline::new(Arc::new(manifests), ModuleCatalog::new().with(Reports))
            .boot()
            .await
            .unwrap();
        let failure = &runtime.report().activation_failures[0];
        assert_eq!(failure.module, "reports");
        assert!(failure.reason.contains("ledger_lines"));
        assert!(runtime.registry().is_active("core").await);
    }

    #[tokio::test]
    async fn test_duplicate_definition_fails_module_only() {
        let pipeline = ActivationPipeline::new(
            Arc::new(store()),
            ModuleCatalog::new().with(Redefiner).with(Reports),
        );
        let runtime = pipeline.boot().await.unwrap();
        let report = runtime.report();

        assert_eq!(report.activation_failures.len(), 1);
        let failure = &report.activation_failures[0];
        assert_eq!(failure.module, "billing");
        assert!(failure.reason.contains("modify_view"));
        assert!(failure.reason.contains("already defined"));
        assert_eq!(failure.cascaded, vec!["reports"]);
        assert!(report.activated.is_empty());

        assert!(runtime.registry().is_active("core").await);
        assert!(!runtime.registry().is_active("billing").await);
        assert!(!runtime.registry().is_active("reports").await);

        // The host definition survives and the earlier registration is gone.
        let definition = runtime
            .dispatcher()
            .definitions()
            .await
            .into_iter()
            .find(|d| d.name == "modify_view")
            .unwrap();
        assert_eq!(definition.defined_by, "host");
        assert_eq!(render_view_fragments(runtime.dispatcher()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_builder_overrides() {
        let pipeline = ActivationPipeline::new(Arc::new(store()), ModuleCatalog::new())
            .with_hook_timeout(Duration::from_millis(750))
            .with_core_module("billing");
        assert_eq!(pipeline.core_module(), "billing");

        let runtime = pipeline.boot().await.unwrap();
        assert_eq!(runtime.dispatcher().timeout(), Duration::from_millis(750));
        assert_eq!(runtime.current_module("/unknown").await.unwrap().name(), "billing");
    }

    #[tokio::test]
    async fn test_orphaned_catalog_entries() {
        let manifests =
            MemoryManifestStore::new().with_manifest(ModuleManifest::new("core", "1.0", ModuleKind::System));
        let runtime = ActivationPipeline::new(Arc::new(manifests), ModuleCatalog::new().with(Billing))
            .boot()
            .await
            .unwrap();
        assert_eq!(runtime.report().orphaned, vec!["billing"]);
        assert!(runtime.report().activated.is_empty());
    }
}
