//! Runtime — the booted host: registry, dispatcher, and toggle serialization.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::error::ModuleError;
use crate::hooks::definitions::{HookOutput, HookSpec};
use crate::hooks::dispatcher::{DispatchResult, HookDispatcher};
use crate::manifest::ManifestStore;
use crate::pipeline::{ActivationPipeline, BootReport};
use crate::registry::{ModuleRegistry, ModuleState, ToggleOutcome};
use crate::surface;

/// A booted host.
///
/// Produced by [`ActivationPipeline::boot`]. Hook registrations reflect the
/// module states at boot time; after a toggle, [`Runtime::reload`] produces a
/// runtime with refreshed registrations.
#[derive(Debug)]
pub struct Runtime {
    /// Module table.
    registry: Arc<ModuleRegistry>,
    /// Hook dispatcher.
    dispatcher: Arc<HookDispatcher>,
    /// Pipeline this runtime was built by, reused by `reload`.
    pipeline: ActivationPipeline,
    /// Boot outcome.
    report: BootReport,
    /// Serializes toggles.
    toggle_lock: Mutex<()>,
}

impl Runtime {
    pub(crate) fn new(
        registry: Arc<ModuleRegistry>,
        dispatcher: Arc<HookDispatcher>,
        pipeline: ActivationPipeline,
        report: BootReport,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            pipeline,
            report,
            toggle_lock: Mutex::new(()),
        }
    }

    /// Returns the module registry.
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Returns the hook dispatcher.
    pub fn dispatcher(&self) -> &Arc<HookDispatcher> {
        &self.dispatcher
    }

    /// Returns the manifest store.
    pub fn store(&self) -> &Arc<dyn ManifestStore> {
        self.pipeline.store()
    }

    /// Returns the boot report.
    pub fn report(&self) -> &BootReport {
        &self.report
    }

    /// Fires a hook.
    pub async fn fire<A, R>(&self, spec: &HookSpec<A, R>, args: &A) -> Result<DispatchResult<R>, ModuleError>
    where
        A: Sync + 'static,
        R: HookOutput,
    {
        self.dispatcher.fire(spec, args).await
    }

    /// Module owning a request path, falling back to the core module.
    pub async fn current_module(&self, path: &str) -> Option<ModuleState> {
        surface::current_module(&self.registry, path, self.pipeline.core_module()).await
    }

    /// Enables or disables an app module.
    ///
    /// Validates, persists the marker, then applies the flag to the registry.
    /// Concurrent toggles run one at a time. A failed store write leaves the
    /// registry untouched.
    pub async fn toggle(&self, name: &str, enabled: bool) -> Result<ToggleOutcome, ModuleError> {
        let _guard = self.toggle_lock.lock().await;

        let module = self.registry.check_toggle(name).await?;
        self.pipeline.store().set_disabled(&module, !enabled).await?;
        let outcome = self.registry.toggle(&module, enabled).await?;

        if outcome.restart_required {
            info!(module = %module, enabled, "Module toggled, reload required");
        }
        Ok(outcome)
    }

    /// Boots a fresh runtime from the persisted state.
    pub async fn reload(&self) -> Result<Runtime, ModuleError> {
        info!("Reloading module runtime");
        self.pipeline.boot().await
    }
}
