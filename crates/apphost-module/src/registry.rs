//! Module registry — known modules, their manifests, and enabled/active state.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ModuleError;
use crate::manifest::{ModuleKind, ModuleManifest, module_key};
use crate::resolver::{DependencyResolver, Resolution};

/// Why a module is not active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InactiveReason {
    /// Permanently excluded for this boot.
    Faulted(ModuleError),
    /// Switched off by an administrator.
    Disabled,
    /// The named dependency is not active.
    DependencyInactive(String),
}

impl fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Faulted(e) => write!(f, "faulted: {e}"),
            Self::Disabled => write!(f, "disabled"),
            Self::DependencyInactive(dep) => write!(f, "dependency '{dep}' inactive"),
        }
    }
}

/// Runtime record for one module.
#[derive(Debug, Clone)]
pub struct ModuleState {
    /// Manifest as discovered.
    pub manifest: Arc<ModuleManifest>,
    /// Administrator flag. Always `true` for system modules.
    pub enabled: bool,
    /// Enabled, not faulted, and every dependency active.
    pub active: bool,
    /// Permanent fault recorded at boot.
    pub fault: Option<ModuleError>,
    /// Set whenever `active` is false.
    pub inactive_reason: Option<InactiveReason>,
}

impl ModuleState {
    fn new(manifest: Arc<ModuleManifest>, enabled: bool, fault: Option<ModuleError>) -> Self {
        Self {
            manifest,
            enabled,
            active: false,
            fault,
            inactive_reason: None,
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Module kind.
    pub fn kind(&self) -> ModuleKind {
        self.manifest.kind
    }

    /// Whether this is a system module.
    pub fn is_system(&self) -> bool {
        self.manifest.is_system()
    }
}

/// Result of flipping a module's enabled flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
    /// Display name of the toggled module.
    pub module: String,
    /// New value of the enabled flag.
    pub enabled: bool,
    /// Modules that became active, in activation order.
    pub activated: Vec<String>,
    /// Modules that became inactive, in activation order.
    pub deactivated: Vec<String>,
    /// Hook registrations only change on the next boot.
    pub restart_required: bool,
}

/// Table swapped wholesale by `load`.
#[derive(Debug, Default)]
struct RegistryTable {
    /// Module key → state.
    states: HashMap<String, ModuleState>,
    /// Keys in resolved activation order.
    order: Vec<String>,
    /// Keys of faulted modules, sorted.
    faulted: Vec<String>,
}

impl RegistryTable {
    /// Recomputes `active` for every module in one pass over the resolved
    /// order. Dependencies precede dependents there, so each module sees the
    /// final state of its dependencies.
    fn recompute(&mut self) {
        for key in &self.faulted {
            if let Some(state) = self.states.get_mut(key) {
                state.active = false;
                state.inactive_reason = state.fault.clone().map(InactiveReason::Faulted);
            }
        }

        for key in &self.order {
            let Some(state) = self.states.get(key) else {
                continue;
            };

            let reason = if let Some(fault) = &state.fault {
                Some(InactiveReason::Faulted(fault.clone()))
            } else if !state.enabled {
                Some(InactiveReason::Disabled)
            } else {
                state
                    .manifest
                    .depends
                    .iter()
                    .find(|dep| {
                        !self
                            .states
                            .get(&module_key(dep))
                            .map(|s| s.active)
                            .unwrap_or(false)
                    })
                    .map(|dep| {
                        let name = self
                            .states
                            .get(&module_key(dep))
                            .map(|s| s.name().to_string())
                            .unwrap_or_else(|| dep.clone());
                        InactiveReason::DependencyInactive(name)
                    })
            };

            if let Some(state) = self.states.get_mut(key) {
                state.active = reason.is_none();
                state.inactive_reason = reason;
            }
        }
    }

    fn active_keys(&self) -> HashSet<String> {
        self.states
            .iter()
            .filter(|(_, s)| s.active)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Transitive dependents of `key`, in activation order then by name.
    fn dependents_of(&self, key: &str) -> Vec<String> {
        let mut reverse: HashMap<String, Vec<String>> = HashMap::new();
        for (k, state) in &self.states {
            for dep in &state.manifest.depends {
                reverse.entry(module_key(dep)).or_default().push(k.clone());
            }
        }

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([key.to_string()]);
        while let Some(current) = queue.pop_front() {
            for dependent in reverse.get(&current).into_iter().flatten() {
                if dependent != key && seen.insert(dependent.clone()) {
                    queue.push_back(dependent.clone());
                }
            }
        }

        self.order
            .iter()
            .chain(self.faulted.iter())
            .filter(|k| seen.contains(*k))
            .cloned()
            .collect()
    }

    fn display(&self, key: &str) -> String {
        self.states
            .get(key)
            .map(|s| s.name().to_string())
            .unwrap_or_else(|| key.to_string())
    }
}

/// Process-wide table of known modules.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    table: RwLock<RegistryTable>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the table from manifests and the set of disabled module keys.
    ///
    /// Returns the dependency resolution the table was built from.
    pub async fn load(&self, manifests: &[ModuleManifest], disabled: &HashSet<String>) -> Resolution {
        let resolution = DependencyResolver::resolve(manifests);

        let mut table = RegistryTable::default();
        for manifest in manifests {
            let key = manifest.key();
            if table.states.contains_key(&key) {
                continue;
            }

            let marked = disabled.contains(&key);
            if marked && manifest.is_system() {
                warn!(module = %manifest.name, "Disabled marker on system module ignored");
            }
            let enabled = manifest.is_system() || !marked;
            let fault = resolution.failure_for(&manifest.name).cloned();

            table.states.insert(
                key,
                ModuleState::new(Arc::new(manifest.clone()), enabled, fault),
            );
        }

        table.order = resolution.order.iter().map(|n| module_key(n)).collect();
        let mut faulted: Vec<String> = resolution.failures.iter().map(|f| module_key(&f.module)).collect();
        faulted.sort();
        faulted.dedup();
        table.faulted = faulted;
        table.recompute();

        info!(
            modules = table.states.len(),
            active = table.active_keys().len(),
            faulted = table.faulted.len(),
            "Module registry loaded"
        );

        *self.table.write().await = table;
        resolution
    }

    /// Case-insensitive lookup.
    pub async fn get(&self, name: &str) -> Option<ModuleState> {
        self.table.read().await.states.get(&module_key(name)).cloned()
    }

    /// Whether a module is currently active.
    pub async fn is_active(&self, name: &str) -> bool {
        self.get(name).await.map(|s| s.active).unwrap_or(false)
    }

    /// Every module: resolved order first, then faulted ones by name.
    pub async fn list(&self) -> Vec<ModuleState> {
        let table = self.table.read().await;
        table
            .order
            .iter()
            .chain(table.faulted.iter())
            .filter_map(|k| table.states.get(k).cloned())
            .collect()
    }

    /// Active modules in activation order.
    pub async fn list_active(&self) -> Vec<ModuleState> {
        let table = self.table.read().await;
        table
            .order
            .iter()
            .filter_map(|k| table.states.get(k))
            .filter(|s| s.active)
            .cloned()
            .collect()
    }

    /// Display names in resolved activation order.
    pub async fn activation_order(&self) -> Vec<String> {
        let table = self.table.read().await;
        table.order.iter().map(|k| table.display(k)).collect()
    }

    /// Checks that a module exists and may be toggled. Returns its display name.
    pub async fn check_toggle(&self, name: &str) -> Result<String, ModuleError> {
        let table = self.table.read().await;
        let state = table
            .states
            .get(&module_key(name))
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()))?;
        if state.is_system() {
            return Err(ModuleError::ImmutableModule(state.name().to_string()));
        }
        Ok(state.name().to_string())
    }

    /// Sets a module's enabled flag and recomputes the active cascade.
    pub async fn toggle(&self, name: &str, enabled: bool) -> Result<ToggleOutcome, ModuleError> {
        let mut table = self.table.write().await;
        let key = module_key(name);

        let state = table
            .states
            .get_mut(&key)
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()))?;
        if state.is_system() {
            return Err(ModuleError::ImmutableModule(state.name().to_string()));
        }

        let changed = state.enabled != enabled;
        state.enabled = enabled;
        let module = state.name().to_string();

        let before = table.active_keys();
        table.recompute();
        let after = table.active_keys();

        let activated: Vec<String> = table
            .order
            .iter()
            .filter(|k| after.contains(*k) && !before.contains(*k))
            .map(|k| table.display(k))
            .collect();
        let deactivated: Vec<String> = table
            .order
            .iter()
            .filter(|k| before.contains(*k) && !after.contains(*k))
            .map(|k| table.display(k))
            .collect();

        info!(
            module = %module,
            enabled,
            activated = activated.len(),
            deactivated = deactivated.len(),
            "Module toggled"
        );

        Ok(ToggleOutcome {
            module,
            enabled,
            activated,
            deactivated,
            restart_required: changed,
        })
    }

    /// Records an activation failure and faults every transitive dependent.
    ///
    /// Returns the display names of dependents newly faulted.
    pub async fn mark_failed(&self, name: &str, reason: &str) -> Result<Vec<String>, ModuleError> {
        let mut table = self.table.write().await;
        let key = module_key(name);

        let state = table
            .states
            .get_mut(&key)
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()))?;
        let module = state.name().to_string();
        state.fault = Some(ModuleError::Activation {
            module: module.clone(),
            reason: reason.to_string(),
        });

        let mut cascaded = Vec::new();
        for dependent in table.dependents_of(&key) {
            if let Some(state) = table.states.get_mut(&dependent) {
                if state.fault.is_none() {
                    state.fault = Some(ModuleError::DependencyFaulted {
                        module: state.name().to_string(),
                        dependency: module.clone(),
                    });
                    cascaded.push(state.name().to_string());
                }
            }
        }

        table.recompute();

        warn!(
            module = %module,
            reason = %reason,
            cascaded = cascaded.len(),
            "Module marked as failed"
        );
        debug!(module = %module, dependents = ?cascaded, "Fault cascaded");

        Ok(cascaded)
    }

    /// Display names of every module depending on `name`, directly or not.
    pub async fn dependents_of(&self, name: &str) -> Result<Vec<String>, ModuleError> {
        let table = self.table.read().await;
        let key = module_key(name);
        if !table.states.contains_key(&key) {
            return Err(ModuleError::UnknownModule(name.to_string()));
        }
        Ok(table
            .dependents_of(&key)
            .iter()
            .map(|k| table.display(k))
            .collect())
    }

    /// Number of known modules.
    pub async fn count(&self) -> usize {
        self.table.read().await.states.len()
    }
}
