//! Host surfaces — the hooks and listings the route layer builds on.
//!
//! Two host-owned hooks let modules extend shared surfaces:
//!
//! - [`MODIFY_VIEW`]: every active module may contribute view fragments.
//! - [`GET_MODEL`]: modules may replace the form model; the last
//!   contributor wins and the base model is kept when nobody contributes.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::ModuleError;
use crate::hooks::definitions::{AggregationPolicy, HookSpec};
use crate::hooks::dispatcher::HookDispatcher;
use crate::manifest::{ModuleKind, module_key};
use crate::registry::{ModuleRegistry, ModuleState};

/// A form model that modules may extend or replace.
pub trait FormModel: Send + Sync + fmt::Debug {
    /// Model name.
    fn name(&self) -> &str;

    /// Field names, in display order.
    fn fields(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Shared handle passed through [`GET_MODEL`].
pub type ModelHandle = Arc<dyn FormModel>;

/// View fragments contributed by modules. Collect-all.
pub const MODIFY_VIEW: HookSpec<(), Vec<String>> =
    HookSpec::new("modify_view", AggregationPolicy::CollectAll);

/// Form model override. Receives the base model, last non-empty wins.
pub const GET_MODEL: HookSpec<ModelHandle, ModelHandle> =
    HookSpec::new("get_model", AggregationPolicy::LastNonEmpty);

/// Defines the host-owned surface hooks.
pub async fn define_surface_hooks(dispatcher: &HookDispatcher) -> Result<(), ModuleError> {
    dispatcher.define(&MODIFY_VIEW).await?;
    dispatcher.define(&GET_MODEL).await?;
    Ok(())
}

/// Fires [`MODIFY_VIEW`] and joins the non-empty fragments with newlines.
pub async fn render_view_fragments(dispatcher: &HookDispatcher) -> Result<String, ModuleError> {
    let result = dispatcher.fire(&MODIFY_VIEW, &()).await?;
    let fragments: Vec<String> = result
        .into_values()
        .into_iter()
        .flatten()
        .filter(|f| !f.trim().is_empty())
        .collect();
    Ok(fragments.join("\n"))
}

/// Fires [`GET_MODEL`] with `base`; returns the last contribution or `base`.
pub async fn resolve_model(
    dispatcher: &HookDispatcher,
    base: ModelHandle,
) -> Result<ModelHandle, ModuleError> {
    let result = dispatcher.fire(&GET_MODEL, &base).await?;
    Ok(result.single_or(base))
}

/// Tile on the applications grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppTile {
    pub name: String,
    pub version: String,
    pub route: Option<String>,
    pub icon_class: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
}

/// Row of the module management listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleEntry {
    pub name: String,
    pub version: String,
    pub kind: ModuleKind,
    pub enabled: bool,
    pub active: bool,
    /// `active`, or why the module is not.
    pub status: String,
    pub depends: Vec<String>,
}

impl From<&ModuleState> for ModuleEntry {
    fn from(state: &ModuleState) -> Self {
        Self {
            name: state.name().to_string(),
            version: state.manifest.version.clone(),
            kind: state.kind(),
            enabled: state.enabled,
            active: state.active,
            status: state
                .inactive_reason
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "active".to_string()),
            depends: state.manifest.depends.clone(),
        }
    }
}

/// Active app modules, sorted by name.
pub async fn apps_grid(registry: &ModuleRegistry) -> Vec<AppTile> {
    let mut tiles: Vec<AppTile> = registry
        .list_active()
        .await
        .iter()
        .filter(|s| s.kind() == ModuleKind::App)
        .map(|s| AppTile {
            name: s.name().to_string(),
            version: s.manifest.version.clone(),
            route: s.manifest.main_route.clone(),
            icon_class: s.manifest.icon_class().map(str::to_string),
            color: s.manifest.color().map(str::to_string),
            description: s.manifest.description().map(str::to_string),
        })
        .collect();
    tiles.sort_by_key(|t| module_key(&t.name));
    tiles
}

/// Every known module with its flags, sorted by name.
pub async fn module_catalog_view(registry: &ModuleRegistry) -> Vec<ModuleEntry> {
    let mut entries: Vec<ModuleEntry> = registry.list().await.iter().map(ModuleEntry::from).collect();
    entries.sort_by_key(|e| module_key(&e.name));
    entries
}

/// Module owning a request path.
///
/// The first path segment is matched against module names, then against
/// each module's `main_route`. Paths nobody claims (including `/`) belong
/// to `core_module`. Only active modules are considered.
pub async fn current_module(
    registry: &ModuleRegistry,
    path: &str,
    core_module: &str,
) -> Option<ModuleState> {
    let segment = path
        .split('/')
        .find(|s| !s.is_empty())
        .map(module_key)
        .unwrap_or_default();

    if !segment.is_empty() {
        let active = registry.list_active().await;

        if let Some(state) = active.iter().find(|s| s.manifest.key() == segment) {
            return Some(state.clone());
        }

        let by_route = active.iter().find(|s| {
            s.manifest
                .main_route
                .as_deref()
                .map(|r| module_key(r.trim_matches('/')) == segment)
                .unwrap_or(false)
        });
        if let Some(state) = by_route {
            return Some(state.clone());
        }
    }

    registry.get(core_module).await.filter(|s| s.active)
}
