//! Manifest store abstraction — where manifests and disabled markers live.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::warn;

use crate::error::ModuleError;

use super::model::ModuleManifest;

/// A manifest that was discovered but excluded from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRejection {
    /// Where the manifest was read from.
    pub location: String,
    /// Why it was excluded.
    pub error: ModuleError,
}

/// Result of one manifest scan.
#[derive(Debug, Clone, Default)]
pub struct ManifestScan {
    /// Well-formed manifests in scan order.
    pub manifests: Vec<ModuleManifest>,
    /// Malformed or duplicate manifests.
    pub rejected: Vec<ManifestRejection>,
}

impl ManifestScan {
    /// Creates an empty scan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a manifest unless its name is already taken.
    ///
    /// Returns `false` (and records a rejection) for duplicates; the first
    /// manifest in scan order keeps the name.
    pub fn accept(&mut self, location: &str, manifest: ModuleManifest) -> bool {
        let key = manifest.key();
        if let Some(existing) = self.manifests.iter().find(|m| m.key() == key) {
            let error = ModuleError::Manifest {
                location: location.to_string(),
                reason: format!(
                    "duplicate module name '{}' (already declared as '{}')",
                    manifest.name, existing.name
                ),
            };
            self.reject(location, error);
            return false;
        }
        self.manifests.push(manifest);
        true
    }

    /// Records a rejected manifest.
    pub fn reject(&mut self, location: &str, error: ModuleError) {
        warn!(location = %location, error = %error, "Module manifest rejected");
        self.rejected.push(ManifestRejection {
            location: location.to_string(),
            error,
        });
    }
}

/// Source of module manifests and their persisted enable/disable markers.
#[async_trait]
pub trait ManifestStore: Send + Sync + std::fmt::Debug {
    /// Lists every discoverable manifest.
    ///
    /// Individual malformed manifests are reported in
    /// [`ManifestScan::rejected`]; only an unreadable module root is an error.
    async fn list_manifests(&self) -> Result<ManifestScan, ModuleError>;

    /// Returns whether the named module carries a disabled marker.
    async fn is_disabled(&self, name: &str) -> Result<bool, ModuleError>;

    /// Persists (or clears) the disabled marker for the named module.
    async fn set_disabled(&self, name: &str, disabled: bool) -> Result<(), ModuleError>;

    /// Returns the case-folded keys of every disabled module among `manifests`.
    async fn disabled_flags(
        &self,
        manifests: &[ModuleManifest],
    ) -> Result<HashSet<String>, ModuleError> {
        let mut disabled = HashSet::new();
        for manifest in manifests {
            if self.is_disabled(&manifest.name).await? {
                disabled.insert(manifest.key());
            }
        }
        Ok(disabled)
    }
}
