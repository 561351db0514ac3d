//! In-memory manifest store for embedding and tests.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ModuleError;

use super::model::{ModuleManifest, module_key};
use super::store::{ManifestScan, ManifestStore};

/// Manifest store holding manifests and disabled markers in memory.
///
/// Markers survive for the lifetime of the store, so repeated boots over the
/// same store observe earlier toggles.
#[derive(Debug, Default)]
pub struct MemoryManifestStore {
    /// Manifests in registration order.
    manifests: Vec<ModuleManifest>,
    /// Case-folded names carrying a disabled marker.
    disabled: RwLock<HashSet<String>>,
}

impl MemoryManifestStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a manifest.
    pub fn with_manifest(mut self, manifest: ModuleManifest) -> Self {
        self.manifests.push(manifest);
        self
    }

    /// Adds several manifests.
    pub fn with_manifests(mut self, manifests: impl IntoIterator<Item = ModuleManifest>) -> Self {
        self.manifests.extend(manifests);
        self
    }

    /// Pre-sets a disabled marker.
    pub fn with_disabled(mut self, name: &str) -> Self {
        self.disabled.get_mut().insert(module_key(name));
        self
    }

    fn knows(&self, name: &str) -> bool {
        let key = module_key(name);
        self.manifests.iter().any(|m| m.key() == key)
    }
}

#[async_trait]
impl ManifestStore for MemoryManifestStore {
    async fn list_manifests(&self) -> Result<ManifestScan, ModuleError> {
        let mut scan = ManifestScan::new();
        for (index, manifest) in self.manifests.iter().enumerate() {
            let location = format!("memory:{index}");
            match manifest.clone().validated(&location) {
                Ok(manifest) => {
                    scan.accept(&location, manifest);
                }
                Err(e) => scan.reject(&location, e),
            }
        }
        Ok(scan)
    }

    async fn is_disabled(&self, name: &str) -> Result<bool, ModuleError> {
        if !self.knows(name) {
            return Err(ModuleError::UnknownModule(name.to_string()));
        }
        Ok(self.disabled.read().await.contains(&module_key(name)))
    }

    async fn set_disabled(&self, name: &str, disabled: bool) -> Result<(), ModuleError> {
        if !self.knows(name) {
            return Err(ModuleError::UnknownModule(name.to_string()));
        }
        let mut markers = self.disabled.write().await;
        if disabled {
            markers.insert(module_key(name));
        } else {
            markers.remove(&module_key(name));
        }
        Ok(())
    }
}
