//! Filesystem manifest store: one directory per module under a root.
//!
//! ```text
//! <root>/<dir>/module.toml    manifest
//! <root>/<dir>/__DISABLED__   present when the module is disabled
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use apphost_core::config::modules::ModulesConfig;

use crate::error::ModuleError;

use super::model::{ModuleManifest, module_key};
use super::store::{ManifestScan, ManifestStore};

/// Manifest store backed by a directory tree.
#[derive(Debug)]
pub struct FsManifestStore {
    /// Directory scanned for module sub-directories.
    root: PathBuf,
    /// Manifest file name inside each module directory.
    manifest_file: String,
    /// Sentinel file name marking a module as disabled.
    disabled_marker: String,
    /// Module key → directory, refreshed on every scan.
    locations: RwLock<HashMap<String, PathBuf>>,
}

impl FsManifestStore {
    /// Creates a store rooted at `root` with the default file names.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_config(&ModulesConfig {
            root: root.into(),
            ..ModulesConfig::default()
        })
    }

    /// Creates a store from the modules configuration section.
    pub fn from_config(config: &ModulesConfig) -> Self {
        Self {
            root: config.root.clone(),
            manifest_file: config.manifest_file.clone(),
            disabled_marker: config.disabled_marker.clone(),
            locations: RwLock::new(HashMap::new()),
        }
    }

    /// The scanned root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves the directory of a module, rescanning once if it is unknown.
    async fn module_dir(&self, name: &str) -> Result<PathBuf, ModuleError> {
        let key = module_key(name);
        if let Some(dir) = self.locations.read().await.get(&key) {
            return Ok(dir.clone());
        }

        self.list_manifests().await?;

        self.locations
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()))
    }

    /// Lists candidate module directories in name order.
    async fn module_dirs(&self) -> Result<Vec<PathBuf>, ModuleError> {
        let mut entries = fs::read_dir(&self.root).await.map_err(|e| {
            ModuleError::Store(format!(
                "Failed to read modules directory '{}': {e}",
                self.root.display()
            ))
        })?;

        let mut dirs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ModuleError::Store(format!("Failed to read directory entry: {e}")))?
        {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with('.') || file_name.starts_with("__") {
                continue;
            }
            // Follows symlinks.
            let is_dir = fs::metadata(entry.path())
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if is_dir {
                dirs.push(entry.path());
            }
        }

        dirs.sort();
        Ok(dirs)
    }
}

#[async_trait]
impl ManifestStore for FsManifestStore {
    async fn list_manifests(&self) -> Result<ManifestScan, ModuleError> {
        let mut scan = ManifestScan::new();

        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            warn!(root = %self.root.display(), "Modules directory does not exist");
            self.locations.write().await.clear();
            return Ok(scan);
        }

        let mut locations = HashMap::new();

        for dir in self.module_dirs().await? {
            let manifest_path = dir.join(&self.manifest_file);
            if !fs::try_exists(&manifest_path).await.unwrap_or(false) {
                debug!(dir = %dir.display(), "No manifest found, skipping");
                continue;
            }

            let location = manifest_path.display().to_string();
            match ModuleManifest::from_file(&manifest_path).await {
                Ok(manifest) => {
                    let key = manifest.key();
                    if scan.accept(&location, manifest) {
                        locations.insert(key, dir);
                    }
                }
                Err(e) => scan.reject(&location, e),
            }
        }

        info!(
            root = %self.root.display(),
            discovered = scan.manifests.len(),
            rejected = scan.rejected.len(),
            "Module manifests scanned"
        );

        *self.locations.write().await = locations;
        Ok(scan)
    }

    async fn is_disabled(&self, name: &str) -> Result<bool, ModuleError> {
        let marker = self.module_dir(name).await?.join(&self.disabled_marker);
        Ok(fs::try_exists(&marker).await.unwrap_or(false))
    }

    async fn set_disabled(&self, name: &str, disabled: bool) -> Result<(), ModuleError> {
        let marker = self.module_dir(name).await?.join(&self.disabled_marker);
        let present = fs::try_exists(&marker).await.unwrap_or(false);

        if disabled && !present {
            fs::write(&marker, b"").await.map_err(|e| {
                ModuleError::Store(format!(
                    "Failed to write marker '{}': {e}",
                    marker.display()
                ))
            })?;
        } else if !disabled && present {
            fs::remove_file(&marker).await.map_err(|e| {
                ModuleError::Store(format!(
                    "Failed to remove marker '{}': {e}",
                    marker.display()
                ))
            })?;
        }

        info!(module = %name, disabled, "Module disabled marker updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_module(root: &Path, dir: &str, manifest: &str) {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("module.toml"), manifest).unwrap();
    }

    #[tokio::test]
    async fn test_scan_skips_and_rejects() {
        let root = tempfile::tempdir().unwrap();
        write_module(
            root.path(),
            "core",
            "name = \"Core\"\nversion = \"1.0\"\nkind = \"System\"\n",
        );
        write_module(
            root.path(),
            "clock",
            "name = \"Clock\"\nversion = \"1.0\"\ndepends = [\"core\"]\n",
        );
        write_module(root.path(), "broken", "name = \"Broken\"\n");
        write_module(root.path(), "zz_clock_copy", "name = \"clock\"\nversion = \"2\"\n");
        write_module(root.path(), "__pycache__", "name = \"x\"\nversion = \"1\"\n");
        std::fs::create_dir_all(root.path().join("empty")).unwrap();
        std::fs::write(root.path().join("README.md"), "not a module").unwrap();

        let store = FsManifestStore::new(root.path());
        let scan = store.list_manifests().await.unwrap();

        let names: Vec<&str> = scan.manifests.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Clock", "Core"]);
        assert_eq!(scan.rejected.len(), 2);
        assert!(scan.rejected.iter().any(|r| r.location.contains("broken")));
        assert!(scan.rejected.iter().any(|r| r.location.contains("zz_clock_copy")));
    }

    #[tokio::test]
    async fn test_disabled_marker_roundtrip() {
        let root = tempfile::tempdir().unwrap();
        write_module(root.path(), "clock", "name = \"Clock\"\nversion = \"1.0\"\n");

        let store = FsManifestStore::new(root.path());
        assert!(!store.is_disabled("clock").await.unwrap());

        store.set_disabled("CLOCK", true).await.unwrap();
        assert!(root.path().join("clock").join("__DISABLED__").exists());
        assert!(store.is_disabled("Clock").await.unwrap());

        // A fresh store sees the persisted marker.
        let reopened = FsManifestStore::new(root.path());
        assert!(reopened.is_disabled("clock").await.unwrap());

        reopened.set_disabled("clock", false).await.unwrap();
        assert!(!root.path().join("clock").join("__DISABLED__").exists());
    }

    #[tokio::test]
    async fn test_unknown_module_marker() {
        let root = tempfile::tempdir().unwrap();
        let store = FsManifestStore::new(root.path());
        let err = store.set_disabled("ghost", true).await.unwrap_err();
        assert_eq!(err, ModuleError::UnknownModule("ghost".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scan_follows_symlinked_module_dirs() {
        let root = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        write_module(root.path(), "core", "name = \"core\"\nversion = \"1.0\"\n");
        write_module(elsewhere.path(), "clock", "name = \"Clock\"\nversion = \"1.0\"\n");
        std::fs::write(elsewhere.path().join("notes.txt"), "not a module").unwrap();

        std::os::unix::fs::symlink(elsewhere.path().join("clock"), root.path().join("clock")).unwrap();
        std::os::unix::fs::symlink(elsewhere.path().join("notes.txt"), root.path().join("notes")).unwrap();

        let store = FsManifestStore::new(root.path());
        let scan = store.list_manifests().await.unwrap();
        let names: Vec<&str> = scan.manifests.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Clock", "core"]);
        assert!(scan.rejected.is_empty());

        store.set_disabled("clock", true).await.unwrap();
        assert!(elsewhere.path().join("clock").join("__DISABLED__").exists());
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let store = FsManifestStore::new(root.path().join("nope"));
        let scan = store.list_manifests().await.unwrap();
        assert!(scan.manifests.is_empty());
        assert!(scan.rejected.is_empty());
    }
}
