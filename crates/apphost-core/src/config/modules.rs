//! Module runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where module manifests live and how the runtime treats them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Directory containing one sub-directory per module.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Manifest file name expected inside each module directory.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// Sentinel file whose presence marks a module as disabled.
    #[serde(default = "default_disabled_marker")]
    pub disabled_marker: String,
    /// Upper bound for a single hook implementation call, in milliseconds.
    #[serde(default = "default_hook_timeout")]
    pub hook_timeout_ms: u64,
    /// Module that owns request paths no other module claims.
    #[serde(default = "default_core_module")]
    pub core_module: String,
}

impl ModulesConfig {
    /// Per-call hook timeout as a `Duration`.
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            manifest_file: default_manifest_file(),
            disabled_marker: default_disabled_marker(),
            hook_timeout_ms: default_hook_timeout(),
            core_module: default_core_module(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./modules")
}

fn default_manifest_file() -> String {
    "module.toml".to_string()
}

fn default_disabled_marker() -> String {
    "__DISABLED__".to_string()
}

fn default_hook_timeout() -> u64 {
    30_000
}

fn default_core_module() -> String {
    "core".to_string()
}
