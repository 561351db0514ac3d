//! Module manifest types and `module.toml` parsing.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ModuleError;

/// Case-folded lookup key for a module name.
pub fn module_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Whether a module is part of the platform or user-toggleable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleKind {
    /// Always active, cannot be disabled.
    System,
    /// Can be enabled and disabled by an administrator.
    #[default]
    App,
}

impl ModuleKind {
    /// Returns the lowercase name used in manifests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::App => "app",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "System"),
            Self::App => write!(f, "App"),
        }
    }
}

impl FromStr for ModuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "app" => Ok(Self::App),
            other => Err(format!("unknown module kind '{other}'")),
        }
    }
}

impl Serialize for ModuleKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ModuleKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Immutable description of one module, read from its `module.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Unique, case-insensitive module name.
    pub name: String,
    /// Informational version string.
    pub version: String,
    /// System or App.
    #[serde(default)]
    pub kind: ModuleKind,
    /// Names of modules that must be active before this one.
    #[serde(default, alias = "dependencies")]
    pub depends: Vec<String>,
    /// URL prefix served by this module, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_route: Option<String>,
    /// Free-form display fields (icon, color, description, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ModuleManifest {
    /// Creates a manifest with no dependencies or metadata.
    pub fn new(name: impl Into<String>, version: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            kind,
            depends: Vec::new(),
            main_route: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a dependency.
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.depends.push(dependency.into());
        self
    }

    /// Sets the main route.
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.main_route = Some(route.into());
        self
    }

    /// Inserts a metadata field.
    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Parses and validates manifest text. `location` is only used in errors.
    pub fn parse(text: &str, location: &str) -> Result<Self, ModuleError> {
        let manifest: ModuleManifest = toml::from_str(text).map_err(|e| ModuleError::Manifest {
            location: location.to_string(),
            reason: e.message().to_string(),
        })?;
        manifest.validated(location)
    }

    /// Reads, parses, and validates a manifest file.
    pub async fn from_file(path: &Path) -> Result<Self, ModuleError> {
        let location = path.display().to_string();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ModuleError::Manifest {
                location: location.clone(),
                reason: format!("failed to read manifest: {e}"),
            })?;
        Self::parse(&text, &location)
    }

    /// Checks required fields and normalizes the dependency list
    /// (trimmed, de-duplicated case-insensitively, declaration order kept).
    pub fn validated(mut self, location: &str) -> Result<Self, ModuleError> {
        let invalid = |reason: String| ModuleError::Manifest {
            location: location.to_string(),
            reason,
        };

        self.name = self.name.trim().to_string();
        self.version = self.version.trim().to_string();

        if self.name.is_empty() {
            return Err(invalid("module name cannot be empty".to_string()));
        }
        if self.name.contains('/') {
            return Err(invalid(format!(
                "module name '{}' cannot contain '/'",
                self.name
            )));
        }
        if self.version.is_empty() {
            return Err(invalid(format!(
                "module '{}' has an empty version",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        let mut depends = Vec::with_capacity(self.depends.len());
        for dep in self.depends.drain(..) {
            let dep = dep.trim().to_string();
            if dep.is_empty() {
                return Err(invalid(format!(
                    "module '{}' declares an empty dependency name",
                    self.name
                )));
            }
            if seen.insert(module_key(&dep)) {
                depends.push(dep);
            }
        }
        self.depends = depends;

        Ok(self)
    }

    /// Case-folded lookup key.
    pub fn key(&self) -> String {
        module_key(&self.name)
    }

    /// Whether this is a system module.
    pub fn is_system(&self) -> bool {
        self.kind == ModuleKind::System
    }

    /// Returns a metadata field.
    pub fn metadata_field(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Font icon class for navigation menus.
    pub fn icon_class(&self) -> Option<&str> {
        self.metadata_field("icon_class")
    }

    /// Accent color for navigation menus.
    pub fn color(&self) -> Option<&str> {
        self.metadata_field("color")
    }

    /// Short description.
    pub fn description(&self) -> Option<&str> {
        self.metadata_field("description")
    }
}
