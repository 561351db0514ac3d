//! Compiled-in module catalog.
//!
//! Module code is linked into the host binary; the catalog maps a module's
//! manifest name to its [`Module`] implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::manifest::module_key;
use crate::traits::Module;

/// Registry of compiled-in module implementations, keyed by case-folded name.
#[derive(Debug, Default, Clone)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, Arc<dyn Module>>,
}

impl ModuleCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module. A later entry with the same name replaces the earlier one.
    pub fn with(mut self, module: impl Module + 'static) -> Self {
        self.insert(Arc::new(module));
        self
    }

    /// Adds a shared module instance.
    pub fn insert(&mut self, module: Arc<dyn Module>) {
        self.modules.insert(module_key(module.name()), module);
    }

    /// Looks up a module by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(&module_key(name)).cloned()
    }

    /// Whether a module is present.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(&module_key(name))
    }

    /// Names of all catalogued modules, case-folded and sorted.
    pub fn names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    /// Number of catalogued modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
