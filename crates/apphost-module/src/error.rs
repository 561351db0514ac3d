//! Error taxonomy for the module runtime.

use apphost_core::error::{AppError, ErrorKind};
use thiserror::Error;

/// Errors raised while discovering, resolving, toggling, or wiring modules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// A module descriptor is malformed or duplicates another module's name.
    #[error("Invalid manifest at {location}: {reason}")]
    Manifest {
        /// Where the manifest was read from.
        location: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The listed modules depend on each other in a cycle.
    #[error("Cyclic dependency between modules: {}", members.join(", "))]
    CyclicDependency {
        /// Every member of the cycle, sorted by name.
        members: Vec<String>,
    },

    /// A declared dependency does not correspond to any discovered manifest.
    #[error("Module '{module}' depends on missing module '{dependency}'")]
    MissingDependency {
        /// The declaring module.
        module: String,
        /// The name that could not be found.
        dependency: String,
    },

    /// A system module declared a dependency on an app module.
    #[error("System module '{module}' cannot depend on app module '{dependency}'")]
    InvalidDependencyKind {
        /// The system module.
        module: String,
        /// The app module it depends on.
        dependency: String,
    },

    /// A dependency of this module is itself permanently faulted.
    #[error("Module '{module}' depends on faulted module '{dependency}'")]
    DependencyFaulted {
        /// The affected module.
        module: String,
        /// The faulted dependency.
        dependency: String,
    },

    /// System modules are always enabled.
    #[error("Module '{0}' is a system module and cannot be toggled")]
    ImmutableModule(String),

    /// No module with this name is known.
    #[error("Module '{0}' not found")]
    UnknownModule(String),

    /// No hook with this name has been defined.
    #[error("Hook '{0}' is not defined")]
    UnknownHook(String),

    /// A hook name was defined twice.
    #[error("Hook '{hook}' is already defined by '{defined_by}'")]
    DuplicateHook {
        /// The hook name.
        hook: String,
        /// Owner of the first definition.
        defined_by: String,
    },

    /// Argument or result types do not match the hook definition.
    #[error("Hook '{hook}' is defined as {expected}, but was used as {found}")]
    HookSignatureMismatch {
        /// The hook name.
        hook: String,
        /// Signature recorded at definition time.
        expected: String,
        /// Signature supplied by the caller.
        found: String,
    },

    /// A module's activation callback failed.
    #[error("Module '{module}' failed to activate: {reason}")]
    Activation {
        /// The module.
        module: String,
        /// Failure detail.
        reason: String,
    },

    /// Reading or writing persisted module state failed.
    #[error("Module state store error: {0}")]
    Store(String),
}

impl From<ModuleError> for AppError {
    fn from(err: ModuleError) -> Self {
        let kind = match &err {
            ModuleError::UnknownModule(_) | ModuleError::UnknownHook(_) => ErrorKind::NotFound,
            ModuleError::ImmutableModule(_) | ModuleError::DuplicateHook { .. } => {
                ErrorKind::Conflict
            }
            ModuleError::Manifest { .. } => ErrorKind::Validation,
            ModuleError::Store(_) => ErrorKind::Storage,
            _ => ErrorKind::Module,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}
