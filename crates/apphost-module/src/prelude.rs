//! Prelude for convenient imports.

pub use async_trait::async_trait;

pub use apphost_core::error::AppError;
pub use apphost_core::result::AppResult;

pub use crate::catalog::ModuleCatalog;
pub use crate::error::ModuleError;
pub use crate::hooks::definitions::{AggregationPolicy, HookOutput, HookSpec};
pub use crate::hooks::registry::HookHandler;
pub use crate::manifest::{ModuleKind, ModuleManifest};
pub use crate::surface::{FormModel, GET_MODEL, MODIFY_VIEW, ModelHandle};
pub use crate::traits::{ActivationContext, FnHandler, Module};

pub use crate::module_manifest;
