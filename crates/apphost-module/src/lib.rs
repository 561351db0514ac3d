//! # apphost-module
//!
//! Module runtime for AppHost. Provides:
//!
//! - Manifest discovery from a directory tree (or memory) with persisted
//!   disabled markers
//! - Dependency resolution with deterministic ordering and per-module faults
//! - Module registry with enable/disable cascade
//! - Typed hook definitions, registration, and policy-based dispatch
//! - Activation pipeline producing an explicit [`Runtime`]

pub mod catalog;
pub mod error;
pub mod hooks;
pub mod macros;
pub mod manifest;
pub mod pipeline;
pub mod prelude;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod surface;
pub mod traits;

pub use catalog::ModuleCatalog;
pub use error::ModuleError;
pub use hooks::{AggregationPolicy, DispatchResult, HookDispatcher, HookRegistry, HookSpec};
pub use manifest::{FsManifestStore, ManifestStore, MemoryManifestStore, ModuleKind, ModuleManifest};
pub use pipeline::{ActivationPipeline, BootReport};
pub use registry::{ModuleRegistry, ModuleState, ToggleOutcome};
pub use resolver::{DependencyResolver, Resolution};
pub use runtime::Runtime;
pub use traits::{ActivationContext, Module};
