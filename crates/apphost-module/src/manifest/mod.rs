//! Manifest discovery — module descriptors and their disabled markers.

pub mod fs;
pub mod memory;
pub mod model;
pub mod store;

pub use fs::FsManifestStore;
pub use memory::MemoryManifestStore;
pub use model::{ModuleKind, ModuleManifest, module_key};
pub use store::{ManifestRejection, ManifestScan, ManifestStore};
