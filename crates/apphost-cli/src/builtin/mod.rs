//! Modules compiled into the host binary.

mod clock;
mod core_module;

use apphost_module::ModuleCatalog;

/// Catalog of every compiled-in module.
pub fn catalog() -> ModuleCatalog {
    ModuleCatalog::new().with(core_module::CoreModule).with(clock::ClockModule)
}
