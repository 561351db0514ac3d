//! # apphost-core
//!
//! Core crate for AppHost. Contains the configuration schemas and the
//! unified error system shared by the module runtime and the CLI.
//!
//! This crate has **no** internal dependencies on other AppHost crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::AppError;
pub use result::AppResult;
