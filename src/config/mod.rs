// src/config/mod.rs

//! Settings for the interpreter process.
//!
//! - `model.rs`: the TOML-backed data model and validated [`ExecutorSettings`].
//! - `loader.rs`: reading a config file from disk.
//! - `validate.rs`: the checks that turn a raw file into settings.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use model::{ExecutorSettings, NodeSection, RawConfigFile};
