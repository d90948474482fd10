//! Unified library data model and YAML alias loading.
//!
//! This crate defines the persistent data model for the unified library
//! without any storage dependencies. Consumers can use these types directly
//! for serialization, display, or passing to `playvault-db` for persistence.

pub mod types;
pub mod yaml;

pub use types::*;
pub use yaml::{YamlError, load_aliases};
