//! Core types shared by every playvault crate.
//!
//! Platform identity, the normalized per-platform game record, title
//! normalization, and the adapter error taxonomy. Nothing in here performs
//! I/O.

pub mod error;
pub mod platform;
pub mod record;
pub mod title;
pub mod util;

pub use error::FetchError;
pub use platform::{Platform, PlatformParseError};
pub use record::{InstallState, PlatformGameRecord, RecordKey};
pub use title::{normalize_title, slugify, title_similarity, title_tokens};
