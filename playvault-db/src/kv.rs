//! The ordered key-value contract the library store persists through.

use std::sync::Arc;

use thiserror::Error;

use crate::schema::SchemaError;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Version conflict on '{key}': expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: u64,
        actual: u64,
    },
    #[error("Store lock poisoned")]
    Poisoned,
}

/// A stored value together with its version.
///
/// Versions start at 1 on first write and increase by one on every write.
/// An absent key behaves as version 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub version: u64,
    pub value: Vec<u8>,
}

/// Abstract ordered key-value store with optimistic concurrency.
pub trait KvStore: Send + Sync {
    /// Read a key.
    fn get(&self, key: &str) -> Result<Option<Versioned>, KvError>;

    /// Write a key unconditionally. Returns the new version.
    fn put(&self, key: &str, value: &[u8]) -> Result<u64, KvError>;

    /// Write a key only if its current version equals `expected`
    /// (0 meaning "must not exist"). Returns the new version, or
    /// [`KvError::VersionConflict`] without writing anything.
    fn compare_and_swap(&self, key: &str, expected: u64, value: &[u8]) -> Result<u64, KvError>;

    /// All keys starting with `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Versioned)>, KvError>;
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Versioned>, KvError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<u64, KvError> {
        (**self).put(key, value)
    }

    fn compare_and_swap(&self, key: &str, expected: u64, value: &[u8]) -> Result<u64, KvError> {
        (**self).compare_and_swap(key, expected, value)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Versioned)>, KvError> {
        (**self).scan_prefix(prefix)
    }
}
