//! In-memory `KvStore` for tests and embedders that need no database file.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::kv::{KvError, KvStore, Versioned};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Versioned>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Versioned>>, KvError> {
        self.entries.lock().map_err(|_| KvError::Poisoned)
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Versioned>, KvError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<u64, KvError> {
        let mut entries = self.lock()?;
        let version = entries.get(key).map_or(0, |v| v.version) + 1;
        entries.insert(
            key.to_string(),
            Versioned {
                version,
                value: value.to_vec(),
            },
        );
        Ok(version)
    }

    fn compare_and_swap(&self, key: &str, expected: u64, value: &[u8]) -> Result<u64, KvError> {
        let mut entries = self.lock()?;
        let actual = entries.get(key).map_or(0, |v| v.version);
        if actual != expected {
            return Err(KvError::VersionConflict {
                key: key.to_string(),
                expected,
                actual,
            });
        }
        let version = actual + 1;
        entries.insert(
            key.to_string(),
            Versioned {
                version,
                value: value.to_vec(),
            },
        );
        Ok(version)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Versioned)>, KvError> {
        let entries = self.lock()?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
