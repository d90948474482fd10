//! SQLite-backed `KvStore`.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use crate::kv::{KvError, KvStore, Versioned};
use crate::schema;

/// A `KvStore` over a single SQLite connection.
///
/// The connection is guarded by a mutex; compare-and-swap runs inside an
/// IMMEDIATE transaction so two processes sharing the file cannot both win.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, KvError> {
        let conn = schema::open_database(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database with the full schema.
    pub fn open_memory() -> Result<Self, KvError> {
        let conn = schema::open_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, KvError> {
        self.conn.lock().map_err(|_| KvError::Poisoned)
    }
}

fn current_version(conn: &Connection, key: &str) -> Result<u64, KvError> {
    let version: Option<i64> = conn
        .query_row("SELECT version FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(version.map_or(0, |v| v as u64))
}

fn write_version(conn: &Connection, key: &str, version: u64, value: &[u8]) -> Result<(), KvError> {
    conn.execute(
        "INSERT INTO kv (key, version, value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET
             version = excluded.version,
             value = excluded.value,
             updated_at = excluded.updated_at",
        params![key, version as i64, value],
    )?;
    Ok(())
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Versioned>, KvError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT version, value FROM kv WHERE key = ?1",
                params![key],
                |row| {
                    let version: i64 = row.get(0)?;
                    let value: Vec<u8> = row.get(1)?;
                    Ok(Versioned {
                        version: version as u64,
                        value,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<u64, KvError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let version = current_version(&tx, key)? + 1;
        write_version(&tx, key, version, value)?;
        tx.commit()?;
        Ok(version)
    }

    fn compare_and_swap(&self, key: &str, expected: u64, value: &[u8]) -> Result<u64, KvError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let actual = current_version(&tx, key)?;
        if actual != expected {
            // Dropping the transaction rolls it back.
            return Err(KvError::VersionConflict {
                key: key.to_string(),
                expected,
                actual,
            });
        }
        let version = actual + 1;
        write_version(&tx, key, version, value)?;
        tx.commit()?;
        Ok(version)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Versioned)>, KvError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, version, value FROM kv
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key",
        )?;
        let rows = stmt
            .query_map(params![prefix], |row| {
                let key: String = row.get(0)?;
                let version: i64 = row.get(1)?;
                let value: Vec<u8> = row.get(2)?;
                Ok((
                    key,
                    Versioned {
                        version: version as u64,
                        value,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
