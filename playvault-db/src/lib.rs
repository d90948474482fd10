//! Persistence layer for the unified library.
//!
//! Defines the ordered, versioned key-value contract the library store is
//! written against, plus two implementations: an in-memory map and SQLite
//! (via rusqlite with the bundled feature).

pub mod kv;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use kv::{KvError, KvStore, Versioned};
pub use memory::MemoryStore;
pub use schema::{SchemaError, open_database, open_memory};
pub use sqlite::SqliteStore;
