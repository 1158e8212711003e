//! Object-store abstraction and table codec.
//!
//! The pipeline only needs three blob operations: list by prefix, get, put.
//! A missing key is reported as [`StoreError::NotFound`] so callers can treat
//! "absent" as an ordinary outcome instead of a failure.

pub mod local;
pub mod memory;
pub mod table;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use table::{read_table, table_from_bytes, table_to_bytes, write_table};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the object-store and table codec layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("storage I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("table codec error on '{key}': {reason}")]
    Table { key: String, reason: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Key/value blob storage.
///
/// Keys are `/`-separated relative paths. `list` returns keys sorted ascending.
pub trait ObjectStore: Send + Sync {
    /// Human-readable location, for logs.
    fn location(&self) -> String;

    /// All keys starting with `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Full object body.
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or overwrite an object.
    fn put(&self, key: &str, body: &[u8]) -> Result<(), StoreError>;
}

/// Where a store lives, as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// A directory on the local filesystem.
    Local { root: PathBuf },
    /// A process-local store that starts empty. Useful for dry runs.
    Memory,
}

impl StoreConfig {
    pub fn open(&self) -> Box<dyn ObjectStore> {
        match self {
            StoreConfig::Local { root } => Box::new(LocalStore::new(root)),
            StoreConfig::Memory => Box::new(MemoryStore::new()),
        }
    }
}
