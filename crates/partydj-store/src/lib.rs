//! Shared room store for partydj
//!
//! Provides:
//! - The path layout every client agrees on (`rooms/{code}/...`)
//! - A store trait with atomic read-modify-write transactions
//! - A change feed so clients can refresh their view
//! - Audit log (append-only)

mod audit;
mod path;
mod sqlite;
mod traits;

pub use audit::*;
pub use path::*;
pub use sqlite::*;
pub use traits::*;

use std::sync::Arc;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid store path: {0}")]
    InvalidPath(String),

    #[error("Unsupported store backend: {0}")]
    UnsupportedBackend(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Open the store named by a connection's `databaseURL`.
///
/// Understands `sqlite:<path>` (parent directories are created) and
/// `memory:`.
pub fn open_store(database_url: &str) -> StoreResult<Arc<dyn RoomStore>> {
    let url = database_url.trim();
    if url == "memory:" {
        return Ok(Arc::new(SqliteStore::in_memory()?));
    }
    if let Some(path) = url.strip_prefix("sqlite:") {
        let path = std::path::Path::new(path.trim_start_matches("//"));
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        return Ok(Arc::new(SqliteStore::open(path)?));
    }
    Err(StoreError::UnsupportedBackend(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_store_schemes() {
        let store = open_store("memory:").unwrap();
        assert!(store.is_healthy());

        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("nested/rooms.db").display());
        let store = open_store(&url).unwrap();
        assert!(store.is_healthy());

        assert!(matches!(
            open_store("https://party-default-rtdb.example.net"),
            Err(StoreError::UnsupportedBackend(_))
        ));
    }
}
