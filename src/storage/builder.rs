//! Storage builder.
//!
//! Opens the SQLite database behind a [`SqliteStore`], creating the parent
//! directory when needed. Partitions are not created here; they appear on
//! first append. With [`StorageBuilder::with_create_if_missing`] off nothing
//! is created on disk, and a missing database opens as an empty one.

use std::path::{Path, PathBuf};

use crate::storage::db::SqlitePool;
use crate::storage::StorageError;
use crate::storage::partition_store::SqliteStore;

/// Path that selects a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Builder for constructing the storage layer.
#[derive(Debug, Clone)]
pub struct StorageBuilder {
    db_path: PathBuf,
    create_if_missing: bool,
}

impl StorageBuilder {
    /// Create a new storage builder for the database at `db_path`.
    ///
    /// Pass [`IN_MEMORY_PATH`] for a throwaway in-memory database.
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            create_if_missing: true,
        }
    }

    /// Whether a missing database file (and its directory) may be created.
    /// Defaults to `true`; read-only callers such as queries turn it off.
    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Build the storage layer.
    pub async fn build(self) -> Result<SqliteStore, StorageError> {
        let pool = if self.db_path.as_os_str() == IN_MEMORY_PATH {
            SqlitePool::connect("sqlite::memory:").await?
        } else if !self.create_if_missing && !self.db_path.exists() {
            tracing::debug!(path = %self.db_path.display(), "Database missing, reading as empty");
            SqlitePool::connect("sqlite::memory:").await?
        } else if !self.create_if_missing {
            SqlitePool::connect_file(&self.db_path, false).await?
        } else {
            // Create parent directory if it doesn't exist
            if let Some(parent) = self.db_path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Internal(format!(
                        "Failed to create database directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
            SqlitePool::connect_file(&self.db_path, true).await?
        };

        tracing::debug!(path = %self.db_path.display(), "Storage opened");
        Ok(SqliteStore::new(pool))
    }
}
