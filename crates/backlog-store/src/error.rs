//! Error type for store operations.

use crate::migrations::MigrationError;

/// Errors that can occur during event store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A SQLite operation failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A connection could not be checked out of the pool.
    #[error("store connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema initialization failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),
}
