// Sensor Rollup SQLite - Durable state and history
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for the SQLite layer

use rollup::{RollupError, StoreError};
use thiserror::Error;

/// Errors raised by the SQLite stores
#[derive(Error, Debug)]
pub enum SqliteStoreError {
    /// SQLite call failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem failure around the database file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection mutex was poisoned by a panicking reader
    #[error("Connection lock poisoned")]
    LockPoisoned,
}

/// Result type alias for SQLite operations
pub type Result<T> = std::result::Result<T, SqliteStoreError>;

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        match err {
            SqliteStoreError::Io(e) => StoreError::Io(e.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<SqliteStoreError> for RollupError {
    fn from(err: SqliteStoreError) -> Self {
        RollupError::Store(err.into())
    }
}
