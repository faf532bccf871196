//! Local record store for mylove
//!
//! Provides:
//! - A lazily opened, versioned database shared by several stores
//! - Typed CRUD over whole JSON records keyed by auto-incrementing integers
//! - Offset/limit and keyset pagination, index lookups
//! - Error normalization (quota exceeded, not found, write failures)
//! - Storage estimates and per-operation performance metrics
//!
//! Writes always report failures. Reads return `StoreResult` too; callers
//! that want the forgiving "empty on error" behaviour use the `*_or_none` /
//! `*_or_empty` variants, which log and swallow the error.

mod codec;
mod database;
mod metrics;
mod quota;
mod record_store;
mod schema;

pub use database::*;
pub use metrics::*;
pub use quota::*;
pub use record_store::*;
pub use schema::*;

pub use mylove_util::RecordId;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to initialize database: {0}")]
    Init(String),

    #[error("Database schema version {found} is newer than supported version {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Storage quota exceeded")]
    QuotaExceeded,

    #[error("Record {id} not found in {store}")]
    NotFound { store: String, id: RecordId },

    #[error("Unknown store: {0}")]
    UnknownStore(String),

    #[error("Unknown index '{index}' on store {store}")]
    UnknownIndex { store: String, index: String },

    #[error("Store {store} does not generate keys; record is missing '{key_path}'")]
    MissingKey { store: String, key_path: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Whether this is the storage-full condition callers should surface
    /// with a dedicated message
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::DiskFull => {
                StoreError::QuotaExceeded
            }
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Task(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_full_maps_to_quota_exceeded() {
        let e = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
            None,
        );
        assert!(StoreError::from(e).is_quota_exceeded());
    }

    #[test]
    fn constraint_failure_keeps_message() {
        let e = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE),
            Some("UNIQUE constraint failed".into()),
        );
        match StoreError::from(e) {
            StoreError::Constraint(msg) => assert_eq!(msg, "UNIQUE constraint failed"),
            other => panic!("expected constraint error, got {:?}", other),
        }
    }

    #[test]
    fn other_failures_are_database_errors() {
        let e = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(StoreError::from(e), StoreError::Database(_)));
    }
}
