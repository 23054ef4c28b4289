//! # Store Error Types
//!
//! Error types for durable local store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (this module) ← Adds partition/key context                 │
//! │       │                                                                 │
//! │       ├── enqueue / queue_status → returned to the caller              │
//! │       │                                                                 │
//! │       └── inside a sync pass → logged, item left for the next pass     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Durable local store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store was used before `open()` finished.
    ///
    /// Callers should retry after a short delay rather than give up.
    #[error("Local store is not ready (not opened yet)")]
    NotReady,

    /// `add` on a key that already exists.
    #[error("Duplicate key '{key}' in partition '{partition}'")]
    DuplicateKey { partition: String, key: String },

    /// A unique secondary index rejected the write.
    #[error("Unique index '{index}' violated in partition '{partition}'")]
    UniqueViolation { partition: String, index: String },

    /// Partition not declared in the schema.
    #[error("Unknown partition: {0}")]
    UnknownPartition(String),

    /// Index not declared on the partition.
    #[error("Unknown index '{index}' on partition '{partition}'")]
    UnknownIndex { partition: String, index: String },

    /// The record has no usable value at the partition's key path.
    #[error("Record for partition '{partition}' has no string or integer '{key_path}'")]
    MissingKey { partition: String, key_path: String },

    /// The schema declaration itself is invalid.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// The on-disk schema is newer than the one being opened.
    #[error("Schema version {found} on disk is newer than requested version {requested}")]
    SchemaVersion { found: u32, requested: u32 },

    /// Record could not be converted to or from JSON.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Database file could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Underlying storage failure (disk full, corruption, closed pool).
    #[error("Storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// True for errors that go away by retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::NotReady)
    }
}

/// Convert sqlx errors to StoreError.
///
/// ```text
/// sqlx::Error::PoolClosed      → StoreError::Storage
/// sqlx::Error::PoolTimedOut    → StoreError::Storage
/// sqlx::Error::Configuration   → StoreError::ConnectionFailed
/// Other                        → StoreError::Storage
/// ```
///
/// Constraint violations are mapped with partition context by the record
/// operations, not here.
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => StoreError::Storage("Pool is closed".to_string()),
            sqlx::Error::PoolTimedOut => StoreError::Storage("Timed out acquiring a connection".to_string()),
            sqlx::Error::Configuration(e) => StoreError::ConnectionFailed(e.to_string()),
            other => StoreError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
