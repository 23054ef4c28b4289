//! # Sync Error Types
//!
//! Errors surfaced to callers of the sync engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Local Store   │  │     Operation           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Store(NotReady)│  │  Validation             │ │
//! │  │  InvalidUrl     │  │  Store(Storage) │  │                         │ │
//! │  │  ConfigLoad/Save│  │  Store(..)      │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │    Internal     │                                                   │
//! │  │                 │                                                   │
//! │  │  ChannelError   │                                                   │
//! │  │  ShuttingDown   │                                                   │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote failures never reach this level. Inside a sync pass they are
//! recorded on the queue item as an attempt and the pass continues.

use thiserror::Error;

use tally_core::ValidationError;
use tally_db::StoreError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Operation Errors
    // =========================================================================
    /// The operation was rejected before anything was persisted.
    #[error("Invalid operation: {0}")]
    Validation(#[from] ValidationError),

    /// The local store failed or is not open yet.
    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The agent or monitor is shutting down.
    #[error("Sync engine is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if retrying the same call later may succeed.
    ///
    /// ## Retryable Errors
    /// - Store not opened yet
    ///
    /// ## Non-Retryable Errors
    /// - Validation and configuration errors
    /// - Storage failures (disk full, corruption)
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_transient())
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
