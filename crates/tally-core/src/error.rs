//! # Error Types
//!
//! Domain errors for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core (this file)                                                │
//! │  └── ValidationError  - Payload and mirror validation failures         │
//! │                                                                         │
//! │  tally-db                                                              │
//! │  └── StoreError       - Durable local store failures                   │
//! │                                                                         │
//! │  tally-sync                                                            │
//! │  └── SyncError        - What enqueue/force_sync callers see            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Validation Error
// =============================================================================

/// Payload validation errors.
///
/// Raised before anything is persisted, so an invalid operation never
/// occupies a queue slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A derived value disagrees with its parts (e.g. sale total vs lines).
    #[error("{field} is {actual}, expected {expected}")]
    Mismatch {
        field: String,
        expected: i64,
        actual: i64,
    },
}
