//! # tally-core: Pure Types for the Offline Sync Engine
//!
//! Everything the sync engine persists or replays, as plain data with zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Offline Sync Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  UI: enqueue(op) · force_sync() · queue_status() · online?      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │  tally-sync: SyncQueueManager · ConnectivityMonitor · RemoteApi │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │  tally-db: LocalStore (sales · products · categories · queue)   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ all layers speak                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │   QueueItem · QueueOperation · mirrors · QueueStatus · rules    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Queue items and typed operation payloads
//! - [`mirror`] - Locally cached sale/product/category records
//! - [`status`] - Aggregate queue counts
//! - [`validation`] - Payload checks run before enqueue
//! - [`error`] - Domain error types
//!
//! ## Example
//!
//! ```rust
//! use tally_core::{QueueItem, QueueOperation, StockAdjustmentPayload, DEFAULT_MAX_RETRIES};
//!
//! let mut item = QueueItem::new(QueueOperation::StockAdjustment(StockAdjustmentPayload {
//!     product_id: "p-1".into(),
//!     delta: -2,
//!     reason: None,
//! }));
//!
//! item.record_failure("connection refused", chrono::Utc::now());
//! assert_eq!(item.attempts, 1);
//! assert!(!item.is_dead_lettered(DEFAULT_MAX_RETRIES));
//! ```

use std::time::Duration;

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod mirror;
pub mod status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::ValidationError;
pub use mirror::{CategoryRecord, ProductRecord, SaleRecord};
pub use status::QueueStatus;
pub use types::*;

// =============================================================================
// Policy Constants
// =============================================================================

/// Failed replays allowed before an item is dead-lettered.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Period of the background sync timer.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Window over which online/offline flapping is collapsed.
pub const DEFAULT_CONNECTIVITY_DEBOUNCE: Duration = Duration::from_millis(300);

/// Maximum lines in a single sale.
pub const MAX_SALE_LINES: usize = 100;

/// Maximum quantity on a single sale line.
pub const MAX_ITEM_QUANTITY: i64 = 999;
