//! # tally-db: Durable Local Store
//!
//! Crash-durable, partitioned record storage for the offline sync engine,
//! on SQLite through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Offline Data Flow                                │
//! │                                                                         │
//! │  SyncQueueManager (enqueue / sync pass)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  LocalStore   │    │  Repositories │    │  StoreSchema │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (schema.rs) │  │   │
//! │  │   │               │    │ SyncQueueRepo │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ MirrorRepo    │    │ partitions   │  │   │
//! │  │   │ readiness     │    │               │    │ + indexes    │  │   │
//! │  │   │ add/put/get.. │    │               │    │ + version    │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  │   p_sales · p_products · p_categories · p_syncQueue             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Store configuration, readiness and lifecycle
//! - [`schema`] - Versioned partition and index declarations
//! - [`records`] - Generic record operations on [`LocalStore`]
//! - [`repository`] - Typed queue and mirror repositories
//! - [`error`] - Store error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{LocalStore, StoreConfig, StoreSchema};
//!
//! let store = LocalStore::open_with(StoreConfig::new("tally.db"), StoreSchema::pos()).await?;
//!
//! let pending = store.sync_queue().unsynced().await?;
//! let product = store.mirrors().product_by_sku("COKE-330").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod pool;
pub mod records;
pub mod repository;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use pool::{LocalStore, StoreConfig};
pub use records::StoreTransaction;
pub use schema::{partitions, IndexDef, PartitionDef, StoreSchema};

pub use repository::{MirrorRepository, SyncQueueRepository};
