//! # Repository Module
//!
//! Typed views over the POS partitions of the local store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Typed Access Over JSON Partitions                    │
//! │                                                                         │
//! │  SyncQueueManager                                                      │
//! │       │                                                                 │
//! │       │  store.sync_queue().unsynced()                                 │
//! │       ▼                                                                 │
//! │  SyncQueueRepository                                                   │
//! │  ├── insert / save / get / all                                         │
//! │  ├── unsynced()          ← "synced" index, createdAt order             │
//! │  ├── created_between()   ← "createdAt" range                           │
//! │  └── purge_synced()                                                    │
//! │       │                                                                 │
//! │       │  LocalStore record operations (JSON in, JSON out)              │
//! │       ▼                                                                 │
//! │  SQLite                                                                │
//! │                                                                         │
//! │  MirrorRepository does the same for sales, products and categories.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories need a store opened with [`StoreSchema::pos`](crate::StoreSchema::pos)
//! (or a schema declaring the same partitions and indexes).

pub mod mirror;
pub mod queue;

pub use mirror::MirrorRepository;
pub use queue::SyncQueueRepository;
