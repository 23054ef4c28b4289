//! # tally-sync: Offline Sync Engine for Tally POS
//!
//! Lets the till keep selling while offline. Operations are queued durably
//! and replayed against the remote API once connectivity returns.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  UI / checkout ── enqueue(op) ──┐                                       │
//! │                                 ▼                                       │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    SyncQueueManager                              │  │
//! │  │                                                                  │  │
//! │  │  validate → persist item + mirror → (online) spawn pass          │  │
//! │  │  pass: oldest first, one at a time, retry ceiling, dead letters  │  │
//! │  └──────┬──────────────────────┬───────────────────────┬────────────┘  │
//! │         │                      │                       │                │
//! │         ▼                      ▼                       ▼                │
//! │  ┌────────────────┐  ┌──────────────────┐  ┌────────────────────────┐  │
//! │  │  LocalStore    │  │ Connectivity     │  │  RemoteApi             │  │
//! │  │  (tally-db)    │  │ Monitor          │  │                        │  │
//! │  │                │  │                  │  │ POST  /api/sales       │  │
//! │  │ syncQueue      │  │ debounced flag   │  │ PUT   /api/products/id │  │
//! │  │ sales/products │  │ HTTP health probe│  │ PATCH .../quantity     │  │
//! │  └────────────────┘  └────────┬─────────┘  └────────────────────────┘  │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  SyncAgent: pass on reconnect, pass on interval, shutdown        │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  EVENTS (SyncEventEmitter): online changes, pass started/finished       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`manager`] - `SyncQueueManager`: enqueue, sync passes, status
//! - [`agent`] - `SyncAgent`: when passes run
//! - [`connectivity`] - Debounced online/offline state
//! - [`remote`] - `RemoteApi` seam and its HTTP client
//! - [`config`] - TOML + environment configuration
//! - [`telemetry`] - tracing subscriber setup
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_sync::{NoOpEmitter, SyncAgent, SyncConfig};
//!
//! tally_sync::telemetry::init_tracing(None);
//! let config = SyncConfig::load_or_default(None);
//!
//! let (manager, agent) = SyncAgent::start(&config, Arc::new(NoOpEmitter)).await?;
//!
//! let id = manager.enqueue(QueueOperation::Sale(sale)).await?;
//! println!("{:?}", manager.queue_status().await?);
//!
//! agent.shutdown().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod manager;
pub mod remote;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{SyncAgent, SyncAgentHandle};
pub use config::{ConnectivitySettings, RemoteSettings, StoreSettings, SyncConfig, SyncSettings};
pub use connectivity::{
    ConnectivityMonitor, ConnectivityProbe, HttpHealthProbe, PlatformSignal, ProbeSettings,
};
pub use error::{SyncError, SyncResult};
pub use manager::{
    NoOpEmitter, PassOutcome, PassReport, SyncEventEmitter, SyncPolicy, SyncQueueManager,
};
pub use remote::{HttpRemoteApi, RemoteApi, RemoteError, ServerRecord, IDEMPOTENCY_HEADER};
