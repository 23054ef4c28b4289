//! # Sync Queue Manager
//!
//! Accepts business operations, persists them durably, and replays them
//! against the remote API in sync passes.
//!
//! ## Enqueue
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          enqueue(operation)                             │
//! │                                                                         │
//! │  validate_operation ── invalid? → SyncError::Validation (nothing kept) │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE WRITE TRANSACTION                      │   │
//! │  │  1. READ products   current mirror (adjust/update)              │   │
//! │  │  2. ADD  syncQueue  QueueItem { synced: false, attempts: 0 }    │   │
//! │  │  3. PUT  sales/products  optimistic mirror                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  online? ── yes → spawn sync pass (not awaited)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  return item id                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sync Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. already syncing? → AlreadyRunning     offline? → Offline           │
//! │  2. syncing = true (released on every exit path)                       │
//! │  3. unsynced items, oldest first                                       │
//! │  4. for each item, one at a time:                                      │
//! │       attempts >= max_retries → skip (dead letter)                     │
//! │       replay with Idempotency-Key = item.id                            │
//! │         ok  → item.synced = true, mirror gets server_id  (one tx)      │
//! │         err → item.attempts += 1, last_error              → continue   │
//! │  5. record last pass time, emit status                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is at-least-once: a crash between the server accepting an item
//! and the local write of `synced = true` replays it with the same
//! idempotency key.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::remote::{RemoteApi, RemoteError, ServerRecord};
use tally_core::validation::{validate_id, validate_operation};
use tally_core::{
    ProductRecord, QueueItem, QueueOperation, QueueStatus, SaleRecord, DEFAULT_MAX_RETRIES,
};
use tally_db::{partitions, LocalStore, StoreTransaction};

// =============================================================================
// Policy and Outcomes
// =============================================================================

/// Retry policy for replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Failed replays allowed before an item is dead-lettered.
    pub max_retries: u32,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Per-pass counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    /// Items replayed against the remote.
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
    /// Dead-lettered items left untouched.
    pub skipped: usize,
}

/// What a sync request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(PassReport),
    /// Not started: the monitor reports offline.
    Offline,
    /// Not started: another pass is in flight.
    AlreadyRunning,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Trait for pushing sync events to a UI layer.
pub trait SyncEventEmitter: Send + Sync {
    /// Emits a connectivity change.
    fn emit_online(&self, online: bool);

    /// Emits the start of a sync pass.
    fn emit_pass_started(&self);

    /// Emits the end of a sync pass with the resulting queue counts.
    fn emit_pass_finished(&self, report: &PassReport, status: &QueueStatus);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_online(&self, _online: bool) {}
    fn emit_pass_started(&self) {}
    fn emit_pass_finished(&self, _report: &PassReport, _status: &QueueStatus) {}
}

// =============================================================================
// Manager
// =============================================================================

/// Cloneable handle to the sync queue. All clones share state, including
/// the single-flight flag.
#[derive(Clone)]
pub struct SyncQueueManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: LocalStore,
    remote: Arc<dyn RemoteApi>,
    connectivity: ConnectivityMonitor,
    policy: SyncPolicy,
    emitter: Arc<dyn SyncEventEmitter>,
    syncing: watch::Sender<bool>,
    last_pass_at: watch::Sender<Option<DateTime<Utc>>>,
}

/// Clears the syncing flag however the pass ends.
struct PassGuard<'a>(&'a watch::Sender<bool>);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl SyncQueueManager {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteApi>,
        connectivity: ConnectivityMonitor,
        policy: SyncPolicy,
    ) -> Self {
        Self::with_emitter(store, remote, connectivity, policy, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        store: LocalStore,
        remote: Arc<dyn RemoteApi>,
        connectivity: ConnectivityMonitor,
        policy: SyncPolicy,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let (syncing, _) = watch::channel(false);
        let (last_pass_at, _) = watch::channel(None);

        SyncQueueManager {
            inner: Arc::new(Inner {
                store,
                remote,
                connectivity,
                policy,
                emitter,
                syncing,
                last_pass_at,
            }),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.inner.connectivity
    }

    pub fn policy(&self) -> SyncPolicy {
        self.inner.policy
    }

    // =========================================================================
    // Enqueue
    // =========================================================================

    /// Durably records `operation` and returns its queue item id.
    ///
    /// Succeeds offline. When online, a sync pass is started in the
    /// background and not awaited.
    pub async fn enqueue(&self, operation: QueueOperation) -> SyncResult<String> {
        validate_operation(&operation)?;
        self.persist(QueueItem::new(operation)).await
    }

    /// Like [`enqueue`](Self::enqueue) with a caller-chosen id, which is also
    /// the idempotency key. A reused id fails with `DuplicateKey`.
    pub async fn enqueue_with_id(&self, id: impl Into<String>, operation: QueueOperation) -> SyncResult<String> {
        let id = id.into();
        validate_id("id", &id)?;
        validate_operation(&operation)?;
        self.persist(QueueItem::with_id(id, operation)).await
    }

    async fn persist(&self, item: QueueItem) -> SyncResult<String> {
        // The mirror read and both writes share one write transaction, so
        // concurrent enqueues against the same product apply in turn.
        let mut tx = self.inner.store.begin().await?;
        let mirror = Self::mirror_for(&mut tx, &item).await?;

        tx.add(partitions::SYNC_QUEUE, &item).await?;
        match &mirror {
            Some(Mirror::Sale(sale)) => {
                tx.put(partitions::SALES, sale).await?;
            }
            Some(Mirror::Product(product)) => {
                tx.put(partitions::PRODUCTS, product).await?;
            }
            None => {}
        }
        tx.commit().await?;

        info!(id = %item.id, kind = %item.kind(), entity = %item.entity_id, "Operation queued");

        if self.online_status() {
            self.spawn_pass();
        }

        Ok(item.id)
    }

    /// Optimistic local copy of what the operation will produce server-side.
    async fn mirror_for(tx: &mut StoreTransaction<'_>, item: &QueueItem) -> SyncResult<Option<Mirror>> {
        let mirror = match &item.operation {
            QueueOperation::Sale(payload) => Some(Mirror::Sale(SaleRecord::from_payload(
                &item.id,
                payload,
                item.created_at,
            ))),
            QueueOperation::ProductUpdate(payload) => {
                let existing = tx.get(partitions::PRODUCTS, &payload.product_id).await?;
                let product = ProductRecord::apply_update(existing, payload, item.created_at);
                Some(Mirror::Product(product))
            }
            QueueOperation::StockAdjustment(payload) => {
                match tx.get::<ProductRecord>(partitions::PRODUCTS, &payload.product_id).await? {
                    Some(mut product) => {
                        product.apply_adjustment(payload.delta, item.created_at)?;
                        Some(Mirror::Product(product))
                    }
                    None => {
                        debug!(product_id = %payload.product_id, "No cached product, adjustment queued without mirror");
                        None
                    }
                }
            }
        };

        Ok(mirror)
    }

    fn spawn_pass(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.force_sync().await {
                error!(error = %e, "Background sync pass failed");
            }
        });
    }

    // =========================================================================
    // Sync Pass
    // =========================================================================

    /// Runs a sync pass now.
    ///
    /// Per-item replay failures are recorded on the items, not returned.
    /// An error here means the queue itself could not be read.
    pub async fn force_sync(&self) -> SyncResult<PassOutcome> {
        if !self.online_status() {
            debug!("Offline, sync pass skipped");
            return Ok(PassOutcome::Offline);
        }

        let acquired = self.inner.syncing.send_if_modified(|syncing| {
            if *syncing {
                false
            } else {
                *syncing = true;
                true
            }
        });
        if !acquired {
            debug!("Sync pass already running");
            return Ok(PassOutcome::AlreadyRunning);
        }
        let _guard = PassGuard(&self.inner.syncing);

        self.inner.emitter.emit_pass_started();
        let report = self.run_pass().await?;

        self.inner.last_pass_at.send_replace(Some(Utc::now()));
        match self.queue_status().await {
            Ok(status) => self.inner.emitter.emit_pass_finished(&report, &status),
            Err(e) => warn!(error = %e, "Could not read queue status after pass"),
        }

        info!(
            attempted = report.attempted,
            synced = report.synced,
            failed = report.failed,
            skipped = report.skipped,
            "Sync pass finished"
        );

        Ok(PassOutcome::Completed(report))
    }

    async fn run_pass(&self) -> SyncResult<PassReport> {
        let queue = self.inner.store.sync_queue();
        let max_retries = self.inner.policy.max_retries;
        let items = queue.unsynced().await?;

        debug!(items = items.len(), "Sync pass started");
        let mut report = PassReport::default();

        for mut item in items {
            if item.is_dead_lettered(max_retries) {
                report.skipped += 1;
                continue;
            }

            report.attempted += 1;
            match self.replay(&item).await {
                Ok(record) => {
                    item.mark_synced(&record.server_id, Utc::now());

                    match self.commit_success(&item, &record).await {
                        Ok(()) => {
                            report.synced += 1;
                            debug!(id = %item.id, server_id = %record.server_id, "Item synced");
                        }
                        Err(e) => {
                            // Left unsynced; the next pass replays it with the same key.
                            report.failed += 1;
                            error!(id = %item.id, error = %e, "Failed to record successful replay");
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    item.record_failure(e.to_string(), Utc::now());

                    if item.is_dead_lettered(max_retries) {
                        warn!(id = %item.id, attempts = item.attempts, error = %e, "Item dead-lettered");
                    } else {
                        warn!(id = %item.id, attempts = item.attempts, transient = e.is_transient(), error = %e, "Replay failed");
                    }

                    if let Err(store_err) = queue.save(&item).await {
                        error!(id = %item.id, error = %store_err, "Failed to record replay failure");
                    }
                }
            }
        }

        Ok(report)
    }

    async fn replay(&self, item: &QueueItem) -> Result<ServerRecord, RemoteError> {
        let remote = &self.inner.remote;
        match &item.operation {
            QueueOperation::Sale(payload) => remote.create_sale(&item.id, payload).await,
            QueueOperation::ProductUpdate(payload) => remote.update_product(&item.id, payload).await,
            QueueOperation::StockAdjustment(payload) => remote.adjust_stock(&item.id, payload).await,
        }
    }

    /// Writes `synced = true` and merges the server id into the mirror, in
    /// one transaction.
    ///
    /// A product mirror is only marked synced when no other unsynced item
    /// targets it at commit time. Operations enqueued while the replay was
    /// in flight keep it pending.
    async fn commit_success(&self, item: &QueueItem, record: &ServerRecord) -> SyncResult<()> {
        let mut tx = self.inner.store.begin().await?;
        tx.put(partitions::SYNC_QUEUE, item).await?;

        match &item.operation {
            QueueOperation::Sale(_) => {
                if let Some(mut sale) = tx.get::<SaleRecord>(partitions::SALES, &item.entity_id).await? {
                    sale.reconcile(&record.server_id);
                    tx.put(partitions::SALES, &sale).await?;
                }
            }
            QueueOperation::ProductUpdate(_) | QueueOperation::StockAdjustment(_) => {
                if let Some(mut product) = tx.get::<ProductRecord>(partitions::PRODUCTS, &item.entity_id).await? {
                    let pending: Vec<QueueItem> = tx
                        .get_all_by_index(partitions::SYNC_QUEUE, "entityId", &item.entity_id)
                        .await?;
                    let settled = !pending.iter().any(|other| !other.synced && other.id != item.id);

                    if settled {
                        product.reconcile(&record.server_id);
                    } else {
                        product.server_id = Some(record.server_id.clone());
                    }
                    tx.put(partitions::PRODUCTS, &product).await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Aggregate counts over every queue item.
    pub async fn queue_status(&self) -> SyncResult<QueueStatus> {
        let items = self.inner.store.sync_queue().all().await?;
        Ok(QueueStatus::from_items(&items, self.inner.policy.max_retries))
    }

    pub fn online_status(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    /// True while a sync pass is in flight.
    pub fn sync_status(&self) -> bool {
        *self.inner.syncing.borrow()
    }

    pub fn subscribe_sync_status(&self) -> watch::Receiver<bool> {
        self.inner.syncing.subscribe()
    }

    /// When the last completed pass finished.
    pub fn last_pass_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_pass_at.borrow()
    }

    /// Unsynced items still eligible for replay, oldest first.
    pub async fn pending_items(&self) -> SyncResult<Vec<QueueItem>> {
        let max = self.inner.policy.max_retries;
        let items = self.inner.store.sync_queue().unsynced().await?;
        Ok(items.into_iter().filter(|i| !i.is_dead_lettered(max)).collect())
    }

    /// Unsynced items that exhausted their retries.
    pub async fn dead_lettered_items(&self) -> SyncResult<Vec<QueueItem>> {
        let max = self.inner.policy.max_retries;
        let items = self.inner.store.sync_queue().unsynced().await?;
        Ok(items.into_iter().filter(|i| i.is_dead_lettered(max)).collect())
    }

    /// Deletes acknowledged queue items. Mirrors are kept.
    pub async fn purge_synced(&self) -> SyncResult<u64> {
        Ok(self.inner.store.sync_queue().purge_synced().await?)
    }

    pub(crate) fn notify_online(&self, online: bool) {
        self.inner.emitter.emit_online(online);
    }
}

/// Mirror row written alongside a queued operation.
enum Mirror {
    Sale(SaleRecord),
    Product(ProductRecord),
}
