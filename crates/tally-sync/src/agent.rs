//! # Sync Agent
//!
//! Decides *when* the queue manager runs a sync pass.
//!
//! ## Triggers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent (one task)                             │
//! │                                                                         │
//! │  ┌────────────────────┐  ┌────────────────────┐  ┌──────────────────┐  │
//! │  │ Connectivity       │  │ Periodic timer     │  │ Shutdown         │  │
//! │  │                    │  │                    │  │                  │  │
//! │  │ offline → online:  │  │ every interval:    │  │ handle.shutdown()│  │
//! │  │ force_sync()       │  │ force_sync() when  │  │ ends the loop    │  │
//! │  │ any change: emit   │  │ online and idle    │  │                  │  │
//! │  └─────────┬──────────┘  └─────────┬──────────┘  └──────────────────┘  │
//! │            └───────────┬───────────┘                                    │
//! │                        ▼                                                │
//! │             SyncQueueManager::force_sync                                │
//! │             (single-flight, errors logged only)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Enqueue-while-online is the third trigger; the manager fires that one
//! itself.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::SyncResult;
use crate::manager::{PassOutcome, SyncEventEmitter, SyncQueueManager};
use tally_db::{LocalStore, StoreSchema};

// =============================================================================
// Sync Agent
// =============================================================================

/// Background trigger loop for a [`SyncQueueManager`].
pub struct SyncAgent {
    manager: SyncQueueManager,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

impl SyncAgent {
    /// Spawns the trigger loop and returns a handle to stop it.
    pub fn spawn(manager: SyncQueueManager, interval: Duration) -> SyncAgentHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let agent = SyncAgent {
            manager,
            interval,
            shutdown_rx,
        };
        tokio::spawn(agent.run());

        SyncAgentHandle { shutdown_tx }
    }

    /// Builds the whole engine from configuration and starts the agent.
    ///
    /// Opens the store, probes the remote once for the initial connectivity
    /// reading, and returns the manager the application enqueues through.
    pub async fn start(
        config: &SyncConfig,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> SyncResult<(SyncQueueManager, SyncAgentHandle)> {
        config.validate()?;

        let store = LocalStore::open_with(config.store_config(), StoreSchema::pos()).await?;
        let remote = Arc::new(config.remote_api()?);
        let probe = Arc::new(config.health_probe()?);
        let connectivity = ConnectivityMonitor::with_probe(probe, config.probe_settings()).await;

        info!(
            api = %remote.base_url(),
            online = connectivity.is_online(),
            interval_secs = config.sync_interval().as_secs(),
            "Starting sync engine"
        );

        let manager = SyncQueueManager::with_emitter(store, remote, connectivity, config.policy(), emitter);
        let handle = Self::spawn(manager.clone(), config.sync_interval());

        Ok((manager, handle))
    }

    async fn run(mut self) {
        let mut online_rx = self.manager.connectivity().subscribe();
        let mut was_online = *online_rx.borrow_and_update();
        let mut watching = true;

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(online = was_online, interval_secs = self.interval.as_secs(), "Sync agent started");

        // A backlog left from a previous session drains as soon as we start online.
        if was_online {
            self.run_pass("startup").await;
        }

        loop {
            tokio::select! {
                changed = online_rx.changed(), if watching => {
                    if changed.is_err() {
                        // Monitor stopped; the timer keeps running.
                        debug!("Connectivity monitor closed");
                        watching = false;
                        continue;
                    }

                    let online = *online_rx.borrow_and_update();
                    if online == was_online {
                        continue;
                    }
                    was_online = online;

                    info!(online, "Connectivity changed");
                    self.manager.notify_online(online);

                    if online {
                        self.run_pass("reconnect").await;
                    }
                }

                _ = ticker.tick() => {
                    if self.manager.online_status() && !self.manager.sync_status() {
                        self.run_pass("interval").await;
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Sync agent received shutdown");
                    break;
                }
            }
        }

        info!("Sync agent stopped");
    }

    async fn run_pass(&self, trigger: &'static str) {
        match self.manager.force_sync().await {
            Ok(PassOutcome::Completed(report)) => {
                debug!(trigger, synced = report.synced, failed = report.failed, "Triggered pass completed");
            }
            Ok(outcome) => debug!(trigger, ?outcome, "Triggered pass not run"),
            Err(e) => error!(trigger, error = %e, "Triggered pass failed"),
        }
    }
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Handle for stopping a running [`SyncAgent`].
#[derive(Clone)]
pub struct SyncAgentHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SyncAgentHandle {
    /// Signals the agent to stop. An in-flight pass finishes first.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    /// True once the agent loop has exited.
    pub fn is_stopped(&self) -> bool {
        self.shutdown_tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::PlatformSignal;
    use crate::manager::{NoOpEmitter, SyncPolicy};
    use crate::remote::{RemoteApi, RemoteError, ServerRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tally_core::{
        PaymentMethod, ProductUpdatePayload, QueueOperation, SaleLine, SalePayload,
        StockAdjustmentPayload,
    };
    use tally_db::StoreConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DEBOUNCE: Duration = Duration::from_millis(20);

    #[derive(Default)]
    struct CountingRemote {
        calls: AtomicUsize,
    }

    impl CountingRemote {
        fn ok(&self, key: &str) -> Result<ServerRecord, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ServerRecord {
                server_id: format!("srv-{}", key),
            })
        }
    }

    #[async_trait]
    impl RemoteApi for CountingRemote {
        async fn create_sale(&self, key: &str, _sale: &SalePayload) -> Result<ServerRecord, RemoteError> {
            self.ok(key)
        }

        async fn update_product(&self, key: &str, _update: &ProductUpdatePayload) -> Result<ServerRecord, RemoteError> {
            self.ok(key)
        }

        async fn adjust_stock(&self, key: &str, _adj: &StockAdjustmentPayload) -> Result<ServerRecord, RemoteError> {
            self.ok(key)
        }
    }

    fn sale() -> QueueOperation {
        QueueOperation::Sale(SalePayload {
            lines: vec![SaleLine {
                product_id: "p-1".into(),
                sku: "COKE-330".into(),
                name: "Coke".into(),
                quantity: 2,
                unit_price_cents: 250,
            }],
            total_cents: 500,
            payment_method: PaymentMethod::Card,
            cashier_id: Some("c-1".into()),
            note: None,
        })
    }

    async fn offline_manager(remote: Arc<CountingRemote>) -> SyncQueueManager {
        let store = LocalStore::open_with(StoreConfig::in_memory(), StoreSchema::pos())
            .await
            .unwrap();
        SyncQueueManager::new(
            store,
            remote,
            ConnectivityMonitor::spawn(false, DEBOUNCE),
            SyncPolicy::default(),
        )
    }

    async fn wait_until_drained(manager: &SyncQueueManager) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if manager.queue_status().await.unwrap().is_drained() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("queue did not drain");
    }

    #[tokio::test]
    async fn test_reconnect_drains_queue() {
        let remote = Arc::new(CountingRemote::default());
        let manager = offline_manager(remote.clone()).await;

        for _ in 0..3 {
            manager.enqueue(sale()).await.unwrap();
        }
        let handle = SyncAgent::spawn(manager.clone(), Duration::from_secs(3600));

        // Offline enqueues stay local
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);

        manager.connectivity().report(PlatformSignal::Online).unwrap();
        wait_until_drained(&manager).await;

        let status = manager.queue_status().await.unwrap();
        assert_eq!((status.total, status.synced), (3, 3));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 3);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_interval_runs_pass_when_online() {
        let remote = Arc::new(CountingRemote::default());
        let manager = offline_manager(remote.clone()).await;
        manager.enqueue(sale()).await.unwrap();

        manager.connectivity().report(PlatformSignal::Online).unwrap();
        manager.connectivity().wait_for(true).await.unwrap();

        // Starting online drains the backlog once
        let handle = SyncAgent::spawn(manager.clone(), Duration::from_millis(50));
        wait_until_drained(&manager).await;
        let after_startup = remote.calls.load(Ordering::SeqCst);

        // Written straight to the store so only the timer can pick it up
        let item = tally_core::QueueItem::new(sale());
        manager.store().sync_queue().insert(&item).await.unwrap();
        wait_until_drained(&manager).await;

        assert_eq!(remote.calls.load(Ordering::SeqCst), after_startup + 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_agent() {
        let manager = offline_manager(Arc::new(CountingRemote::default())).await;
        let handle = SyncAgent::spawn(manager, Duration::from_secs(3600));

        assert!(!handle.is_stopped());
        handle.shutdown().await;

        tokio::time::timeout(Duration::from_secs(1), async {
            while !handle.is_stopped() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("agent did not stop");
    }

    #[tokio::test]
    async fn test_start_from_config() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/sales"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "srv-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = SyncConfig::default();
        config.store.path = dir.path().join("tally.db");
        config.remote.base_url = server.uri();
        config.sync.interval_secs = 1;

        let (manager, handle) = SyncAgent::start(&config, Arc::new(NoOpEmitter)).await.unwrap();
        assert!(manager.online_status());

        let id = manager.enqueue(sale()).await.unwrap();
        wait_until_drained(&manager).await;

        let mirror = manager.store().mirrors().sale(&id).await.unwrap().unwrap();
        assert_eq!(mirror.server_id.as_deref(), Some("srv-1"));

        handle.shutdown().await;
        manager.connectivity().shutdown();
    }
}
