//! # Connectivity Monitor
//!
//! A debounced, distinct-until-changed online/offline flag.
//!
//! ## Signal Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Connectivity Pipeline                               │
//! │                                                                         │
//! │  Platform source                  ConnectivityProbe (optional)         │
//! │  report(Online/Offline)           GET /api/health                      │
//! │       │                           every 30s online, backoff offline    │
//! │       │                                   │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │             mpsc<PlatformSignal>                                       │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  DEBOUNCE TASK                                                  │   │
//! │  │  each signal restarts the window (default 300 ms)               │   │
//! │  │  window expires → publish last value IF it differs              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │             watch<bool>  ──► subscribe() / stream() / is_online()     │
//! │                                                                         │
//! │  Online → Offline → Online within 300 ms publishes nothing.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The monitor only observes. Starting sync passes on reconnect is the
//! agent's job.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::remote::endpoint;
use tally_core::DEFAULT_CONNECTIVITY_DEBOUNCE;

// =============================================================================
// Signals and Settings
// =============================================================================

/// A raw reachability observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSignal {
    Online,
    Offline,
}

impl PlatformSignal {
    pub fn from_online(online: bool) -> Self {
        if online {
            PlatformSignal::Online
        } else {
            PlatformSignal::Offline
        }
    }

    pub fn is_online(self) -> bool {
        matches!(self, PlatformSignal::Online)
    }
}

/// Timing of the debounce window and the health probe loop.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub debounce: Duration,

    /// Probe period while online.
    pub interval: Duration,

    /// First re-probe delay after a failed probe.
    pub initial_backoff: Duration,

    /// Longest re-probe delay while offline.
    pub max_backoff: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            debounce: DEFAULT_CONNECTIVITY_DEBOUNCE,
            interval: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl ProbeSettings {
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Probe
// =============================================================================

/// Answers "can we reach the server right now?".
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

/// Probes `GET <base><health_path>`; any 2xx means online.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: Client,
    url: Url,
}

impl HttpHealthProbe {
    pub fn new(base_url: &str, health_path: &str, timeout: Duration) -> SyncResult<Self> {
        let base = Url::parse(base_url)?;
        let segments: Vec<&str> = health_path
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let url = endpoint(&base, &segments).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpHealthProbe { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpHealthProbe {
    async fn probe(&self) -> bool {
        match self.client.get(self.url.clone()).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(status = response.status().as_u16(), "Health check failed");
                false
            }
            Err(e) => {
                debug!(error = %e, "Health check unreachable");
                false
            }
        }
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Cloneable handle to the debounced connectivity flag.
///
/// Background tasks stop when the last handle is dropped or
/// [`shutdown`](Self::shutdown) is called.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    signals: mpsc::UnboundedSender<PlatformSignal>,
    state: watch::Receiver<bool>,
    shutdown: watch::Sender<bool>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl ConnectivityMonitor {
    /// Starts the debounce task with the platform's current reading.
    pub fn spawn(initially_online: bool, debounce: Duration) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(initially_online);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(online = initially_online, debounce_ms = debounce.as_millis() as u64, "Connectivity monitor started");
        tokio::spawn(debounce_loop(signal_rx, state_tx, shutdown_rx, debounce));

        ConnectivityMonitor {
            inner: Arc::new(Inner {
                signals: signal_tx,
                state: state_rx,
                shutdown: shutdown_tx,
            }),
        }
    }

    /// Probes once for the initial reading, then keeps probing in the
    /// background: every `interval` while online, with exponential backoff
    /// while offline.
    pub async fn with_probe(probe: Arc<dyn ConnectivityProbe>, settings: ProbeSettings) -> Self {
        let initially_online = probe.probe().await;
        let monitor = Self::spawn(initially_online, settings.debounce);

        let signals = monitor.inner.signals.clone();
        let shutdown = monitor.inner.shutdown.subscribe();
        tokio::spawn(probe_loop(probe, settings, initially_online, signals, shutdown));

        monitor
    }

    /// Feeds a raw platform observation into the debounce window.
    pub fn report(&self, signal: PlatformSignal) -> SyncResult<()> {
        self.inner
            .signals
            .send(signal)
            .map_err(|_| SyncError::ChannelError("connectivity monitor stopped".into()))
    }

    /// The current debounced value.
    pub fn is_online(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// A receiver whose current value is immediately readable.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.state.clone()
    }

    /// Yields the current value, then every change.
    pub fn stream(&self) -> WatchStream<bool> {
        WatchStream::new(self.subscribe())
    }

    /// Resolves once the published value equals `online`.
    pub async fn wait_for(&self, online: bool) -> SyncResult<()> {
        let mut rx = self.subscribe();
        rx.wait_for(|value| *value == online)
            .await
            .map(|_| ())
            .map_err(|_| SyncError::ShuttingDown)
    }

    /// Stops the background tasks. The last published value stays readable.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
    }
}

async fn debounce_loop(
    mut signals: mpsc::UnboundedReceiver<PlatformSignal>,
    state: watch::Sender<bool>,
    mut shutdown: watch::Receiver<bool>,
    debounce: Duration,
) {
    let mut pending: Option<bool> = None;
    let mut deadline = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            signal = signals.recv() => match signal {
                Some(signal) => {
                    pending = Some(signal.is_online());
                    deadline = Instant::now() + debounce;
                }
                None => break,
            },

            _ = tokio::time::sleep_until(deadline), if pending.is_some() => {
                if let Some(online) = pending.take() {
                    let changed = state.send_if_modified(|current| {
                        if *current == online {
                            false
                        } else {
                            *current = online;
                            true
                        }
                    });
                    if changed {
                        info!(online, "Connectivity changed");
                    }
                }
            }
        }
    }

    debug!("Connectivity debounce task stopped");
}

async fn probe_loop(
    probe: Arc<dyn ConnectivityProbe>,
    settings: ProbeSettings,
    mut last: bool,
    signals: mpsc::UnboundedSender<PlatformSignal>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = settings.create_backoff();

    loop {
        let wait = if last {
            backoff.reset();
            settings.interval
        } else {
            backoff.next_backoff().unwrap_or(settings.max_backoff)
        };

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let online = probe.probe().await;
        if online != last {
            if online {
                info!("Health probe succeeded");
            } else {
                warn!("Health probe failed");
            }
        }
        last = online;

        if signals.send(PlatformSignal::from_online(online)).is_err() {
            break;
        }
    }

    debug!("Connectivity probe task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio_stream::StreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WINDOW: Duration = Duration::from_millis(300);

    async fn settle() {
        tokio::time::sleep(WINDOW * 2).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_value_is_readable() {
        let monitor = ConnectivityMonitor::spawn(true, WINDOW);
        assert!(monitor.is_online());
        assert!(*monitor.subscribe().borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_is_published_after_window() {
        let monitor = ConnectivityMonitor::spawn(true, WINDOW);

        monitor.report(PlatformSignal::Offline).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(monitor.is_online());

        settle().await;
        assert!(!monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flapping_within_window_is_suppressed() {
        let monitor = ConnectivityMonitor::spawn(true, WINDOW);
        let mut rx = monitor.subscribe();

        monitor.report(PlatformSignal::Offline).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.report(PlatformSignal::Online).unwrap();
        settle().await;

        assert!(monitor.is_online());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_value_is_not_republished() {
        let monitor = ConnectivityMonitor::spawn(false, WINDOW);
        let mut rx = monitor.subscribe();

        for _ in 0..3 {
            monitor.report(PlatformSignal::Offline).unwrap();
            settle().await;
        }
        assert!(!rx.has_changed().unwrap());

        monitor.report(PlatformSignal::Online).unwrap();
        settle().await;
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_yields_current_then_changes() {
        let monitor = ConnectivityMonitor::spawn(false, WINDOW);
        let mut stream = monitor.stream();

        assert_eq!(stream.next().await, Some(false));

        monitor.report(PlatformSignal::Online).unwrap();
        assert_eq!(stream.next().await, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for() {
        let monitor = ConnectivityMonitor::spawn(false, WINDOW);

        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for(true).await })
        };

        monitor.report(PlatformSignal::Online).unwrap();
        waiter.await.unwrap().unwrap();
        assert!(monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_after_shutdown_fails() {
        let monitor = ConnectivityMonitor::spawn(true, WINDOW);
        monitor.shutdown();
        settle().await;

        assert!(monitor.report(PlatformSignal::Offline).is_err());
        assert!(monitor.is_online());
    }

    struct ScriptedProbe {
        online: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConnectivityProbe for ScriptedProbe {
        async fn probe(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.online.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_recovers_with_backoff() {
        let probe = Arc::new(ScriptedProbe {
            online: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        });
        let settings = ProbeSettings {
            debounce: WINDOW,
            interval: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(4),
        };

        let monitor = ConnectivityMonitor::with_probe(probe.clone(), settings).await;
        assert!(!monitor.is_online());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        probe.online.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(monitor.is_online());
        assert!(probe.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_detects_outage() {
        let probe = Arc::new(ScriptedProbe {
            online: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        });
        let settings = ProbeSettings {
            debounce: WINDOW,
            interval: Duration::from_secs(5),
            ..ProbeSettings::default()
        };

        let monitor = ConnectivityMonitor::with_probe(probe.clone(), settings).await;
        assert!(monitor.is_online());

        probe.online.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_http_health_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let probe = HttpHealthProbe::new(&server.uri(), "/api/health", Duration::from_secs(2)).unwrap();
        assert!(probe.probe().await);

        let missing = HttpHealthProbe::new(&server.uri(), "/api/other", Duration::from_secs(2)).unwrap();
        assert!(!missing.probe().await);
    }
}
