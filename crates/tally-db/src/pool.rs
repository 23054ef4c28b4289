//! # Local Store Handle
//!
//! Connection pool creation, readiness and lifecycle for the durable store.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Local Store Lifecycle                              │
//! │                                                                         │
//! │  StoreConfig::new(path) ← Configure pool settings                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LocalStore::new(config, schema) ← Handle exists, NOT ready            │
//! │       │                                                                 │
//! │       │   store.get(..) now → Err(StoreError::NotReady)                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  store.open().await ← Connect + initialize schema (once)               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       │ Clones share the same pool                                     │
//! │       ▼                                                                 │
//! │  Manager ──► store.put(..)     Agent ──► store.get_all(..)             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Concurrent `open()` calls coalesce: the first one initializes, the rest
//! wait for it and observe the same result.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::repository::{MirrorRepository, SyncQueueRepository};
use crate::schema::{self, StoreSchema};

const MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Store configuration.
///
/// ## Example
/// ```rust
/// use tally_db::StoreConfig;
///
/// let config = StoreConfig::new("/var/lib/tally/store.db")
///     .max_connections(4)
///     .min_connections(1);
/// assert_eq!(config.max_connections, 4);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection acquire timeout.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps connections
    /// for the life of the pool.
    /// Default: 10 minutes
    pub idle_timeout: Option<Duration>,
}

impl StoreConfig {
    /// Creates a configuration for the database file at `path`.
    ///
    /// The file is created on `open()` if it does not exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Creates an in-memory configuration (for tests).
    ///
    /// Every connection to `:memory:` is its own database, so the pool is
    /// pinned to a single connection that is never recycled.
    pub fn in_memory() -> Self {
        StoreConfig {
            database_path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }

    fn connect_options(&self) -> StoreResult<SqliteConnectOptions> {
        if self.is_in_memory() {
            return SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| StoreError::ConnectionFailed(e.to_string()));
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.database_path)
            // Readers don't block the writer
            .journal_mode(SqliteJournalMode::Wal)
            // Survives process crash; may lose the last commit on power loss
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        Ok(options)
    }
}

// =============================================================================
// Local Store
// =============================================================================

/// Cloneable handle to the durable local store.
///
/// Every clone shares one pool and one readiness state.
#[derive(Debug, Clone)]
pub struct LocalStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: StoreConfig,
    schema: StoreSchema,
    pool: OnceCell<SqlitePool>,
}

impl LocalStore {
    /// Creates an unopened store. Operations fail with
    /// [`StoreError::NotReady`] until [`open`](Self::open) completes.
    pub fn new(config: StoreConfig, schema: StoreSchema) -> Self {
        LocalStore {
            inner: Arc::new(Inner {
                config,
                schema,
                pool: OnceCell::new(),
            }),
        }
    }

    /// Creates and opens a store in one step.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let store = LocalStore::open_with(StoreConfig::in_memory(), StoreSchema::pos()).await?;
    /// assert!(store.health_check().await);
    /// ```
    pub async fn open_with(config: StoreConfig, schema: StoreSchema) -> StoreResult<Self> {
        let store = LocalStore::new(config, schema);
        store.open().await?;
        Ok(store)
    }

    /// Connects and brings the database up to the configured schema.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Enables WAL mode and NORMAL synchronous (file databases)
    /// 3. Creates the connection pool
    /// 4. Creates missing partitions and indexes, records the version
    ///
    /// Calling it again after success is a no-op. A failed attempt leaves the
    /// store unopened so the caller may retry.
    pub async fn open(&self) -> StoreResult<()> {
        self.inner
            .pool
            .get_or_try_init(|| connect(&self.inner.config, &self.inner.schema))
            .await?;
        Ok(())
    }

    /// True once `open()` has completed.
    pub fn is_ready(&self) -> bool {
        self.inner.pool.initialized()
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.inner.schema
    }

    /// The connection pool, or `NotReady` before `open()` completes.
    pub fn pool(&self) -> StoreResult<&SqlitePool> {
        self.inner.pool.get().ok_or(StoreError::NotReady)
    }

    /// Schema version recorded on disk.
    pub async fn schema_version(&self) -> StoreResult<u32> {
        schema::recorded_version(self.pool()?).await
    }

    /// Returns the sync queue repository.
    pub fn sync_queue(&self) -> SyncQueueRepository {
        SyncQueueRepository::new(self.clone())
    }

    /// Returns the sale/product/category mirror repository.
    pub fn mirrors(&self) -> MirrorRepository {
        MirrorRepository::new(self.clone())
    }

    /// Closes the connection pool.
    ///
    /// Operations after close fail with `StoreError::Storage`.
    pub async fn close(&self) {
        if let Some(pool) = self.inner.pool.get() {
            info!("Closing local store");
            pool.close().await;
        }
    }

    /// Checks if the store is open and can execute queries.
    pub async fn health_check(&self) -> bool {
        match self.inner.pool.get() {
            Some(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            None => false,
        }
    }
}

async fn connect(config: &StoreConfig, schema: &StoreSchema) -> StoreResult<SqlitePool> {
    info!(
        path = %config.database_path.display(),
        version = schema.version,
        "Opening local store"
    );

    let options = config.connect_options()?;

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout);

    if config.is_in_memory() {
        pool_options = pool_options.max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

    debug!(max_connections = config.max_connections, "Store pool created");

    if let Err(e) = schema::initialize(&pool, schema).await {
        pool.close().await;
        return Err(e);
    }

    Ok(pool)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::partitions;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = LocalStore::open_with(StoreConfig::in_memory(), StoreSchema::pos())
            .await
            .unwrap();

        assert!(store.is_ready());
        assert!(store.health_check().await);
        assert_eq!(store.schema_version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_operations_before_open_are_not_ready() {
        let store = LocalStore::new(StoreConfig::in_memory(), StoreSchema::pos());

        assert!(!store.is_ready());
        assert!(!store.health_check().await);

        let err = store
            .put(partitions::CATEGORIES, &json!({"id": "c-1", "name": "Drinks"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotReady));
        assert!(err.is_transient());

        store.open().await.unwrap();
        store
            .put(partitions::CATEGORIES, &json!({"id": "c-1", "name": "Drinks"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_open_coalesces() {
        let store = LocalStore::new(StoreConfig::in_memory(), StoreSchema::pos());

        let other = store.clone();
        let (a, b) = tokio::join!(store.open(), other.open());
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert!(store.is_ready());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        let store = LocalStore::open_with(StoreConfig::new(&path), StoreSchema::pos())
            .await
            .unwrap();
        store
            .put(partitions::CATEGORIES, &json!({"id": "c-1", "name": "Drinks"}))
            .await
            .unwrap();
        store.close().await;

        let reopened = LocalStore::open_with(StoreConfig::new(&path), StoreSchema::pos())
            .await
            .unwrap();
        let found: Option<serde_json::Value> =
            reopened.get(partitions::CATEGORIES, "c-1").await.unwrap();
        assert_eq!(found.unwrap()["name"], "Drinks");
        assert_eq!(reopened.count(partitions::CATEGORIES).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_downgrade_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        let mut newer = StoreSchema::pos();
        newer.version = 2;
        LocalStore::open_with(StoreConfig::new(&path), newer)
            .await
            .unwrap()
            .close()
            .await;

        let err = LocalStore::open_with(StoreConfig::new(&path), StoreSchema::pos())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::SchemaVersion {
                found: 2,
                requested: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let store = LocalStore::open_with(StoreConfig::in_memory(), StoreSchema::pos())
            .await
            .unwrap();
        store.close().await;

        let err = store.count(partitions::SALES).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }

    #[test]
    fn test_config_builder() {
        let config = StoreConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert!(!config.is_in_memory());
        assert!(StoreConfig::in_memory().is_in_memory());
    }
}
