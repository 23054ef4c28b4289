//! # Sync Queue Repository
//!
//! Durable storage for pending offline operations.
//!
//! ## Queue Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Queue Item Lifecycle                                 │
//! │                                                                         │
//! │  enqueue(op)                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  insert(item)  synced = false, attempts = 0                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SYNC PASS                                                      │   │
//! │  │  1. unsynced()  ← oldest first                                  │   │
//! │  │  2. replay against the remote                                   │   │
//! │  │  3. success: save(item) with synced = true                      │   │
//! │  │     failure: save(item) with attempts += 1, last_error          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  purge_synced()  ← optional housekeeping                               │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • An item is never lost before it is acknowledged                     │
//! │  • save() is an idempotent whole-record upsert                         │
//! │  • synced never flips back to false through the manager                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::StoreResult;
use crate::pool::LocalStore;
use crate::schema::partitions::SYNC_QUEUE;
use tally_core::QueueItem;

const SYNCED_INDEX: &str = "synced";
const CREATED_INDEX: &str = "createdAt";

/// Repository for sync queue items.
#[derive(Debug, Clone)]
pub struct SyncQueueRepository {
    store: LocalStore,
}

impl SyncQueueRepository {
    /// Creates a new SyncQueueRepository.
    pub fn new(store: LocalStore) -> Self {
        SyncQueueRepository { store }
    }

    /// Stores a new item. Fails with `DuplicateKey` if the id is taken.
    pub async fn insert(&self, item: &QueueItem) -> StoreResult<()> {
        self.store.add(SYNC_QUEUE, item).await?;
        debug!(id = %item.id, kind = %item.kind(), "Queue item stored");
        Ok(())
    }

    /// Writes back the full item (upsert).
    pub async fn save(&self, item: &QueueItem) -> StoreResult<()> {
        self.store.put(SYNC_QUEUE, item).await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<QueueItem>> {
        self.store.get(SYNC_QUEUE, id).await
    }

    /// All items, oldest first.
    pub async fn all(&self) -> StoreResult<Vec<QueueItem>> {
        let mut items: Vec<QueueItem> = self.store.get_all(SYNC_QUEUE).await?;
        sort_oldest_first(&mut items);
        Ok(items)
    }

    /// Items not yet acknowledged by the remote, oldest first.
    ///
    /// Includes dead-lettered items; the caller decides what to skip.
    pub async fn unsynced(&self) -> StoreResult<Vec<QueueItem>> {
        let mut items: Vec<QueueItem> = self
            .store
            .get_all_by_index(SYNC_QUEUE, SYNCED_INDEX, &false)
            .await?;
        sort_oldest_first(&mut items);
        Ok(items)
    }

    /// Items created within `[from, to]`, oldest first.
    pub async fn created_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<QueueItem>> {
        self.store
            .get_range_by_index(
                SYNC_QUEUE,
                CREATED_INDEX,
                &from.timestamp_millis(),
                &to.timestamp_millis(),
            )
            .await
    }

    /// Deletes every acknowledged item. Returns how many were removed.
    pub async fn purge_synced(&self) -> StoreResult<u64> {
        let removed = self
            .store
            .delete_by_index(SYNC_QUEUE, SYNCED_INDEX, &true)
            .await?;
        debug!(removed, "Purged synced queue items");
        Ok(removed)
    }

    pub async fn count(&self) -> StoreResult<u64> {
        self.store.count(SYNC_QUEUE).await
    }
}

/// Stable sort: items created in the same millisecond keep insertion order.
fn sort_oldest_first(items: &mut [QueueItem]) {
    items.sort_by_key(|item| item.created_at.timestamp_millis());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::pool::StoreConfig;
    use crate::schema::StoreSchema;
    use chrono::Duration;
    use tally_core::{QueueOperation, StockAdjustmentPayload};

    async fn repo() -> SyncQueueRepository {
        LocalStore::open_with(StoreConfig::in_memory(), StoreSchema::pos())
            .await
            .unwrap()
            .sync_queue()
    }

    fn adjustment(product_id: &str) -> QueueItem {
        QueueItem::new(QueueOperation::StockAdjustment(StockAdjustmentPayload {
            product_id: product_id.into(),
            delta: -1,
            reason: None,
        }))
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = repo().await;
        let item = adjustment("p-1");

        repo.insert(&item).await.unwrap();
        let loaded = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(loaded, item);

        let err = repo.insert(&item).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn test_unsynced_is_oldest_first() {
        let repo = repo().await;
        let now = Utc::now();

        let mut late = adjustment("late");
        late.created_at = now;
        let mut early = adjustment("early");
        early.created_at = now - Duration::seconds(30);
        let mut done = adjustment("done");
        done.created_at = now - Duration::seconds(60);
        done.mark_synced("srv-1", now);

        for item in [&late, &early, &done] {
            repo.insert(item).await.unwrap();
        }

        let pending = repo.unsynced().await.unwrap();
        let ids: Vec<_> = pending.iter().map(|i| i.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert_eq!(repo.all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_same_millisecond_keeps_insertion_order() {
        let repo = repo().await;
        let at = Utc::now();

        let mut ids = Vec::new();
        for n in 0..5 {
            let mut item = adjustment(&format!("p-{}", n));
            item.created_at = at;
            repo.insert(&item).await.unwrap();
            ids.push(item.id);
        }

        let pending: Vec<_> = repo.unsynced().await.unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(pending, ids);
    }

    #[tokio::test]
    async fn test_save_updates_in_place() {
        let repo = repo().await;
        let mut item = adjustment("p-1");
        repo.insert(&item).await.unwrap();

        item.record_failure("timeout", Utc::now());
        repo.save(&item).await.unwrap();

        let loaded = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(loaded.attempts, 1);
        assert_eq!(loaded.last_error.as_deref(), Some("timeout"));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_created_between() {
        let repo = repo().await;
        let now = Utc::now();

        for minutes in [0, 10, 20, 30] {
            let mut item = adjustment(&format!("m{}", minutes));
            item.created_at = now - Duration::minutes(minutes);
            repo.insert(&item).await.unwrap();
        }

        let found = repo
            .created_between(now - Duration::minutes(20), now - Duration::minutes(5))
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|i| i.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["m20", "m10"]);
    }

    #[tokio::test]
    async fn test_purge_synced_keeps_pending() {
        let repo = repo().await;

        let pending = adjustment("p-1");
        let mut done = adjustment("p-2");
        done.mark_synced("srv-2", Utc::now());
        repo.insert(&pending).await.unwrap();
        repo.insert(&done).await.unwrap();

        assert_eq!(repo.purge_synced().await.unwrap(), 1);
        assert!(repo.get(&pending.id).await.unwrap().is_some());
        assert!(repo.get(&done.id).await.unwrap().is_none());
    }
}
