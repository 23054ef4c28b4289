//! # Record Operations
//!
//! Generic keyed access to the partitions of a [`LocalStore`].
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Partition Operations                                │
//! │                                                                         │
//! │  add(p, rec)            INSERT            existing key → DuplicateKey  │
//! │  put(p, rec)            INSERT .. ON CONFLICT(key) DO UPDATE           │
//! │                         (keeps seq, so insertion order is stable)      │
//! │  begin() → tx           reads + adds/puts under the write lock         │
//! │  get(p, key)            → Option<R>                                    │
//! │  get_all(p)             → Vec<R> ORDER BY seq                          │
//! │  get_all_by_index       WHERE json_extract(body,'$.f') = value         │
//! │  get_range_by_index     WHERE .. BETWEEN lower AND upper               │
//! │  delete / delete_by_index / clear / count                              │
//! │                                                                         │
//! │  Every write goes through one SQLite statement or transaction, so a    │
//! │  record is either fully stored or not stored at all.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records are any `Serialize` value whose JSON form is an object carrying a
//! string or integer at the partition's key path.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::pool::LocalStore;
use crate::schema::{claim_write_lock_sql, field_expr, PartitionDef};

impl LocalStore {
    /// Inserts a new record. Fails with `DuplicateKey` if the key exists.
    pub async fn add<R: Serialize + ?Sized>(&self, partition: &str, record: &R) -> StoreResult<String> {
        let pool = self.pool()?;
        let def = self.schema().find(partition)?;
        let (key, body) = encode(def, record)?;

        sqlx::query(&insert_sql(def))
            .bind(&key)
            .bind(&body)
            .execute(pool)
            .await
            .map_err(|e| map_write_error(def, &key, e))?;

        trace!(partition, key = %key, "Record added");
        Ok(key)
    }

    /// Inserts or fully replaces the record with the same key.
    pub async fn put<R: Serialize + ?Sized>(&self, partition: &str, record: &R) -> StoreResult<String> {
        let pool = self.pool()?;
        let def = self.schema().find(partition)?;
        let (key, body) = encode(def, record)?;

        sqlx::query(&upsert_sql(def))
            .bind(&key)
            .bind(&body)
            .execute(pool)
            .await
            .map_err(|e| map_write_error(def, &key, e))?;

        trace!(partition, key = %key, "Record put");
        Ok(key)
    }

    /// Reads one record by key.
    pub async fn get<R: DeserializeOwned>(&self, partition: &str, key: &str) -> StoreResult<Option<R>> {
        let pool = self.pool()?;
        let def = self.schema().find(partition)?;

        let body: Option<String> = sqlx::query_scalar(&select_by_key_sql(def))
            .bind(key)
            .fetch_optional(pool)
            .await?;

        body.map(|b| decode(&b)).transpose()
    }

    /// Reads every record in insertion order.
    pub async fn get_all<R: DeserializeOwned>(&self, partition: &str) -> StoreResult<Vec<R>> {
        let pool = self.pool()?;
        let def = self.schema().find(partition)?;

        let bodies: Vec<String> =
            sqlx::query_scalar(&format!("SELECT body FROM {} ORDER BY seq", def.table()))
                .fetch_all(pool)
                .await?;

        bodies.iter().map(|b| decode(b)).collect()
    }

    /// Reads every record whose indexed field equals `value`, in insertion order.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let pending: Vec<QueueItem> = store
    ///     .get_all_by_index(partitions::SYNC_QUEUE, "synced", &false)
    ///     .await?;
    /// ```
    pub async fn get_all_by_index<R, V>(&self, partition: &str, index: &str, value: &V) -> StoreResult<Vec<R>>
    where
        R: DeserializeOwned,
        V: Serialize + ?Sized,
    {
        let pool = self.pool()?;
        let def = self.schema().find(partition)?;
        let index = def.find_index(index)?;

        let bodies: Vec<String> = sqlx::query_scalar(&select_by_index_sql(def, &index.field))
            .bind(serde_json::to_string(value)?)
            .fetch_all(pool)
            .await?;

        bodies.iter().map(|b| decode(b)).collect()
    }

    /// Reads records whose indexed field lies in `[lower, upper]`, ordered by
    /// that field and then by insertion.
    pub async fn get_range_by_index<R, V>(
        &self,
        partition: &str,
        index: &str,
        lower: &V,
        upper: &V,
    ) -> StoreResult<Vec<R>>
    where
        R: DeserializeOwned,
        V: Serialize + ?Sized,
    {
        let pool = self.pool()?;
        let def = self.schema().find(partition)?;
        let index = def.find_index(index)?;
        let expr = field_expr(&index.field);

        let sql = format!(
            "SELECT body FROM {table}
             WHERE {expr} BETWEEN json_extract(?1, '$') AND json_extract(?2, '$')
             ORDER BY {expr}, seq",
            table = def.table(),
            expr = expr
        );

        let bodies: Vec<String> = sqlx::query_scalar(&sql)
            .bind(serde_json::to_string(lower)?)
            .bind(serde_json::to_string(upper)?)
            .fetch_all(pool)
            .await?;

        bodies.iter().map(|b| decode(b)).collect()
    }

    /// Deletes one record. Returns whether it existed.
    pub async fn delete(&self, partition: &str, key: &str) -> StoreResult<bool> {
        let pool = self.pool()?;
        let def = self.schema().find(partition)?;

        let result = sqlx::query(&format!("DELETE FROM {} WHERE key = ?1", def.table()))
            .bind(key)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every record whose indexed field equals `value`. Returns how
    /// many were removed.
    pub async fn delete_by_index<V: Serialize + ?Sized>(
        &self,
        partition: &str,
        index: &str,
        value: &V,
    ) -> StoreResult<u64> {
        let pool = self.pool()?;
        let def = self.schema().find(partition)?;
        let index = def.find_index(index)?;

        let sql = format!(
            "DELETE FROM {} WHERE {} = json_extract(?1, '$')",
            def.table(),
            field_expr(&index.field)
        );

        let result = sqlx::query(&sql)
            .bind(serde_json::to_string(value)?)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Deletes every record in the partition. Returns how many were removed.
    pub async fn clear(&self, partition: &str) -> StoreResult<u64> {
        let pool = self.pool()?;
        let def = self.schema().find(partition)?;

        let result = sqlx::query(&format!("DELETE FROM {}", def.table()))
            .execute(pool)
            .await?;

        debug!(partition, removed = result.rows_affected(), "Partition cleared");
        Ok(result.rows_affected())
    }

    pub async fn count(&self, partition: &str) -> StoreResult<u64> {
        let pool = self.pool()?;
        let def = self.schema().find(partition)?;

        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", def.table()))
            .fetch_one(pool)
            .await?;

        Ok(count.max(0) as u64)
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// A read-modify-write unit of work spanning any number of partitions.
///
/// Holds the database write lock from [`LocalStore::begin`] until
/// [`commit`](Self::commit), so two transactions that read and then write
/// the same record run one after the other. Dropping it without committing
/// rolls everything back.
///
/// ## Example
/// ```rust,ignore
/// let mut tx = store.begin().await?;
/// let mut product: ProductRecord = tx.get(partitions::PRODUCTS, "p-1").await?.unwrap();
/// product.quantity -= 1;
/// tx.add(partitions::SYNC_QUEUE, &item).await?;
/// tx.put(partitions::PRODUCTS, &product).await?;
/// tx.commit().await?;
/// ```
pub struct StoreTransaction<'s> {
    store: &'s LocalStore,
    tx: Transaction<'static, Sqlite>,
    writes: usize,
}

impl LocalStore {
    /// Starts a [`StoreTransaction`].
    ///
    /// Waits (up to the connection's busy timeout) while another writer
    /// holds the lock.
    pub async fn begin(&self) -> StoreResult<StoreTransaction<'_>> {
        let mut tx = self.pool()?.begin().await?;
        sqlx::query(&claim_write_lock_sql()).execute(&mut *tx).await?;

        Ok(StoreTransaction {
            store: self,
            tx,
            writes: 0,
        })
    }
}

impl StoreTransaction<'_> {
    pub async fn get<R: DeserializeOwned>(&mut self, partition: &str, key: &str) -> StoreResult<Option<R>> {
        let store = self.store;
        let def = store.schema().find(partition)?;

        let body: Option<String> = sqlx::query_scalar(&select_by_key_sql(def))
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await?;

        body.map(|b| decode(&b)).transpose()
    }

    /// Equality lookup, in insertion order. Sees this transaction's own writes.
    pub async fn get_all_by_index<R, V>(&mut self, partition: &str, index: &str, value: &V) -> StoreResult<Vec<R>>
    where
        R: DeserializeOwned,
        V: Serialize + ?Sized,
    {
        let store = self.store;
        let def = store.schema().find(partition)?;
        let index = def.find_index(index)?;

        let bodies: Vec<String> = sqlx::query_scalar(&select_by_index_sql(def, &index.field))
            .bind(serde_json::to_string(value)?)
            .fetch_all(&mut *self.tx)
            .await?;

        bodies.iter().map(|b| decode(b)).collect()
    }

    /// Inserts a new record. An existing key fails with `DuplicateKey`.
    pub async fn add<R: Serialize + ?Sized>(&mut self, partition: &str, record: &R) -> StoreResult<String> {
        self.write(partition, record, insert_sql).await
    }

    /// Inserts or fully replaces the record with the same key.
    pub async fn put<R: Serialize + ?Sized>(&mut self, partition: &str, record: &R) -> StoreResult<String> {
        self.write(partition, record, upsert_sql).await
    }

    async fn write<R: Serialize + ?Sized>(
        &mut self,
        partition: &str,
        record: &R,
        sql: fn(&PartitionDef) -> String,
    ) -> StoreResult<String> {
        let store = self.store;
        let def = store.schema().find(partition)?;
        let (key, body) = encode(def, record)?;

        sqlx::query(&sql(def))
            .bind(&key)
            .bind(&body)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_write_error(def, &key, e))?;

        self.writes += 1;
        Ok(key)
    }

    /// Makes every write visible at once.
    pub async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        debug!(records = self.writes, "Transaction committed");
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn select_by_key_sql(def: &PartitionDef) -> String {
    format!("SELECT body FROM {} WHERE key = ?1", def.table())
}

fn select_by_index_sql(def: &PartitionDef, field: &str) -> String {
    format!(
        "SELECT body FROM {} WHERE {} = json_extract(?1, '$') ORDER BY seq",
        def.table(),
        field_expr(field)
    )
}

fn insert_sql(def: &PartitionDef) -> String {
    format!("INSERT INTO {} (key, body) VALUES (?1, ?2)", def.table())
}

fn upsert_sql(def: &PartitionDef) -> String {
    format!(
        "INSERT INTO {} (key, body) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET body = excluded.body",
        def.table()
    )
}

/// Serializes a record and extracts its key.
fn encode<R: Serialize + ?Sized>(def: &PartitionDef, record: &R) -> StoreResult<(String, String)> {
    let value = serde_json::to_value(record)?;

    let key = match value.get(&def.key_path) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
        _ => {
            return Err(StoreError::MissingKey {
                partition: def.name.clone(),
                key_path: def.key_path.clone(),
            })
        }
    };

    Ok((key, serde_json::to_string(&value)?))
}

fn decode<R: DeserializeOwned>(body: &str) -> StoreResult<R> {
    Ok(serde_json::from_str(body)?)
}

/// Maps constraint failures to partition-aware errors.
///
/// SQLite reports the primary key as `UNIQUE constraint failed: p_x.key` and
/// an expression index as `UNIQUE constraint failed: index 'idx_x_y'`.
fn map_write_error(def: &PartitionDef, key: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let message = db.message();
            if let Some(index) = def
                .indexes
                .iter()
                .find(|i| message.contains(&format!("'{}'", def.index_name(i))))
            {
                return StoreError::UniqueViolation {
                    partition: def.name.clone(),
                    index: index.name.clone(),
                };
            }
            return StoreError::DuplicateKey {
                partition: def.name.clone(),
                key: key.to_string(),
            };
        }
    }
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::StoreConfig;
    use crate::schema::{partitions, IndexDef, StoreSchema};
    use serde_json::json;

    async fn store() -> LocalStore {
        LocalStore::open_with(StoreConfig::in_memory(), StoreSchema::pos())
            .await
            .unwrap()
    }

    fn product(id: &str, sku: &str, category: &str) -> Value {
        json!({ "id": id, "sku": sku, "name": id, "category": category, "synced": false })
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_key() {
        let store = store().await;
        let record = json!({"id": "c-1", "name": "Drinks"});

        assert_eq!(store.add(partitions::CATEGORIES, &record).await.unwrap(), "c-1");
        let err = store.add(partitions::CATEGORIES, &record).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { ref key, .. } if key == "c-1"));
    }

    #[tokio::test]
    async fn test_put_is_idempotent_and_keeps_position() {
        let store = store().await;

        store.put(partitions::CATEGORIES, &json!({"id": "a", "name": "A"})).await.unwrap();
        store.put(partitions::CATEGORIES, &json!({"id": "b", "name": "B"})).await.unwrap();
        store.put(partitions::CATEGORIES, &json!({"id": "a", "name": "A2"})).await.unwrap();
        store.put(partitions::CATEGORIES, &json!({"id": "a", "name": "A2"})).await.unwrap();

        let all: Vec<Value> = store.get_all(partitions::CATEGORIES).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["id"], "a");
        assert_eq!(all[0]["name"], "A2");
        assert_eq!(all[1]["id"], "b");
    }

    #[tokio::test]
    async fn test_put_replaces_whole_record() {
        let store = store().await;

        store
            .put(partitions::CATEGORIES, &json!({"id": "a", "name": "A", "color": "red"}))
            .await
            .unwrap();
        store.put(partitions::CATEGORIES, &json!({"id": "a", "name": "A"})).await.unwrap();

        let found: Value = store.get(partitions::CATEGORIES, "a").await.unwrap().unwrap();
        assert!(found.get("color").is_none());
    }

    #[tokio::test]
    async fn test_missing_key_is_rejected() {
        let store = store().await;

        let err = store
            .put(partitions::CATEGORIES, &json!({"name": "nameless"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingKey { .. }));

        let err = store
            .put(partitions::CATEGORIES, &json!({"id": true, "name": "bool key"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingKey { .. }));
    }

    #[tokio::test]
    async fn test_integer_keys() {
        let schema = StoreSchema::new(1).partition(crate::schema::PartitionDef::new("tills", "number"));
        let store = LocalStore::open_with(StoreConfig::in_memory(), schema).await.unwrap();

        let key = store.put("tills", &json!({"number": 7})).await.unwrap();
        assert_eq!(key, "7");
        assert!(store.get::<Value>("tills", "7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_boolean_index_lookup() {
        let store = store().await;

        for (id, synced) in [("s-1", false), ("s-2", true), ("s-3", false)] {
            store
                .put(partitions::SALES, &json!({"id": id, "synced": synced, "timestamp": 0}))
                .await
                .unwrap();
        }

        let pending: Vec<Value> = store
            .get_all_by_index(partitions::SALES, "synced", &false)
            .await
            .unwrap();
        let ids: Vec<_> = pending.iter().map(|v| v["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["s-1", "s-3"]);

        let done: Vec<Value> = store
            .get_all_by_index(partitions::SALES, "synced", &true)
            .await
            .unwrap();
        assert_eq!(done.len(), 1);
    }

    #[tokio::test]
    async fn test_string_index_lookup() {
        let store = store().await;
        store.put(partitions::PRODUCTS, &product("p-1", "A-1", "drinks")).await.unwrap();
        store.put(partitions::PRODUCTS, &product("p-2", "A-2", "snacks")).await.unwrap();
        store.put(partitions::PRODUCTS, &product("p-3", "A-3", "drinks")).await.unwrap();

        let drinks: Vec<Value> = store
            .get_all_by_index(partitions::PRODUCTS, "category", "drinks")
            .await
            .unwrap();
        assert_eq!(drinks.len(), 2);
    }

    #[tokio::test]
    async fn test_range_lookup_orders_by_field() {
        let store = store().await;

        for (id, ts) in [("s-1", 300), ("s-2", 100), ("s-3", 200), ("s-4", 900)] {
            store
                .put(partitions::SALES, &json!({"id": id, "synced": false, "timestamp": ts}))
                .await
                .unwrap();
        }

        let found: Vec<Value> = store
            .get_range_by_index(partitions::SALES, "timestamp", &100, &300)
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|v| v["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["s-2", "s-3", "s-1"]);
    }

    #[tokio::test]
    async fn test_unique_index_violation() {
        let store = store().await;
        store.put(partitions::PRODUCTS, &product("p-1", "SKU-1", "drinks")).await.unwrap();

        let err = store
            .put(partitions::PRODUCTS, &product("p-2", "SKU-1", "drinks"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { ref index, .. } if index == "sku"));

        // Same product may keep its own sku
        store.put(partitions::PRODUCTS, &product("p-1", "SKU-1", "snacks")).await.unwrap();
    }

    #[tokio::test]
    async fn test_transaction_is_atomic() {
        let store = store().await;
        store.put(partitions::PRODUCTS, &product("p-1", "SKU-1", "drinks")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.put(partitions::CATEGORIES, &json!({"id": "c-1", "name": "Drinks"})).await.unwrap();
        let err = tx
            .put(partitions::PRODUCTS, &product("p-2", "SKU-1", "drinks"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
        drop(tx);

        assert_eq!(store.count(partitions::CATEGORIES).await.unwrap(), 0);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.add(partitions::CATEGORIES, &json!({"id": "c-1", "name": "Drinks"})).await.unwrap(), "c-1");
        tx.put(partitions::PRODUCTS, &product("p-2", "SKU-2", "drinks")).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.count(partitions::CATEGORIES).await.unwrap(), 1);
        assert_eq!(store.count(partitions::PRODUCTS).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_transaction_add_rejects_existing_key() {
        let store = store().await;
        store.put(partitions::CATEGORIES, &json!({"id": "c-1", "name": "Drinks"})).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .add(partitions::CATEGORIES, &json!({"id": "c-1", "name": "Other"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn test_transaction_reads_its_own_writes() {
        let store = store().await;

        let mut tx = store.begin().await.unwrap();
        tx.put(partitions::PRODUCTS, &product("p-1", "SKU-1", "drinks")).await.unwrap();
        tx.put(partitions::PRODUCTS, &product("p-2", "SKU-2", "snacks")).await.unwrap();

        let found: Option<Value> = tx.get(partitions::PRODUCTS, "p-1").await.unwrap();
        assert_eq!(found.unwrap()["sku"], "SKU-1");
        let drinks: Vec<Value> = tx
            .get_all_by_index(partitions::PRODUCTS, "category", "drinks")
            .await
            .unwrap();
        assert_eq!(drinks.len(), 1);

        // Not committed: nothing is visible outside
        drop(tx);
        assert_eq!(store.count(partitions::PRODUCTS).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_read_modify_write_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open_with(
            StoreConfig::new(dir.path().join("tally.db")).max_connections(4),
            StoreSchema::pos(),
        )
        .await
        .unwrap();
        store
            .put(partitions::PRODUCTS, &json!({"id": "p-1", "sku": "SKU-1", "quantity": 100}))
            .await
            .unwrap();

        let decrement = |store: LocalStore| async move {
            for _ in 0..10 {
                let mut tx = store.begin().await.unwrap();
                let mut record: Value = tx.get(partitions::PRODUCTS, "p-1").await.unwrap().unwrap();
                let quantity = record["quantity"].as_i64().unwrap();
                tokio::task::yield_now().await;
                record["quantity"] = json!(quantity - 1);
                tx.put(partitions::PRODUCTS, &record).await.unwrap();
                tx.commit().await.unwrap();
            }
        };

        let a = tokio::spawn(decrement(store.clone()));
        let b = tokio::spawn(decrement(store.clone()));
        a.await.unwrap();
        b.await.unwrap();

        let record: Value = store.get(partitions::PRODUCTS, "p-1").await.unwrap().unwrap();
        assert_eq!(record["quantity"], 80);
    }

    #[tokio::test]
    async fn test_begin_before_open_is_not_ready() {
        let store = LocalStore::new(StoreConfig::in_memory(), StoreSchema::pos());
        assert!(matches!(store.begin().await.err(), Some(StoreError::NotReady)));
    }

    #[tokio::test]
    async fn test_delete_clear_count() {
        let store = store().await;
        for id in ["a", "b", "c"] {
            store.put(partitions::CATEGORIES, &json!({"id": id, "name": id})).await.unwrap();
        }

        assert_eq!(store.count(partitions::CATEGORIES).await.unwrap(), 3);
        assert!(store.delete(partitions::CATEGORIES, "b").await.unwrap());
        assert!(!store.delete(partitions::CATEGORIES, "b").await.unwrap());
        assert_eq!(store.count(partitions::CATEGORIES).await.unwrap(), 2);
        assert_eq!(store.clear(partitions::CATEGORIES).await.unwrap(), 2);
        assert_eq!(store.count(partitions::CATEGORIES).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_partition_and_index() {
        let store = store().await;

        let err = store.count("customers").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownPartition(_)));

        let err = store
            .get_all_by_index::<Value, _>(partitions::CATEGORIES, "name", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownIndex { .. }));
    }

    #[tokio::test]
    async fn test_custom_unique_index_name() {
        let schema = StoreSchema::new(1).partition(
            crate::schema::PartitionDef::new("cards", "id").index(IndexDef {
                name: "by_number".into(),
                field: "number".into(),
                unique: true,
            }),
        );
        let store = LocalStore::open_with(StoreConfig::in_memory(), schema).await.unwrap();

        store.put("cards", &json!({"id": "1", "number": "42"})).await.unwrap();
        let err = store.put("cards", &json!({"id": "2", "number": "42"})).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { ref index, .. } if index == "by_number"));
    }
}
