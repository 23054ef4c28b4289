//! # Store Schema
//!
//! Versioned declaration of partitions and their secondary indexes.
//!
//! ## How Initialization Works
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Schema Initialization                              │
//! │                                                                         │
//! │  LocalStore::open()                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                 │
//! │       │                                                                 │
//! │       ├── CREATE TABLE IF NOT EXISTS _tally_meta                       │
//! │       ├── read schema_version                                          │
//! │       │     └── on-disk > requested? → SchemaVersion error             │
//! │       │                                                                 │
//! │       ├── CREATE TABLE IF NOT EXISTS "p_sales" ...                     │
//! │       ├── CREATE INDEX IF NOT EXISTS "idx_sales_synced" ...            │
//! │       ├── ...one table per partition, one index per declared index     │
//! │       │                                                                 │
//! │       └── upsert schema_version                                        │
//! │       │                                                                 │
//! │  COMMIT                                                                │
//! │                                                                         │
//! │  Every statement is IF NOT EXISTS, so re-opening is a no-op and two    │
//! │  processes racing to initialize end in the same state. Data rows are   │
//! │  never touched.                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Physical Layout
//! Each partition is a table `p_<name>(seq, key, body)`. `seq` preserves
//! insertion order across upserts, `key` is unique, `body` is the JSON
//! document. An index on field `f` is an expression index over
//! `json_extract(body, '$.f')`, so boolean fields get a real index.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Partition names used by the POS schema.
pub mod partitions {
    pub const SALES: &str = "sales";
    pub const PRODUCTS: &str = "products";
    pub const CATEGORIES: &str = "categories";
    pub const SYNC_QUEUE: &str = "syncQueue";
}

const META_TABLE: &str = "_tally_meta";
const VERSION_KEY: &str = "schema_version";

// =============================================================================
// Declarations
// =============================================================================

/// A secondary index over one top-level field of the stored records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub field: String,
    pub unique: bool,
}

impl IndexDef {
    /// Non-unique index named after its field.
    pub fn on(field: &str) -> Self {
        IndexDef {
            name: field.to_string(),
            field: field.to_string(),
            unique: false,
        }
    }

    /// Unique index named after its field.
    pub fn unique(field: &str) -> Self {
        IndexDef {
            unique: true,
            ..IndexDef::on(field)
        }
    }
}

/// A named partition keyed by one field of its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDef {
    pub name: String,
    pub key_path: String,
    pub indexes: Vec<IndexDef>,
}

impl PartitionDef {
    pub fn new(name: &str, key_path: &str) -> Self {
        PartitionDef {
            name: name.to_string(),
            key_path: key_path.to_string(),
            indexes: Vec::new(),
        }
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub(crate) fn find_index(&self, name: &str) -> StoreResult<&IndexDef> {
        self.indexes
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| StoreError::UnknownIndex {
                partition: self.name.clone(),
                index: name.to_string(),
            })
    }

    /// Quoted table name.
    pub(crate) fn table(&self) -> String {
        format!("\"p_{}\"", self.name)
    }

    pub(crate) fn index_name(&self, index: &IndexDef) -> String {
        format!("idx_{}_{}", self.name, index.name)
    }
}

/// The full, versioned set of partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchema {
    pub version: u32,
    pub partitions: Vec<PartitionDef>,
}

impl StoreSchema {
    pub fn new(version: u32) -> Self {
        StoreSchema {
            version,
            partitions: Vec::new(),
        }
    }

    pub fn partition(mut self, partition: PartitionDef) -> Self {
        self.partitions.push(partition);
        self
    }

    /// The POS schema: sales, products, categories and the sync queue.
    ///
    /// ```text
    /// sales       key id   idx synced, timestamp
    /// products    key id   idx sku (unique), category
    /// categories  key id
    /// syncQueue   key id   idx synced, createdAt, entityId
    /// ```
    pub fn pos() -> Self {
        StoreSchema::new(1)
            .partition(
                PartitionDef::new(partitions::SALES, "id")
                    .index(IndexDef::on("synced"))
                    .index(IndexDef::on("timestamp")),
            )
            .partition(
                PartitionDef::new(partitions::PRODUCTS, "id")
                    .index(IndexDef::unique("sku"))
                    .index(IndexDef::on("category")),
            )
            .partition(PartitionDef::new(partitions::CATEGORIES, "id"))
            .partition(
                PartitionDef::new(partitions::SYNC_QUEUE, "id")
                    .index(IndexDef::on("synced"))
                    .index(IndexDef::on("createdAt"))
                    .index(IndexDef::on("entityId")),
            )
    }

    pub fn find(&self, name: &str) -> StoreResult<&PartitionDef> {
        self.partitions
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| StoreError::UnknownPartition(name.to_string()))
    }

    /// Rejects names that cannot be embedded in SQL identifiers or JSON paths.
    ///
    /// Names are spliced into DDL and into the `json_extract` path of each
    /// index expression, so only `[A-Za-z0-9_]` is accepted.
    pub fn validate(&self) -> StoreResult<()> {
        if self.version == 0 {
            return Err(StoreError::InvalidSchema("version must be at least 1".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for partition in &self.partitions {
            check_identifier("partition", &partition.name)?;
            check_identifier("key path", &partition.key_path)?;
            if !seen.insert(partition.name.as_str()) {
                return Err(StoreError::InvalidSchema(format!(
                    "partition '{}' declared twice",
                    partition.name
                )));
            }

            let mut index_names = std::collections::HashSet::new();
            for index in &partition.indexes {
                check_identifier("index", &index.name)?;
                check_identifier("index field", &index.field)?;
                if !index_names.insert(index.name.as_str()) {
                    return Err(StoreError::InvalidSchema(format!(
                        "index '{}' declared twice on '{}'",
                        index.name, partition.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// DDL statements that bring a database up to this schema.
    pub(crate) fn ddl(&self) -> Vec<String> {
        let mut statements = Vec::new();

        for partition in &self.partitions {
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    key TEXT NOT NULL UNIQUE,
                    body TEXT NOT NULL
                )",
                partition.table()
            ));

            for index in &partition.indexes {
                statements.push(format!(
                    "CREATE {}INDEX IF NOT EXISTS \"{}\" ON {} ({})",
                    if index.unique { "UNIQUE " } else { "" },
                    partition.index_name(index),
                    partition.table(),
                    field_expr(&index.field)
                ));
            }
        }

        statements
    }
}

fn check_identifier(what: &str, name: &str) -> StoreResult<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::InvalidSchema(format!(
            "{} name '{}' must be non-empty [A-Za-z0-9_]",
            what, name
        )));
    }
    Ok(())
}

/// SQL expression reading a top-level field of the stored document.
///
/// Must be textually identical in the index definition and in queries for
/// SQLite to use the index.
pub(crate) fn field_expr(field: &str) -> String {
    format!("json_extract(body, '$.{}')", field)
}

// =============================================================================
// Initialization
// =============================================================================

/// Creates missing partitions and indexes and records the schema version.
pub(crate) async fn initialize(pool: &SqlitePool, schema: &StoreSchema) -> StoreResult<()> {
    schema.validate()?;

    let mut tx = pool.begin().await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} (name TEXT PRIMARY KEY, value TEXT NOT NULL)",
        META_TABLE
    ))
    .execute(&mut *tx)
    .await?;

    let found: Option<String> =
        sqlx::query_scalar(&format!("SELECT value FROM {} WHERE name = ?1", META_TABLE))
            .bind(VERSION_KEY)
            .fetch_optional(&mut *tx)
            .await?;

    let found = found.and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);
    if found > schema.version {
        return Err(StoreError::SchemaVersion {
            found,
            requested: schema.version,
        });
    }

    for statement in schema.ddl() {
        sqlx::query(&statement).execute(&mut *tx).await?;
    }

    sqlx::query(&format!(
        "INSERT INTO {} (name, value) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        META_TABLE
    ))
    .bind(VERSION_KEY)
    .bind(schema.version.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    if found == schema.version {
        debug!(version = schema.version, "Schema already current");
    } else {
        info!(from = found, to = schema.version, "Schema initialized");
    }

    Ok(())
}

/// Returns the schema version recorded on disk (0 if never initialized).
pub(crate) async fn recorded_version(pool: &SqlitePool) -> StoreResult<u32> {
    let exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
    )
    .bind(META_TABLE)
    .fetch_one(pool)
    .await?;

    if exists == 0 {
        return Ok(0);
    }

    let value: Option<String> =
        sqlx::query_scalar(&format!("SELECT value FROM {} WHERE name = ?1", META_TABLE))
            .bind(VERSION_KEY)
            .fetch_optional(pool)
            .await?;

    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
}

/// A no-op write on the meta row. Run first in a transaction, it takes the
/// SQLite write lock before any read.
pub(crate) fn claim_write_lock_sql() -> String {
    format!("UPDATE {} SET value = value WHERE name = '{}'", META_TABLE, VERSION_KEY)
}
