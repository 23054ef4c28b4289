//! # Mirror Repository
//!
//! Sales, products and categories cached locally for offline display.

use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::pool::LocalStore;
use crate::schema::partitions::{CATEGORIES, PRODUCTS, SALES};
use tally_core::{CategoryRecord, ProductRecord, SaleRecord};

/// Repository for locally mirrored entities.
#[derive(Debug, Clone)]
pub struct MirrorRepository {
    store: LocalStore,
}

impl MirrorRepository {
    pub fn new(store: LocalStore) -> Self {
        MirrorRepository { store }
    }

    // =========================================================================
    // Sales
    // =========================================================================

    pub async fn sale(&self, id: &str) -> StoreResult<Option<SaleRecord>> {
        self.store.get(SALES, id).await
    }

    pub async fn save_sale(&self, sale: &SaleRecord) -> StoreResult<()> {
        self.store.put(SALES, sale).await?;
        Ok(())
    }

    pub async fn sales(&self) -> StoreResult<Vec<SaleRecord>> {
        self.store.get_all(SALES).await
    }

    /// Sales the server has not acknowledged yet.
    pub async fn unsynced_sales(&self) -> StoreResult<Vec<SaleRecord>> {
        self.store.get_all_by_index(SALES, "synced", &false).await
    }

    /// Sales rung up within `[from, to]`, in time order.
    pub async fn sales_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<SaleRecord>> {
        self.store
            .get_range_by_index(SALES, "timestamp", &from.timestamp_millis(), &to.timestamp_millis())
            .await
    }

    // =========================================================================
    // Products
    // =========================================================================

    pub async fn product(&self, id: &str) -> StoreResult<Option<ProductRecord>> {
        self.store.get(PRODUCTS, id).await
    }

    /// Upserts a product. Fails with `UniqueViolation` if another product
    /// already owns the sku.
    pub async fn save_product(&self, product: &ProductRecord) -> StoreResult<()> {
        self.store.put(PRODUCTS, product).await?;
        Ok(())
    }

    pub async fn product_by_sku(&self, sku: &str) -> StoreResult<Option<ProductRecord>> {
        let mut found: Vec<ProductRecord> = self.store.get_all_by_index(PRODUCTS, "sku", sku).await?;
        Ok(found.pop())
    }

    pub async fn products_in_category(&self, category: &str) -> StoreResult<Vec<ProductRecord>> {
        self.store.get_all_by_index(PRODUCTS, "category", category).await
    }

    pub async fn products(&self) -> StoreResult<Vec<ProductRecord>> {
        self.store.get_all(PRODUCTS).await
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub async fn category(&self, id: &str) -> StoreResult<Option<CategoryRecord>> {
        self.store.get(CATEGORIES, id).await
    }

    pub async fn save_category(&self, category: &CategoryRecord) -> StoreResult<()> {
        self.store.put(CATEGORIES, category).await?;
        Ok(())
    }

    pub async fn categories(&self) -> StoreResult<Vec<CategoryRecord>> {
        self.store.get_all(CATEGORIES).await
    }
}
