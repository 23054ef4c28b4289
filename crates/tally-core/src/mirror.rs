//! # Entity Mirrors
//!
//! Local copies of domain entities written optimistically when an operation
//! is enqueued, so the UI can show them before the server has seen them.
//!
//! ## Reconciliation
//! ```text
//! enqueue(Sale)          sync pass succeeds
//!      │                        │
//!      ▼                        ▼
//! SaleRecord {              SaleRecord {
//!   id: "c0ffee…",            id: "c0ffee…",      ← never changes
//!   synced: false,            synced: true,
//!   server_id: None,          server_id: Some("64f…"),
//! }                         }
//! ```
//!
//! Mirrors are kept indefinitely as the local cache of business data; only
//! queue items are ever purged.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::{PaymentMethod, ProductUpdatePayload, SaleLine, SalePayload};
use crate::validation::ValidationResult;

// =============================================================================
// Sale
// =============================================================================

/// Locally cached sale, keyed by the id of the queue item that created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    pub id: String,
    pub lines: Vec<SaleLine>,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub cashier_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub timestamp: DateTime<Utc>,
    pub synced: bool,
    #[serde(default)]
    pub server_id: Option<String>,
}

impl SaleRecord {
    /// Builds the optimistic mirror of a sale that has not reached the server.
    pub fn from_payload(id: impl Into<String>, payload: &SalePayload, at: DateTime<Utc>) -> Self {
        SaleRecord {
            id: id.into(),
            lines: payload.lines.clone(),
            total_cents: payload.total_cents,
            payment_method: payload.payment_method,
            cashier_id: payload.cashier_id.clone(),
            note: payload.note.clone(),
            timestamp: at.trunc_subsecs(3),
            synced: false,
            server_id: None,
        }
    }

    /// Merges the server-assigned identifier.
    pub fn reconcile(&mut self, server_id: impl Into<String>) {
        self.server_id = Some(server_id.into());
        self.synced = true;
    }
}

// =============================================================================
// Product
// =============================================================================

/// Locally cached product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    pub quantity: i64,
    #[serde(default)]
    pub category: Option<String>,
    pub synced: bool,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub updated_at: DateTime<Utc>,
}

impl ProductRecord {
    /// Applies a full product update on top of the cached record (if any).
    ///
    /// The server id survives: it belongs to the entity, not to the edit.
    pub fn apply_update(
        existing: Option<ProductRecord>,
        payload: &ProductUpdatePayload,
        at: DateTime<Utc>,
    ) -> Self {
        let server_id = existing.and_then(|p| p.server_id);
        ProductRecord {
            id: payload.product_id.clone(),
            sku: payload.sku.clone(),
            name: payload.name.clone(),
            price_cents: payload.price_cents,
            quantity: payload.quantity,
            category: payload.category.clone(),
            synced: false,
            server_id,
            updated_at: at.trunc_subsecs(3),
        }
    }

    /// Applies a relative stock change. A result outside `i64` is rejected
    /// and leaves the record untouched.
    pub fn apply_adjustment(&mut self, delta: i64, at: DateTime<Utc>) -> ValidationResult<()> {
        self.quantity = self
            .quantity
            .checked_add(delta)
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: i64::MIN,
                max: i64::MAX,
            })?;
        self.synced = false;
        self.updated_at = at.trunc_subsecs(3);
        Ok(())
    }

    /// Merges the server-assigned identifier.
    pub fn reconcile(&mut self, server_id: impl Into<String>) {
        self.server_id = Some(server_id.into());
        self.synced = true;
    }
}

// =============================================================================
// Category
// =============================================================================

/// Cached category reference data. Never queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(qty: i64) -> ProductUpdatePayload {
        ProductUpdatePayload {
            product_id: "p-1".into(),
            sku: "COKE-330".into(),
            name: "Coca-Cola 330ml".into(),
            price_cents: 250,
            quantity: qty,
            category: Some("drinks".into()),
        }
    }

    #[test]
    fn test_update_keeps_server_id() {
        let mut first = ProductRecord::apply_update(None, &update(10), Utc::now());
        first.reconcile("srv-p1");

        let second = ProductRecord::apply_update(Some(first), &update(12), Utc::now());
        assert_eq!(second.server_id.as_deref(), Some("srv-p1"));
        assert_eq!(second.quantity, 12);
        assert!(!second.synced);
    }

    #[test]
    fn test_adjustment_changes_quantity() {
        let mut product = ProductRecord::apply_update(None, &update(10), Utc::now());
        product.reconcile("srv-p1");
        product.apply_adjustment(-3, Utc::now()).unwrap();

        assert_eq!(product.quantity, 7);
        assert!(!product.synced);
    }

    #[test]
    fn test_adjustment_overflow_is_rejected() {
        let mut product = ProductRecord::apply_update(None, &update(10), Utc::now());
        product.reconcile("srv-p1");

        let err = product.apply_adjustment(i64::MAX, Utc::now()).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { ref field, .. } if field == "quantity"));
        assert_eq!(product.quantity, 10);
        assert!(product.synced);

        assert!(product.apply_adjustment(i64::MIN, Utc::now()).is_ok());
        assert!(product.apply_adjustment(-11, Utc::now()).is_err());
    }

    #[test]
    fn test_sale_reconcile() {
        let payload = SalePayload {
            lines: vec![],
            total_cents: 0,
            payment_method: PaymentMethod::Card,
            cashier_id: None,
            note: None,
        };
        let mut sale = SaleRecord::from_payload("local-1", &payload, Utc::now());
        sale.reconcile("srv-9");

        assert_eq!(sale.id, "local-1");
        assert_eq!(sale.server_id.as_deref(), Some("srv-9"));
        assert!(sale.synced);
    }
}
