//! # Queue Types
//!
//! The unit of deferred work and the typed operations it carries.
//!
//! ## Queue Item Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    QueueItem State Machine                              │
//! │                                                                         │
//! │   enqueue()                                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──────────────────┐  replay fails   ┌──────────────────┐             │
//! │  │ Pending(0)       │ ──────────────► │ Pending(k)       │ ──┐         │
//! │  └────────┬─────────┘                 └────────┬─────────┘   │ fails   │
//! │           │ replay ok                          │ replay ok   │         │
//! │           ▼                                    ▼             ▼         │
//! │  ┌──────────────────┐                 ┌──────────────────────────┐     │
//! │  │ Synced           │                 │ DeadLettered(max_retries)│     │
//! │  └──────────────────┘                 └──────────────────────────┘     │
//! │                                                                         │
//! │  • `synced` only ever moves false → true                               │
//! │  • `attempts` only grows, and only while unsynced                      │
//! │  • DeadLettered is never retried automatically, never deleted          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Typed Payloads
//! Every queue item carries a [`QueueOperation`]: a tagged union whose
//! variant decides which remote endpoint replays it. Replay code matches on
//! it exhaustively instead of inspecting untyped JSON.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

// =============================================================================
// Queue Kind
// =============================================================================

/// Which remote operation a queue item replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Create a sale on the server.
    Sale,
    /// Replace a product's editable fields.
    ProductUpdate,
    /// Apply a quantity delta to a product.
    StockAdjustment,
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueKind::Sale => write!(f, "sale"),
            QueueKind::ProductUpdate => write!(f, "product_update"),
            QueueKind::StockAdjustment => write!(f, "stock_adjustment"),
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    #[default]
    Cash,
    /// Card payment on an external terminal.
    Card,
    /// Voucher, transfer, anything else.
    Other,
}

// =============================================================================
// Payloads
// =============================================================================

/// A line of a sale, with product data frozen at the time of sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl SaleLine {
    /// `unit_price_cents × quantity`, or `None` if it overflows.
    pub fn line_total_cents(&self) -> Option<i64> {
        self.unit_price_cents.checked_mul(self.quantity)
    }
}

/// Everything needed to create a sale on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SalePayload {
    pub lines: Vec<SaleLine>,
    pub total_cents: i64,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub cashier_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl SalePayload {
    /// Sum of all line totals, or `None` if any step overflows.
    pub fn lines_total_cents(&self) -> Option<i64> {
        self.lines
            .iter()
            .try_fold(0i64, |total, line| total.checked_add(line.line_total_cents()?))
    }
}

/// Full replacement of a product's editable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdatePayload {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    pub quantity: i64,
    #[serde(default)]
    pub category: Option<String>,
}

/// A relative change to a product's stock level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustmentPayload {
    pub product_id: String,
    /// Signed quantity change (negative for shrinkage, positive for receiving).
    pub delta: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

// =============================================================================
// Queue Operation
// =============================================================================

/// A business operation recorded locally and replayed against the server.
///
/// Serialized as `{"kind": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum QueueOperation {
    Sale(SalePayload),
    ProductUpdate(ProductUpdatePayload),
    StockAdjustment(StockAdjustmentPayload),
}

impl QueueOperation {
    /// Returns the kind discriminant.
    pub fn kind(&self) -> QueueKind {
        match self {
            QueueOperation::Sale(_) => QueueKind::Sale,
            QueueOperation::ProductUpdate(_) => QueueKind::ProductUpdate,
            QueueOperation::StockAdjustment(_) => QueueKind::StockAdjustment,
        }
    }

    /// Key of the entity mirror this operation writes to.
    ///
    /// Sales are created locally, so their mirror shares the queue item id.
    /// Product operations target an existing product.
    pub fn entity_id<'a>(&'a self, item_id: &'a str) -> &'a str {
        match self {
            QueueOperation::Sale(_) => item_id,
            QueueOperation::ProductUpdate(p) => &p.product_id,
            QueueOperation::StockAdjustment(p) => &p.product_id,
        }
    }
}

// =============================================================================
// Queue Item
// =============================================================================

/// Derived lifecycle state of a queue item against a retry ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueItemState {
    /// Waiting for (another) replay.
    Pending { attempts: u32 },
    /// Replayed successfully. Terminal.
    Synced,
    /// Exhausted its retry budget. Terminal until someone intervenes.
    DeadLettered { attempts: u32 },
}

/// A durable record of one business operation awaiting replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Unique id; also the idempotency token sent to the server.
    pub id: String,

    pub operation: QueueOperation,

    /// Key of the mirror record in the entity's partition.
    pub entity_id: String,

    /// Enqueue time, stored as epoch milliseconds so it sorts numerically.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub created_at: DateTime<Utc>,

    pub synced: bool,

    pub attempts: u32,

    #[serde(default)]
    pub last_error: Option<String>,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub last_attempt_at: Option<DateTime<Utc>>,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub synced_at: Option<DateTime<Utc>>,

    /// Identifier the server assigned on successful replay.
    #[serde(default)]
    pub server_id: Option<String>,
}

impl QueueItem {
    /// Creates a pending item with a fresh client-generated id.
    pub fn new(operation: QueueOperation) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), operation)
    }

    /// Creates a pending item with a caller-supplied id.
    pub fn with_id(id: impl Into<String>, operation: QueueOperation) -> Self {
        let id = id.into();
        let entity_id = operation.entity_id(&id).to_string();
        QueueItem {
            id,
            operation,
            entity_id,
            created_at: now_millis(),
            synced: false,
            attempts: 0,
            last_error: None,
            last_attempt_at: None,
            synced_at: None,
            server_id: None,
        }
    }

    #[inline]
    pub fn kind(&self) -> QueueKind {
        self.operation.kind()
    }

    /// Lifecycle state against the given retry ceiling.
    pub fn state(&self, max_retries: u32) -> QueueItemState {
        if self.synced {
            QueueItemState::Synced
        } else if self.attempts >= max_retries {
            QueueItemState::DeadLettered {
                attempts: self.attempts,
            }
        } else {
            QueueItemState::Pending {
                attempts: self.attempts,
            }
        }
    }

    /// True when unsynced and out of retries.
    pub fn is_dead_lettered(&self, max_retries: u32) -> bool {
        matches!(self.state(max_retries), QueueItemState::DeadLettered { .. })
    }

    /// Records a successful replay.
    pub fn mark_synced(&mut self, server_id: impl Into<String>, at: DateTime<Utc>) {
        self.synced = true;
        self.server_id = Some(server_id.into());
        let at = at.trunc_subsecs(3);
        self.synced_at = Some(at);
        self.last_attempt_at = Some(at);
        self.last_error = None;
    }

    /// Records a failed replay. Ignored once the item is synced.
    pub fn record_failure(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        if self.synced {
            return;
        }
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.into());
        self.last_attempt_at = Some(at.trunc_subsecs(3));
    }
}

/// Current time at the millisecond precision records are stored with.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

// =============================================================================
// Unit Tests
// =============================================================================
