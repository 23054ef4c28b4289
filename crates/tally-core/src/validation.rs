//! # Payload Validation
//!
//! Checks an operation before it is written to the queue.
//!
//! ## Why Validate Before Enqueue
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  A malformed payload can never succeed on the server. If it reached    │
//! │  the queue it would burn its retry budget and sit dead-lettered.       │
//! │                                                                         │
//! │  enqueue(op)                                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate_operation(op) ← THIS MODULE                                  │
//! │       │                                                                 │
//! │       ├── invalid → ValidationError (nothing persisted)                │
//! │       │                                                                 │
//! │       └── OK → QueueItem + EntityMirror written to the store           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_sku, validate_quantity};
//!
//! assert!(validate_sku("COKE-330").is_ok());
//! assert!(validate_quantity(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::{ProductUpdatePayload, QueueOperation, SalePayload, StockAdjustmentPayload};
use crate::{MAX_ITEM_QUANTITY, MAX_SALE_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates an identifier (product id, caller-supplied queue id).
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > 128 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 128,
        });
    }

    Ok(())
}

/// Validates a SKU.
///
/// ## Rules
/// - Not empty, at most 50 characters
/// - Letters, digits, hyphens and underscores only
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a line quantity: `1..=MAX_ITEM_QUANTITY`.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an amount in cents. Zero is allowed.
pub fn validate_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Payload Validators
// =============================================================================

/// Validates a sale: at least one line, sane lines, and a total that
/// matches the lines.
pub fn validate_sale(sale: &SalePayload) -> ValidationResult<()> {
    if sale.lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    if sale.lines.len() > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        });
    }

    for line in &sale.lines {
        validate_id("productId", &line.product_id)?;
        validate_quantity(line.quantity)?;
        validate_cents("unitPriceCents", line.unit_price_cents)?;
    }

    validate_cents("totalCents", sale.total_cents)?;

    let expected = sale.lines_total_cents().ok_or_else(|| ValidationError::OutOfRange {
        field: "totalCents".to_string(),
        min: 0,
        max: i64::MAX,
    })?;
    if expected != sale.total_cents {
        return Err(ValidationError::Mismatch {
            field: "totalCents".to_string(),
            expected,
            actual: sale.total_cents,
        });
    }

    Ok(())
}

pub fn validate_product_update(update: &ProductUpdatePayload) -> ValidationResult<()> {
    validate_id("productId", &update.product_id)?;
    validate_sku(&update.sku)?;

    if update.name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    validate_cents("priceCents", update.price_cents)?;

    if update.quantity < 0 {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

pub fn validate_stock_adjustment(adjustment: &StockAdjustmentPayload) -> ValidationResult<()> {
    validate_id("productId", &adjustment.product_id)?;

    if adjustment.delta == 0 {
        return Err(ValidationError::InvalidFormat {
            field: "delta".to_string(),
            reason: "must not be zero".to_string(),
        });
    }

    Ok(())
}

/// Validates whichever payload the operation carries.
pub fn validate_operation(operation: &QueueOperation) -> ValidationResult<()> {
    match operation {
        QueueOperation::Sale(sale) => validate_sale(sale),
        QueueOperation::ProductUpdate(update) => validate_product_update(update),
        QueueOperation::StockAdjustment(adjustment) => validate_stock_adjustment(adjustment),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentMethod, SaleLine};

    fn line(qty: i64, price: i64) -> SaleLine {
        SaleLine {
            product_id: "p-1".into(),
            sku: "COKE-330".into(),
            name: "Coca-Cola".into(),
            quantity: qty,
            unit_price_cents: price,
        }
    }

    fn sale(lines: Vec<SaleLine>, total: i64) -> SalePayload {
        SalePayload {
            lines,
            total_cents: total,
            payment_method: PaymentMethod::Cash,
            cashier_id: None,
            note: None,
        }
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("COKE-330").is_ok());
        assert!(validate_sku("product_1").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_sale() {
        assert!(validate_sale(&sale(vec![line(2, 250)], 500)).is_ok());

        // No lines
        assert!(validate_sale(&sale(vec![], 0)).is_err());

        // Total does not add up
        let err = validate_sale(&sale(vec![line(2, 250)], 400)).unwrap_err();
        assert!(matches!(err, ValidationError::Mismatch { expected: 500, actual: 400, .. }));

        // Negative price
        assert!(validate_sale(&sale(vec![line(1, -5)], -5)).is_err());
    }

    #[test]
    fn test_validate_sale_rejects_overflowing_totals() {
        // A single line whose product does not fit in i64
        let err = validate_sale(&sale(vec![line(2, i64::MAX / 2 + 1)], 0)).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { ref field, .. } if field == "totalCents"));

        // Each line fits, their sum does not
        let err = validate_sale(&sale(vec![line(1, i64::MAX), line(1, 1)], i64::MAX)).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { ref field, .. } if field == "totalCents"));
    }

    #[test]
    fn test_validate_stock_adjustment() {
        let mut adj = StockAdjustmentPayload {
            product_id: "p-1".into(),
            delta: -2,
            reason: Some("breakage".into()),
        };
        assert!(validate_stock_adjustment(&adj).is_ok());

        adj.delta = 0;
        assert!(validate_stock_adjustment(&adj).is_err());
    }

    #[test]
    fn test_validate_product_update() {
        let mut update = ProductUpdatePayload {
            product_id: "p-1".into(),
            sku: "COKE-330".into(),
            name: "Coca-Cola".into(),
            price_cents: 250,
            quantity: 0,
            category: None,
        };
        assert!(validate_operation(&QueueOperation::ProductUpdate(update.clone())).is_ok());

        update.name = "  ".into();
        assert!(validate_operation(&QueueOperation::ProductUpdate(update)).is_err());
    }
}
