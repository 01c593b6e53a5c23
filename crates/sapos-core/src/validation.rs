//! # Validation Module
//!
//! Input validation for local writes.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI                                                            │
//! │  └── Immediate cashier feedback                                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE, called by the sapos-db write helpers            │
//! │  └── Rejects a record BEFORE a device_seq is issued for it             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                        │
//! │  └── CHECK constraints on enums                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote records are NOT validated here: whatever another device managed
//! to sync is accepted as-is by the merge engine.
//!
//! ## Usage
//! ```rust
//! use sapos_core::validation::{validate_sku, validate_quantity};
//!
//! assert!(validate_sku("COKE-330").is_ok());
//! assert!(validate_quantity(5).is_ok());
//! ```

use crate::error::ValidationError;
use crate::types::{NewItem, NewSale, NewStockMovement};
use crate::{
    MAX_ITEM_QUANTITY, MAX_MOVEMENT_QUANTITY, MAX_PRICE_CENTS, MAX_SALE_LINES, MAX_TEXT_LEN,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, numbers, hyphens and underscores only
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

/// Validates a barcode: digits only, 8 to 14 long (EAN-8 up to GTIN-14).
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    let barcode = barcode.trim();

    if !(8..=14).contains(&barcode.len()) || !barcode.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must be 8 to 14 digits".to_string(),
        });
    }

    Ok(())
}

/// Validates a required free-text field such as an item name.
pub fn validate_required_text(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    validate_optional_text(field, Some(value))
}

/// Validates an optional free-text field (category, notes).
pub fn validate_optional_text(field: &str, value: Option<&str>) -> ValidationResult<()> {
    match value {
        Some(v) if v.len() > MAX_TEXT_LEN => Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_TEXT_LEN,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity sold on one sale line.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
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

/// Validates a price in cents: 0 to MAX_PRICE_CENTS inclusive.
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a UUID string.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Record Validators
// =============================================================================

/// Validates a new item before it is written and logged.
pub fn validate_new_item(item: &NewItem) -> ValidationResult<()> {
    validate_required_text("name", &item.name)?;
    validate_price_cents(item.price_cents)?;
    if let Some(sku) = &item.sku {
        validate_sku(sku)?;
    }
    if let Some(barcode) = &item.barcode {
        validate_barcode(barcode)?;
    }
    if item.initial_stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "initial_stock".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    validate_optional_text("category", item.category.as_deref())
}

/// Validates a sale before it is written and logged.
///
/// ## Rules
/// - At least one line, at most MAX_SALE_LINES
/// - Every line references an item id and sells a valid quantity
pub fn validate_new_sale(sale: &NewSale) -> ValidationResult<()> {
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
        validate_uuid("item_id", &line.item_id)?;
        validate_quantity(line.quantity)?;
        validate_price_cents(line.price_cents)?;
    }

    Ok(())
}

/// Validates a stock movement. Quantity is signed but never zero.
pub fn validate_new_movement(movement: &NewStockMovement) -> ValidationResult<()> {
    validate_uuid("item_id", &movement.item_id)?;

    if movement.quantity == 0 {
        return Err(ValidationError::MustBeNonZero {
            field: "quantity".to_string(),
        });
    }

    if !(-MAX_MOVEMENT_QUANTITY..=MAX_MOVEMENT_QUANTITY).contains(&movement.quantity) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: -MAX_MOVEMENT_QUANTITY,
            max: MAX_MOVEMENT_QUANTITY,
        });
    }

    validate_optional_text("notes", movement.notes.as_deref())
}

// =============================================================================
// Unit Tests
// =============================================================================
