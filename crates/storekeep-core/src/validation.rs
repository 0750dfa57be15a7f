//! # Input Checks
//!
//! Shape checks on caller input, run before any transaction is opened.
//! Business rules (enough stock, legal till transitions) live with the
//! state machines in `stock`, `till` and `sale`; the schema backs both with
//! CHECK and UNIQUE constraints.
//!
//! ```rust
//! use storekeep_core::quantity::Quantity;
//! use storekeep_core::validation::{validate_quantity, validate_sku};
//!
//! assert!(validate_sku("RICE-1KG").is_ok());
//! assert!(validate_quantity(Quantity::from_units(5)).is_ok());
//! assert!(validate_quantity(Quantity::zero()).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::{Money, Percentage};
use crate::quantity::Quantity;
use crate::{MAX_REASON_LEN, MAX_SALE_LINES};

pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_SKU_LEN: usize = 50;
const MAX_NAME_LEN: usize = 200;
const MAX_TILL_NAME_LEN: usize = 60;

/// Trims `value` and rejects it if blank or longer than `max` bytes.
fn bounded_text<'a>(field: &str, value: &'a str, max: usize) -> ValidationResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(value)
}

// =============================================================================
// Text
// =============================================================================

/// SKU: at most 50 characters of letters, digits, `-` and `_`.
///
/// ```rust
/// use storekeep_core::validation::validate_sku;
///
/// assert!(validate_sku("SNK-CHIPS_45").is_ok());
/// assert!(validate_sku("SNK CHIPS").is_err());
/// assert!(validate_sku(&"Z".repeat(51)).is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = bounded_text("sku", sku, MAX_SKU_LEN)?;
    let legal = |c: char| c.is_alphanumeric() || matches!(c, '-' | '_');
    if sku.chars().all(legal) {
        Ok(())
    } else {
        Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "only letters, digits, '-' and '_' are allowed".to_string(),
        })
    }
}

pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    bounded_text("name", name, MAX_NAME_LEN).map(drop)
}

/// Display name of a till, e.g. `Front 1`.
pub fn validate_till_name(name: &str) -> ValidationResult<()> {
    bounded_text("name", name, MAX_TILL_NAME_LEN).map(drop)
}

/// Free-text reason for a block, void or rejection.
pub fn validate_reason(field: &str, reason: &str) -> ValidationResult<()> {
    bounded_text(field, reason, MAX_REASON_LEN).map(drop)
}

/// Validates an opaque identifier (user, product, till).
///
/// Identifiers of callers are not required to be UUIDs, only non-blank.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Amounts
// =============================================================================

/// Movement and line quantities are strictly positive; the movement kind
/// carries the direction.
pub fn validate_quantity(qty: Quantity) -> ValidationResult<()> {
    if !qty.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates a quantity that may be zero (thresholds, adjustment targets).
pub fn validate_non_negative_quantity(qty: Quantity) -> ValidationResult<()> {
    if qty.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates a price, cost or balance. Zero is allowed.
pub fn validate_non_negative_money(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a rate between 0% and 100%.
pub fn validate_percentage(field: &str, rate: Percentage) -> ValidationResult<()> {
    if rate > Percentage::FULL {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: Percentage::FULL.bps() as i64,
        });
    }
    Ok(())
}

/// Unwraps the result of a checked `Money` operation.
///
/// ```rust
/// use storekeep_core::money::Money;
/// use storekeep_core::quantity::Quantity;
/// use storekeep_core::validation::amount_in_range;
///
/// let gross = Money::from_cents(1 << 62).times(Quantity::from_units(4));
/// assert!(amount_in_range("gross", gross).is_err());
/// ```
pub fn amount_in_range(field: &str, amount: Option<Money>) -> ValidationResult<Money> {
    amount.ok_or_else(|| ValidationError::AmountOutOfRange {
        field: field.to_string(),
    })
}

/// A sale carries between 1 and `MAX_SALE_LINES` lines.
pub fn validate_line_count(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    if count > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sku_charset_and_length() {
        assert!(validate_sku("  BEV-COLA-355 ").is_ok());
        assert!(validate_sku(&"A".repeat(MAX_SKU_LEN)).is_ok());
        assert!(matches!(validate_sku(" \t"), Err(ValidationError::Required { .. })));
        assert!(matches!(
            validate_sku("BEV/COLA"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_name_bounds() {
        assert!(validate_product_name("Long Grain Rice 1kg").is_ok());
        assert!(validate_product_name(&"n".repeat(MAX_NAME_LEN + 1)).is_err());

        assert!(validate_till_name(" Front 1 ").is_ok());
        assert!(validate_till_name("").is_err());
        assert!(matches!(
            validate_till_name(&"t".repeat(MAX_TILL_NAME_LEN + 1)),
            Err(ValidationError::TooLong { max: MAX_TILL_NAME_LEN, .. })
        ));
    }

    #[test]
    fn test_reason_bounds() {
        assert!(validate_reason("reason", "cash count mismatch").is_ok());
        assert!(matches!(
            validate_reason("reason", "  "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_reason("reason", &"x".repeat(MAX_REASON_LEN + 1)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_quantities() {
        assert!(validate_quantity(Quantity::from_milli(1)).is_ok());
        assert!(validate_quantity(Quantity::zero()).is_err());
        assert!(validate_quantity(Quantity::from_units(-1)).is_err());

        assert!(validate_non_negative_quantity(Quantity::zero()).is_ok());
        assert!(validate_non_negative_quantity(Quantity::from_milli(-1)).is_err());
    }

    #[test]
    fn test_validate_money_and_rates() {
        assert!(validate_non_negative_money("price", Money::zero()).is_ok());
        assert!(validate_non_negative_money("price", Money::from_cents(-1)).is_err());
        assert!(validate_percentage("tax_rate", Percentage::FULL).is_ok());
        assert!(validate_percentage("tax_rate", Percentage::from_bps(10_001)).is_err());
    }

    #[test]
    fn test_line_count_bounds() {
        assert!(validate_line_count(0).is_err());
        assert!(validate_line_count(MAX_SALE_LINES).is_ok());
        assert!(validate_line_count(MAX_SALE_LINES + 1).is_err());
    }
}
