//! # Errors
//!
//! `CoreError` is every rule a ledger, till or sale operation can break.
//! `ValidationError` covers malformed input and is checked first, before a
//! transaction is opened.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate_*()  ──► ValidationError ─┐                                   │
//! │  state machines ─► CoreError ◄──────┘  (#[from])                        │
//! │                        │                                                │
//! │                        ▼                                                │
//! │  storekeep-db:   ServiceError::Domain   alongside ServiceError::Db      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here is retried. A caller that wants to retry `InsufficientStock`
//! owns its own backoff.

use chrono::NaiveDate;
use thiserror::Error;

use crate::quantity::Quantity;

// =============================================================================
// Core Error
// =============================================================================

/// A broken business rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A product, till, sale, closing or user reference does not resolve.
    #[error("{entity} not found: {id}")]
    EntityNotFound { entity: &'static str, id: String },

    /// `available` is on hand minus reserved at the moment of the check,
    /// e.g. 8 on hand with 4 held by other sales leaves 4 for a line of 5.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: Quantity,
        requested: Quantity,
    },

    /// A release asked for more than is currently reserved on the product.
    #[error("Cannot release {requested} of {product_id}: only {reserved} reserved")]
    ReleaseExceedsReserved {
        product_id: String,
        reserved: Quantity,
        requested: Quantity,
    },

    /// Another product already uses this SKU.
    #[error("SKU {sku} is already used by product {product_id}")]
    DuplicateSku { sku: String, product_id: String },

    /// The product is deactivated and cannot take part in new sales.
    #[error("Product {0} is inactive")]
    ProductInactive(String),

    /// The till must be `OPEN` for this operation.
    #[error("Till {0} is not open")]
    TillNotOpen(String),

    /// The till is already `OPEN`.
    #[error("Till {0} is already open")]
    TillAlreadyOpen(String),

    /// The user already has a different till `OPEN`.
    #[error("User {user_id} already has till {till_id} open")]
    UserHasOpenTill { user_id: String, till_id: String },

    /// Only the cashier the till was opened for may close it.
    #[error("User {user_id} is not the assigned cashier of till {till_id}")]
    NotAssignedCashier { till_id: String, user_id: String },

    /// The till state machine does not allow this transition.
    #[error("Till {till_id} cannot {action} while {state}")]
    InvalidTillTransition {
        till_id: String,
        state: String,
        action: &'static str,
    },

    /// A closing record already exists for this till on this date.
    #[error("Till {till_id} already has a closing for {date}")]
    DuplicateClosing { till_id: String, date: NaiveDate },

    /// The closing-record workflow does not allow this transition.
    #[error("Closing {closing_id} cannot {action} while {state}")]
    InvalidClosingTransition {
        closing_id: String,
        state: String,
        action: &'static str,
    },

    /// The sale is not `PENDING` or `COMPLETED`.
    #[error("Sale {sale_id} is {state} and cannot be voided")]
    NotVoidable { sale_id: String, state: String },

    /// Tender is missing, negative or below the grand total.
    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::EntityNotFound {
            entity,
            id: id.into(),
        }
    }

    /// True for conflicts that may succeed later without changing the
    /// request (stock contention, a till being closed or reopened).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CoreError::InsufficientStock { .. }
                | CoreError::TillNotOpen(_)
                | CoreError::TillAlreadyOpen(_)
                | CoreError::UserHasOpenTill { .. }
                | CoreError::DuplicateClosing { .. }
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Malformed input. Raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Empty or whitespace only.
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Zero or negative where only a positive value makes sense.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// An amount derived from the input does not fit in i64 cents.
    #[error("{field} is out of the representable amount range")]
    AmountOutOfRange { field: String },

    /// Bad characters in a SKU.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_product_and_date() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            available: Quantity::from_units(3),
            requested: Quantity::from_units(5),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for p-1: available 3.000, requested 5.000"
        );

        let err = CoreError::DuplicateClosing {
            till_id: "t-1".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
        };
        assert_eq!(err.to_string(), "Till t-1 already has a closing for 2026-03-14");
    }

    #[test]
    fn test_bad_input_is_not_a_conflict() {
        let err: CoreError = ValidationError::Required {
            field: "reason".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Validation error: reason is required");
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_conflicts() {
        assert!(CoreError::TillNotOpen("t".into()).is_conflict());
        assert!(!CoreError::not_found("Sale", "s").is_conflict());
    }
}
