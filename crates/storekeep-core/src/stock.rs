//! # Stock Module
//!
//! The product stock record and everything derived from it.
//!
//! ## Quantity Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Product Stock Record                              │
//! │                                                                         │
//! │   quantity_on_hand ──┐                                                  │
//! │                      ├──► available = on_hand − reserved  (derived)     │
//! │   quantity_reserved ─┘                                                  │
//! │                                                                         │
//! │   on_hand + thresholds ──► AlertState                     (derived)     │
//! │                                                                         │
//! │   reserve / release      → touch `reserved` only, no movement row      │
//! │   IN / OUT / ADJUSTMENT  → touch `on_hand`, append a StockMovement     │
//! │   TRANSFER / RETURN                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Derived values are never stored: `available()` and `alert_state()` are
//! computed from the base fields every time they are read, so no write path
//! can leave them stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, Percentage};
use crate::quantity::Quantity;
use crate::validation;
use crate::CRITICAL_RATIO;

// =============================================================================
// Alert State
// =============================================================================

/// Stock-health classification of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum AlertState {
    Normal,
    Low,
    Critical,
    Overstocked,
    Exhausted,
}

impl AlertState {
    /// Classifies an on-hand quantity against the product's thresholds.
    ///
    /// Checks run in a fixed order; exhaustion and criticality win over
    /// overstock:
    ///
    /// 1. `on_hand ≤ 0` → `Exhausted`
    /// 2. `on_hand ≤ 0.3 × reorder` → `Critical`
    /// 3. `on_hand ≤ reorder` → `Low`
    /// 4. `max` set and `on_hand > max` → `Overstocked`
    /// 5. otherwise `Normal`
    pub fn derive(
        on_hand: Quantity,
        reorder_threshold: Quantity,
        max_threshold: Option<Quantity>,
    ) -> AlertState {
        if on_hand <= Quantity::zero() {
            AlertState::Exhausted
        } else if on_hand.at_most_fraction_of(reorder_threshold, CRITICAL_RATIO) {
            AlertState::Critical
        } else if on_hand <= reorder_threshold {
            AlertState::Low
        } else if max_threshold.is_some_and(|max| on_hand > max) {
            AlertState::Overstocked
        } else {
            AlertState::Normal
        }
    }
}

// =============================================================================
// Movement Kind
// =============================================================================

/// Kind of a permanent stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum MovementKind {
    /// Goods received; on-hand increases.
    In,
    /// Goods leave (sale, consumption); on-hand decreases.
    Out,
    /// Stock count correction; on-hand is set to the counted value.
    Adjustment,
    /// Goods moved to another location; on-hand decreases.
    Transfer,
    /// Goods come back (customer return, voided sale); on-hand increases.
    Return,
}

impl MovementKind {
    /// Whether this kind takes stock away and therefore needs availability.
    pub const fn is_outbound(&self) -> bool {
        matches!(self, MovementKind::Out | MovementKind::Transfer)
    }
}

/// Before/after snapshot of a single on-hand change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub kind: MovementKind,
    pub before: Quantity,
    pub after: Quantity,
}

impl StockChange {
    /// Signed change in on-hand quantity.
    pub fn delta(&self) -> Quantity {
        self.after - self.before
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product's stock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name.
    pub name: String,

    pub quantity_on_hand: Quantity,

    /// Held by in-flight sales; not yet a permanent decrement.
    pub quantity_reserved: Quantity,

    pub reorder_threshold: Quantity,

    pub max_threshold: Option<Quantity>,

    /// Weighted average unit cost.
    pub average_cost: Money,

    /// Default unit sale price.
    pub sale_price: Money,

    /// Default tax percentage applied to sale lines.
    pub tax_rate: Percentage,

    /// Soft-deactivation flag; inactive products keep their history.
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// On hand minus reserved.
    #[inline]
    pub fn available(&self) -> Quantity {
        self.quantity_on_hand - self.quantity_reserved
    }

    /// Current alert state, derived from the stored quantities.
    pub fn alert_state(&self) -> AlertState {
        AlertState::derive(
            self.quantity_on_hand,
            self.reorder_threshold,
            self.max_threshold,
        )
    }

    /// `available ≥ quantity`.
    #[inline]
    pub fn has_sufficient_stock(&self, quantity: Quantity) -> bool {
        self.available() >= quantity
    }

    fn ensure_available(&self, quantity: Quantity) -> CoreResult<()> {
        if self.has_sufficient_stock(quantity) {
            Ok(())
        } else {
            Err(CoreError::InsufficientStock {
                product_id: self.id.clone(),
                available: self.available(),
                requested: quantity,
            })
        }
    }

    /// Places a temporary hold on `quantity`.
    ///
    /// ## Errors
    /// - `ProductInactive` for deactivated products
    /// - `InsufficientStock` when `available < quantity`
    pub fn reserve(&mut self, quantity: Quantity) -> CoreResult<Reservation> {
        validation::validate_quantity(quantity)?;
        if !self.is_active {
            return Err(CoreError::ProductInactive(self.id.clone()));
        }
        self.ensure_available(quantity)?;

        self.quantity_reserved += quantity;
        Ok(Reservation {
            product_id: self.id.clone(),
            quantity,
        })
    }

    /// Drops a hold of `quantity`.
    ///
    /// Releasing more than is reserved is a caller logic error and is
    /// reported, never clamped.
    pub fn release(&mut self, quantity: Quantity) -> CoreResult<()> {
        validation::validate_quantity(quantity)?;
        if quantity > self.quantity_reserved {
            return Err(CoreError::ReleaseExceedsReserved {
                product_id: self.id.clone(),
                reserved: self.quantity_reserved,
                requested: quantity,
            });
        }

        self.quantity_reserved -= quantity;
        Ok(())
    }

    /// Applies a permanent on-hand change.
    ///
    /// ## Semantics per kind
    /// ```text
    /// IN, RETURN       on_hand += qty
    /// OUT, TRANSFER    on_hand −= qty   (fails when available < qty)
    /// ADJUSTMENT       on_hand  = qty   (counted value, qty ≥ 0)
    /// ```
    pub fn apply_movement(
        &mut self,
        kind: MovementKind,
        quantity: Quantity,
    ) -> CoreResult<StockChange> {
        match kind {
            MovementKind::Adjustment => validation::validate_non_negative_quantity(quantity)?,
            _ => validation::validate_quantity(quantity)?,
        }

        let before = self.quantity_on_hand;
        let after = match kind {
            MovementKind::In | MovementKind::Return => before + quantity,
            MovementKind::Out | MovementKind::Transfer => {
                self.ensure_available(quantity)?;
                before - quantity
            }
            MovementKind::Adjustment => quantity,
        };

        self.quantity_on_hand = after;
        Ok(StockChange { kind, before, after })
    }
}

// =============================================================================
// New Product
// =============================================================================

/// Input for registering a product stock record.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub reorder_threshold: Quantity,
    pub max_threshold: Option<Quantity>,
    pub average_cost: Money,
    pub sale_price: Money,
    pub tax_rate: Percentage,
    /// Seeded on-hand quantity; recorded as an `IN` movement when non-zero.
    pub initial_quantity: Quantity,
}

impl NewProduct {
    /// Checks every field before anything is written.
    pub fn validate(&self) -> CoreResult<()> {
        validation::validate_sku(&self.sku)?;
        validation::validate_product_name(&self.name)?;
        validation::validate_non_negative_quantity(self.reorder_threshold)?;
        validation::validate_non_negative_quantity(self.initial_quantity)?;
        if let Some(max) = self.max_threshold {
            if max < self.reorder_threshold {
                return Err(ValidationError::OutOfRange {
                    field: "max_threshold".to_string(),
                    min: self.reorder_threshold.milli(),
                    max: i64::MAX,
                }
                .into());
            }
        }
        validation::validate_non_negative_money("average_cost", self.average_cost)?;
        validation::validate_non_negative_money("sale_price", self.sale_price)?;
        validation::validate_percentage("tax_rate", self.tax_rate)?;
        Ok(())
    }

    /// Builds the stock record with zero on-hand; the seeded quantity is
    /// applied afterwards as an `IN` movement so it is audited.
    pub fn into_product(self, at: DateTime<Utc>) -> Product {
        Product {
            id: Uuid::new_v4().to_string(),
            sku: self.sku.trim().to_string(),
            name: self.name.trim().to_string(),
            quantity_on_hand: Quantity::zero(),
            quantity_reserved: Quantity::zero(),
            reorder_threshold: self.reorder_threshold,
            max_threshold: self.max_threshold,
            average_cost: self.average_cost,
            sale_price: self.sale_price,
            tax_rate: self.tax_rate,
            is_active: true,
            created_at: at,
            updated_at: at,
        }
    }
}

// =============================================================================
// Reservation
// =============================================================================

/// A hold on stock taken by [`Product::reserve`].
///
/// Not `Clone`: a reservation is released or converted exactly once, which
/// makes a double release a type error rather than a negative counter.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reservation must be released or converted into a decrement"]
pub struct Reservation {
    product_id: String,
    quantity: Quantity,
}

impl Reservation {
    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// Consumes the handle, yielding what must be released.
    pub fn into_parts(self) -> (String, Quantity) {
        (self.product_id, self.quantity)
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// Immutable audit row for a permanent on-hand change. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub kind: MovementKind,
    /// Signed on-hand delta.
    pub quantity: Quantity,
    pub quantity_before: Quantity,
    pub quantity_after: Quantity,
    /// Cost snapshot at the time of the movement.
    pub unit_cost: Money,
    /// Sale price snapshot at the time of the movement.
    pub unit_price: Money,
    pub reason: String,
    pub acting_user_id: String,
    /// Sale id (or other document) that caused the movement, if any.
    pub reference_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// Snapshots `product` after `change` was applied to it.
    pub fn record(
        product: &Product,
        change: StockChange,
        reason: impl Into<String>,
        acting_user_id: impl Into<String>,
        reference_id: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        StockMovement {
            id: Uuid::new_v4().to_string(),
            product_id: product.id.clone(),
            kind: change.kind,
            quantity: change.delta(),
            quantity_before: change.before,
            quantity_after: change.after,
            unit_cost: product.average_cost,
            unit_price: product.sale_price,
            reason: reason.into(),
            acting_user_id: acting_user_id.into(),
            reference_id,
            created_at: at,
        }
    }
}

// =============================================================================
// Valuation
// =============================================================================

/// Aggregate stock value for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockValuation {
    pub product_count: i64,
    pub total_quantity: Quantity,
    /// Σ on_hand × average_cost
    pub cost_value: Money,
    /// Σ on_hand × sale_price
    pub retail_value: Money,
}

impl StockValuation {
    /// Values each product (rounded to the cent) and sums the results.
    ///
    /// ## Errors
    /// `AmountOutOfRange` if either value leaves the i64 cent range.
    pub fn of<'a>(products: impl IntoIterator<Item = &'a Product>) -> CoreResult<Self> {
        products
            .into_iter()
            .try_fold(StockValuation::default(), |mut acc, product| -> CoreResult<Self> {
                let on_hand = product.quantity_on_hand;
                let cost = product.average_cost.times(on_hand);
                let retail = product.sale_price.times(on_hand);

                acc.product_count += 1;
                acc.total_quantity += on_hand;
                acc.cost_value = validation::amount_in_range(
                    "cost_value",
                    cost.and_then(|c| acc.cost_value.checked_add(c)),
                )?;
                acc.retail_value = validation::amount_in_range(
                    "retail_value",
                    retail.and_then(|r| acc.retail_value.checked_add(r)),
                )?;
                Ok(acc)
            })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(on_hand: i64, reorder: i64, max: Option<i64>) -> Product {
        let now = Utc::now();
        Product {
            id: "p-1".to_string(),
            sku: "COKE-330".to_string(),
            name: "Coca-Cola 330ml".to_string(),
            quantity_on_hand: Quantity::from_units(on_hand),
            quantity_reserved: Quantity::zero(),
            reorder_threshold: Quantity::from_units(reorder),
            max_threshold: max.map(Quantity::from_units),
            average_cost: Money::from_cents(150),
            sale_price: Money::from_cents(250),
            tax_rate: Percentage::from_percent(16),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_alert_state_order() {
        let reorder = Quantity::from_units(10);
        let max = Some(Quantity::from_units(5));

        // Exhaustion wins over everything, including a silly max threshold
        assert_eq!(AlertState::derive(Quantity::zero(), reorder, max), AlertState::Exhausted);
        assert_eq!(
            AlertState::derive(Quantity::from_units(-2), reorder, None),
            AlertState::Exhausted
        );
        // 3 ≤ 0.3 × 10 → critical, even though 3 < max is irrelevant
        assert_eq!(AlertState::derive(Quantity::from_units(3), reorder, max), AlertState::Critical);
        // 7 > 5 (max) but ≤ reorder → low wins over overstock
        assert_eq!(AlertState::derive(Quantity::from_units(7), reorder, max), AlertState::Low);
        assert_eq!(
            AlertState::derive(Quantity::from_units(11), reorder, Some(Quantity::from_units(20))),
            AlertState::Normal
        );
        assert_eq!(
            AlertState::derive(Quantity::from_units(21), reorder, Some(Quantity::from_units(20))),
            AlertState::Overstocked
        );
        assert_eq!(
            AlertState::derive(Quantity::from_units(500), reorder, None),
            AlertState::Normal
        );
    }

    #[test]
    fn test_out_then_exhausted() {
        let mut p = product(10, 5, None);

        let change = p.apply_movement(MovementKind::Out, Quantity::from_units(6)).unwrap();
        assert_eq!(change.delta(), Quantity::from_units(-6));
        assert_eq!(p.quantity_on_hand, Quantity::from_units(4));
        assert_eq!(p.alert_state(), AlertState::Low);

        p.apply_movement(MovementKind::Out, Quantity::from_units(4)).unwrap();
        assert_eq!(p.quantity_on_hand, Quantity::zero());
        assert_eq!(p.alert_state(), AlertState::Exhausted);
    }

    #[test]
    fn test_out_respects_reservations() {
        let mut p = product(10, 2, None);
        let _hold = p.reserve(Quantity::from_units(8)).unwrap();

        let err = p.apply_movement(MovementKind::Out, Quantity::from_units(3)).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { .. }));
        assert_eq!(p.quantity_on_hand, Quantity::from_units(10));
    }

    #[test]
    fn test_adjustment_sets_counted_value() {
        let mut p = product(10, 2, None);
        let change = p.apply_movement(MovementKind::Adjustment, Quantity::from_units(7)).unwrap();
        assert_eq!(change.before, Quantity::from_units(10));
        assert_eq!(change.after, Quantity::from_units(7));
        assert_eq!(change.delta(), Quantity::from_units(-3));

        assert!(p.apply_movement(MovementKind::Adjustment, Quantity::zero()).is_ok());
        assert!(p.apply_movement(MovementKind::In, Quantity::zero()).is_err());
    }

    #[test]
    fn test_reserve_release_roundtrip() {
        let mut p = product(10, 2, None);
        let reserved_before = p.quantity_reserved;

        let hold = p.reserve(Quantity::from_units(4)).unwrap();
        assert_eq!(p.available(), Quantity::from_units(6));
        assert_eq!(p.available(), p.quantity_on_hand - p.quantity_reserved);

        let (_, qty) = hold.into_parts();
        p.release(qty).unwrap();
        assert_eq!(p.quantity_reserved, reserved_before);
        assert_eq!(p.quantity_on_hand, Quantity::from_units(10));
    }

    #[test]
    fn test_reserve_insufficient() {
        let mut p = product(3, 2, None);
        let err = p.reserve(Quantity::from_units(4)).unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientStock {
                product_id: "p-1".to_string(),
                available: Quantity::from_units(3),
                requested: Quantity::from_units(4),
            }
        );
        assert_eq!(p.quantity_reserved, Quantity::zero());
    }

    #[test]
    fn test_over_release_is_reported() {
        let mut p = product(10, 2, None);
        let _hold = p.reserve(Quantity::from_units(2)).unwrap();
        let err = p.release(Quantity::from_units(3)).unwrap_err();
        assert!(matches!(err, CoreError::ReleaseExceedsReserved { .. }));
        assert_eq!(p.quantity_reserved, Quantity::from_units(2));
    }

    #[test]
    fn test_inactive_cannot_reserve() {
        let mut p = product(10, 2, None);
        p.is_active = false;
        assert_eq!(
            p.reserve(Quantity::from_units(1)).unwrap_err(),
            CoreError::ProductInactive("p-1".to_string())
        );
    }

    #[test]
    fn test_valuation() {
        let a = product(10, 2, None);
        let mut b = product(3, 2, None);
        b.quantity_on_hand = Quantity::from_milli(1500);

        let v = StockValuation::of([&a, &b]).unwrap();
        assert_eq!(v.product_count, 2);
        assert_eq!(v.total_quantity, Quantity::from_milli(11_500));
        // 10 × 1.50 + 1.5 × 1.50 = 15.00 + 2.25
        assert_eq!(v.cost_value, Money::from_cents(1725));
        // 10 × 2.50 + 1.5 × 2.50 = 25.00 + 3.75
        assert_eq!(v.retail_value, Money::from_cents(2875));
    }

    #[test]
    fn test_valuation_overflow_is_an_error() {
        let mut p = product(4, 2, None);
        p.sale_price = Money::from_cents(1 << 62);
        assert!(matches!(
            StockValuation::of([&p]),
            Err(CoreError::Validation(ValidationError::AmountOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_movement_snapshot() {
        let mut p = product(10, 2, None);
        let change = p.apply_movement(MovementKind::In, Quantity::from_units(5)).unwrap();
        let m = StockMovement::record(&p, change, "delivery", "u-1", None, Utc::now());
        assert_eq!(m.kind, MovementKind::In);
        assert_eq!(m.quantity, Quantity::from_units(5));
        assert_eq!(m.quantity_before, Quantity::from_units(10));
        assert_eq!(m.quantity_after, Quantity::from_units(15));
        assert_eq!(m.unit_cost, Money::from_cents(150));
    }

    #[test]
    fn test_new_product_validation() {
        let mut input = NewProduct {
            sku: "COKE-330".to_string(),
            name: "Coca-Cola".to_string(),
            reorder_threshold: Quantity::from_units(10),
            max_threshold: Some(Quantity::from_units(5)),
            average_cost: Money::from_cents(100),
            sale_price: Money::from_cents(200),
            tax_rate: Percentage::from_percent(16),
            initial_quantity: Quantity::from_units(20),
        };
        assert!(input.validate().is_err());

        input.max_threshold = Some(Quantity::from_units(50));
        assert!(input.validate().is_ok());

        let p = input.into_product(Utc::now());
        assert!(p.is_active);
        assert_eq!(p.quantity_on_hand, Quantity::zero());
    }

    #[test]
    fn test_alert_state_wire_format() {
        assert_eq!(
            serde_json::to_string(&AlertState::Overstocked).unwrap(),
            "\"OVERSTOCKED\""
        );
        assert_eq!(serde_json::to_string(&MovementKind::In).unwrap(), "\"IN\"");
    }
}
