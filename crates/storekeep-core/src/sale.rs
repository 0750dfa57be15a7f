//! # Sale Module
//!
//! Sale, sale line, and the arithmetic that turns a basket into totals.
//!
//! ## Line Arithmetic
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every step rounds to 2 decimals, half up, before the next one uses it │
//! │                                                                         │
//! │  gross     = qty × unit_price                                           │
//! │  discount  = unit_price × discount% / 100   if discount% > 0            │
//! │            = unit_discount                  otherwise                   │
//! │  subtotal  = gross − discount                                           │
//! │  tax       = subtotal × tax% / 100                                      │
//! │  total     = subtotal + tax                                             │
//! │                                                                         │
//! │  The discount is taken once per line, computed on the unit price.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Order Totals
//! ```text
//!   subtotal        = Σ gross
//!   discount_total  = Σ discount
//!   tax_total       = Σ tax
//!   grand_total     = subtotal − discount_total + tax_total   (= Σ line total)
//!   change          = cash_tendered − grand_total
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, Percentage};
use crate::quantity::Quantity;
use crate::stock::Product;
use crate::validation::{self, amount_in_range};

// =============================================================================
// Sale State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum SaleState {
    Pending,
    Completed,
    Voided,
    Returned,
    Cancelled,
}

impl SaleState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SaleState::Pending => "PENDING",
            SaleState::Completed => "COMPLETED",
            SaleState::Voided => "VOIDED",
            SaleState::Returned => "RETURNED",
            SaleState::Cancelled => "CANCELLED",
        }
    }

    pub const fn is_voidable(&self) -> bool {
        matches!(self, SaleState::Pending | SaleState::Completed)
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            SaleState::Voided | SaleState::Returned | SaleState::Cancelled
        )
    }
}

impl fmt::Display for SaleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum PaymentMethod {
    /// Physical cash in the drawer.
    Cash,
    /// Card on an external terminal.
    Card,
    /// Bank transfer.
    Transfer,
}

// =============================================================================
// Line Arithmetic
// =============================================================================

/// Amounts of one sale line, each rounded to the cent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    /// qty × unit price
    pub gross: Money,
    pub discount: Money,
    /// gross − discount
    pub subtotal: Money,
    pub tax: Money,
    /// subtotal + tax
    pub total: Money,
}

impl LineAmounts {
    /// ## Errors
    /// `AmountOutOfRange` when any step leaves the i64 cent range.
    pub fn compute(
        quantity: Quantity,
        unit_price: Money,
        discount_rate: Percentage,
        unit_discount: Money,
        tax_rate: Percentage,
    ) -> CoreResult<Self> {
        let gross = amount_in_range("gross", unit_price.times(quantity))?;
        let discount = if discount_rate.is_zero() {
            unit_discount
        } else {
            amount_in_range("discount", unit_price.percent_of(discount_rate))?
        };
        let subtotal = amount_in_range("subtotal", gross.checked_sub(discount))?;
        let tax = amount_in_range("tax", subtotal.percent_of(tax_rate))?;
        let total = amount_in_range("total", subtotal.checked_add(tax))?;

        Ok(LineAmounts {
            gross,
            discount,
            subtotal,
            tax,
            total,
        })
    }
}

/// Order-level totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub discount_total: Money,
    pub tax_total: Money,
    pub grand_total: Money,
}

impl SaleTotals {
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a LineAmounts>) -> CoreResult<Self> {
        let mut totals = SaleTotals::default();
        for line in lines {
            totals.subtotal = amount_in_range("subtotal", totals.subtotal.checked_add(line.gross))?;
            totals.discount_total = amount_in_range(
                "discount_total",
                totals.discount_total.checked_add(line.discount),
            )?;
            totals.tax_total =
                amount_in_range("tax_total", totals.tax_total.checked_add(line.tax))?;
        }
        let grand = totals
            .subtotal
            .checked_sub(totals.discount_total)
            .and_then(|net| net.checked_add(totals.tax_total));
        totals.grand_total = amount_in_range("grand_total", grand)?;
        Ok(totals)
    }

    /// Change owed for `tendered`, if cash was tendered.
    ///
    /// ## Errors
    /// `InvalidPaymentAmount` when the tender does not cover the grand total.
    pub fn change_for(&self, tendered: Option<Money>) -> CoreResult<Option<Money>> {
        let Some(tendered) = tendered else {
            return Ok(None);
        };
        if tendered < self.grand_total {
            return Err(CoreError::InvalidPaymentAmount {
                reason: format!(
                    "tendered {} does not cover total {}",
                    tendered, self.grand_total
                ),
            });
        }
        let change = amount_in_range("change", tendered.checked_sub(self.grand_total))?;
        Ok(Some(change))
    }
}

// =============================================================================
// Line Request
// =============================================================================

/// One requested line of a new sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLineRequest {
    pub product_id: String,
    pub quantity: Quantity,
    /// Overrides the product's sale price.
    pub unit_price: Option<Money>,
    /// Takes precedence over `unit_discount` when non-zero.
    #[serde(default)]
    pub discount_rate: Percentage,
    #[serde(default)]
    pub unit_discount: Money,
    /// Overrides the product's tax rate.
    pub tax_rate: Option<Percentage>,
}

impl SaleLineRequest {
    /// A plain line at the product's own price and tax.
    pub fn new(product_id: impl Into<String>, quantity: Quantity) -> Self {
        SaleLineRequest {
            product_id: product_id.into(),
            quantity,
            unit_price: None,
            discount_rate: Percentage::zero(),
            unit_discount: Money::zero(),
            tax_rate: None,
        }
    }

    /// Input checks that need no product.
    pub fn validate(&self) -> CoreResult<()> {
        validation::validate_id("product_id", &self.product_id)?;
        validation::validate_quantity(self.quantity)?;
        validation::validate_percentage("discount_rate", self.discount_rate)?;
        validation::validate_non_negative_money("unit_discount", self.unit_discount)?;
        if let Some(price) = self.unit_price {
            validation::validate_non_negative_money("unit_price", price)?;
        }
        if let Some(rate) = self.tax_rate {
            validation::validate_percentage("tax_rate", rate)?;
        }
        Ok(())
    }

    /// Prices the line against the product record.
    pub fn amounts_for(&self, product: &Product) -> CoreResult<LineAmounts> {
        let amounts = LineAmounts::compute(
            self.quantity,
            self.unit_price.unwrap_or(product.sale_price),
            self.discount_rate,
            self.unit_discount,
            self.tax_rate.unwrap_or(product.tax_rate),
        )?;
        if amounts.subtotal.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "discount".to_string(),
                min: 0,
                max: amounts.gross.cents(),
            }
            .into());
        }
        Ok(amounts)
    }
}

/// Everything needed to ring up a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    pub customer_id: Option<String>,
    pub cashier_id: String,
    pub till_id: String,
    pub lines: Vec<SaleLineRequest>,
    pub payment_method: PaymentMethod,
    pub cash_tendered: Option<Money>,
}

impl NewSale {
    pub fn validate(&self) -> CoreResult<()> {
        validation::validate_id("cashier_id", &self.cashier_id)?;
        validation::validate_id("till_id", &self.till_id)?;
        validation::validate_line_count(self.lines.len())?;
        for line in &self.lines {
            line.validate()?;
        }
        if let Some(tendered) = self.cash_tendered {
            validation::validate_non_negative_money("cash_tendered", tendered)?;
        }
        Ok(())
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A sale transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// Formatted, unique invoice number (e.g. `INV-000042`).
    pub invoice_number: String,
    /// Raw counter value behind `invoice_number`.
    pub sequence_number: i64,
    pub state: SaleState,
    pub customer_id: Option<String>,
    pub cashier_id: String,
    pub till_id: String,
    pub subtotal: Money,
    pub discount_total: Money,
    pub tax_total: Money,
    pub grand_total: Money,
    pub payment_method: PaymentMethod,
    pub cash_tendered: Option<Money>,
    pub change_due: Option<Money>,
    /// Calendar day the sale counts towards for till closings.
    #[ts(as = "String")]
    pub business_date: NaiveDate,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
}

impl Sale {
    /// Marks the sale `VOIDED`.
    ///
    /// ## Errors
    /// `NotVoidable` unless the sale is `PENDING` or `COMPLETED`.
    pub fn void(&mut self, reason: &str, at: DateTime<Utc>) -> CoreResult<()> {
        if !self.state.is_voidable() {
            return Err(CoreError::NotVoidable {
                sale_id: self.id.clone(),
                state: self.state.to_string(),
            });
        }
        validation::validate_reason("reason", reason)?;

        self.state = SaleState::Voided;
        self.voided_at = Some(at);
        self.void_reason = Some(reason.trim().to_string());
        Ok(())
    }
}

// =============================================================================
// Sale Line
// =============================================================================

/// A line of a sale.
/// Uses the snapshot pattern: sku and name are frozen at time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleLine {
    pub id: String,
    pub sale_id: String,
    pub line_number: i64,
    pub product_id: String,
    pub sku_snapshot: String,
    pub name_snapshot: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub discount_rate: Percentage,
    pub discount_amount: Money,
    pub tax_rate: Percentage,
    pub tax_amount: Money,
    /// qty × unit price − discount
    pub line_subtotal: Money,
    /// subtotal + tax
    pub line_total: Money,
}

impl SaleLine {
    pub fn build(
        sale_id: &str,
        line_number: i64,
        product: &Product,
        request: &SaleLineRequest,
        amounts: &LineAmounts,
    ) -> Self {
        SaleLine {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            line_number,
            product_id: product.id.clone(),
            sku_snapshot: product.sku.clone(),
            name_snapshot: product.name.clone(),
            quantity: request.quantity,
            unit_price: request.unit_price.unwrap_or(product.sale_price),
            discount_rate: request.discount_rate,
            discount_amount: amounts.discount,
            tax_rate: request.tax_rate.unwrap_or(product.tax_rate),
            tax_amount: amounts.tax,
            line_subtotal: amounts.subtotal,
            line_total: amounts.total,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
