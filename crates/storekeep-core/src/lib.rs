//! # storekeep-core: Pure Business Logic for the Back-Office Core
//!
//! Everything in the stock/cash transactional core that can be decided
//! without touching storage lives here as plain data and pure functions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storekeep Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Callers (HTTP handlers, CLI, reporting readers)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │     storekeep-db services (transactions, locking, SQL)          │   │
//! │  │     InventoryLedger ─ TillManager ─ SaleOrchestrator            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ pure calls                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ storekeep-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  money  │ │  stock  │ │  till   │ │  sale   │ │invoice  │  │   │
//! │  │   │Quantity │ │ Alert   │ │ Closing │ │ Line    │ │ format  │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - `Money` (scale 2) and `Percentage` (basis points), round-half-up
//! - [`quantity`] - `Quantity` (scale 3)
//! - [`stock`] - product stock record, alert state, movements, reservations
//! - [`till`] - till and closing-record state machines
//! - [`sale`] - sale, sale lines, line and order arithmetic
//! - [`invoice`] - invoice number formatting
//! - [`error`] - domain error types
//! - [`validation`] - input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use storekeep_core::money::{Money, Percentage};
//! use storekeep_core::quantity::Quantity;
//! use storekeep_core::sale::LineAmounts;
//!
//! let amounts = LineAmounts::compute(
//!     Quantity::from_units(3),
//!     Money::from_cents(1000),
//!     Percentage::from_bps(1000), // 10% of the unit price
//!     Money::zero(),
//!     Percentage::from_bps(1600), // 16% tax
//! )
//! .unwrap();
//!
//! assert_eq!(amounts.discount.cents(), 100);
//! assert_eq!(amounts.subtotal.cents(), 2900);
//! assert_eq!(amounts.tax.cents(), 464);
//! assert_eq!(amounts.total.cents(), 3364);
//! ```

pub mod error;
pub mod invoice;
pub mod money;
pub mod quantity;
pub mod sale;
pub mod stock;
pub mod till;
pub mod validation;

pub use error::{CoreError, CoreResult, ValidationError};
pub use invoice::InvoiceFormat;
pub use money::{Money, Percentage};
pub use quantity::Quantity;
pub use sale::{
    LineAmounts, NewSale, PaymentMethod, Sale, SaleLine, SaleLineRequest, SaleState, SaleTotals,
};
pub use stock::{
    AlertState, MovementKind, NewProduct, Product, Reservation, StockChange, StockMovement,
    StockValuation,
};
pub use till::{ClosingDraft, ClosingState, PaymentTotal, Till, TillClosing, TillState};

/// Maximum number of lines in a single sale.
///
/// Guards against runaway requests; a real basket rarely has more than a few
/// dozen distinct products.
pub const MAX_SALE_LINES: usize = 100;

/// Stock is `CRITICAL` when on-hand is at or below this fraction of the
/// reorder threshold, expressed as numerator / denominator (0.3).
pub const CRITICAL_RATIO: (i64, i64) = (3, 10);

/// Maximum length of free-text reasons and notes.
pub const MAX_REASON_LEN: usize = 500;
