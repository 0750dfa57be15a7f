//! # Services
//!
//! The three components of the transactional core. Each public operation is
//! one unit of work: it opens a transaction, claims the rows it mutates,
//! applies the pure rules from `storekeep-core`, writes back, and commits.
//! An early return drops the transaction, which rolls everything back.
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   TillManager    │     │ InventoryLedger  │
//! │  open / close /  │     │ reserve / release│
//! │  reconcile       │     │ adjust / alerts  │
//! └────────▲─────────┘     └────────▲─────────┘
//!          │ till row               │ product rows (same transaction)
//!          └──────────┬─────────────┘
//!            ┌────────┴─────────┐
//!            │ SaleOrchestrator │
//!            │ create / void    │
//!            └──────────────────┘
//! ```

pub mod inventory;
pub mod sale;
pub mod till;

pub use inventory::InventoryLedger;
pub use sale::SaleOrchestrator;
pub use till::TillManager;
