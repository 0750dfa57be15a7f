//! # storekeep-db: Persistence and Transactional Services
//!
//! SQLite storage for the storekeep inventory, till and sale core, and the
//! three services that own every unit of work against it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storekeep Data Flow                              │
//! │                                                                         │
//! │  Caller (HTTP handler, desktop command, batch job)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  storekeep-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Services    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │               │    │               │    │  (embedded)  │  │   │
//! │  │   │ Inventory     │───►│ ProductRepo   │    │              │  │   │
//! │  │   │ Ledger        │    │ TillRepo      │    │ 001_initial  │  │   │
//! │  │   │ TillManager   │    │ SaleRepo      │    │ _schema.sql  │  │   │
//! │  │   │ SaleOrch.     │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │           │ one transaction per operation                      │   │
//! │  └───────────┼─────────────────────────────────────────────────────┘   │
//! │              ▼                                                          │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 SQLite Database (WAL)                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Environment-driven store settings
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and service error types
//! - [`repository`] - SQL per table
//! - [`service`] - `InventoryLedger`, `TillManager`, `SaleOrchestrator`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storekeep_db::StoreConfig;
//!
//! let db = StoreConfig::from_env().connect().await?;
//!
//! let till = db.tills().open(&till_id, "cashier-1", None).await?;
//! let sale = db.sales().create_sale(request).await?;
//! let closing = db.tills().close(&till.id, "cashier-1", None, None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::StoreConfig;
pub use error::{DbError, DbResult, ServiceError, ServiceResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::{ProductRepository, SaleRepository, TillRepository};

pub use service::{InventoryLedger, SaleOrchestrator, TillManager};
