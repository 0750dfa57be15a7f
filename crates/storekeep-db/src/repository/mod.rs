//! # Repository Module
//!
//! SQL for each table, kept out of the services.
//!
//! ## Two Kinds of Methods
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  &self methods            read-only, run on the pool                    │
//! │  ─────────────            (reporting readers, lookups)                  │
//! │                                                                         │
//! │  associated fns taking    run inside a caller's transaction             │
//! │  &mut SqliteConnection    (every mutation, and reads that feed one)     │
//! │                                                                         │
//! │  lock(conn, id, ..)       UPDATE … RETURNING on the row: takes the     │
//! │                           SQLite write lock first, then returns the    │
//! │                           current row. Nothing can change it until     │
//! │                           the transaction ends.                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`] - stock records and movements
//! - [`TillRepository`] - tills and closing records
//! - [`SaleRepository`] - sales, lines, invoice counter, day aggregates

pub mod product;
pub mod sale;
pub mod till;

pub use product::ProductRepository;
pub use sale::SaleRepository;
pub use till::TillRepository;
