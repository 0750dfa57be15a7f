//! # Store Configuration
//!
//! Settings for a storekeep deployment, loaded once at startup.
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`STOREKEEP_*`)
//! 2. Defaults (this file)
//!
//! Malformed numeric values are ignored with a warning and the default
//! stays in effect.

use std::path::PathBuf;
use storekeep_core::InvoiceFormat;
use tracing::warn;

use crate::error::DbResult;
use crate::pool::{Database, DbConfig};

/// Default database file, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = "./storekeep.db";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db: DbConfig,
    pub invoice: InvoiceFormat,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            db: DbConfig::new(DEFAULT_DB_PATH),
            invoice: InvoiceFormat::default(),
        }
    }
}

impl StoreConfig {
    /// Builds the configuration from process environment variables.
    ///
    /// ## Environment Variables
    /// - `STOREKEEP_DB_PATH`: database file
    /// - `STOREKEEP_DB_MAX_CONNECTIONS`: pool size
    /// - `STOREKEEP_INVOICE_PREFIX`: e.g. `"S1-"`
    /// - `STOREKEEP_INVOICE_WIDTH`: zero-padded digit count
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StoreConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = StoreConfig::default();

        if let Some(path) = lookup("STOREKEEP_DB_PATH") {
            config.db.database_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup("STOREKEEP_DB_MAX_CONNECTIONS") {
            match raw.parse::<u32>() {
                Ok(max) if max > 0 => config.db.max_connections = max,
                _ => warn!(value = %raw, "Ignoring invalid STOREKEEP_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(prefix) = lookup("STOREKEEP_INVOICE_PREFIX") {
            config.invoice.prefix = prefix;
        }

        if let Some(raw) = lookup("STOREKEEP_INVOICE_WIDTH") {
            match raw.parse::<usize>() {
                Ok(width) => config.invoice.width = width,
                Err(_) => warn!(value = %raw, "Ignoring invalid STOREKEEP_INVOICE_WIDTH"),
            }
        }

        config
    }

    /// Opens the database this configuration points at.
    pub async fn connect(&self) -> DbResult<Database> {
        let db = Database::new(self.db.clone()).await?;
        Ok(db.with_invoice_format(self.invoice.clone()))
    }
}
