//! # Connection Pool
//!
//! Opens the SQLite store and hands out the services that work on it.
//!
//! ## Readers and Writers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database::new(DbConfig)                                                │
//! │    ├── open file (WAL, foreign keys, busy_timeout)                     │
//! │    ├── build SqlitePool (max_connections)                              │
//! │    └── apply embedded migrations                                        │
//! │                                                                         │
//! │  conn A  ── read ────────────────────────────►  any number at once     │
//! │  conn B  ── BEGIN; UPDATE … (holds write lock) … COMMIT                 │
//! │  conn C  ── BEGIN; UPDATE …  waits ──────────►  runs after B commits    │
//! │                              (up to busy_timeout, then fails with      │
//! │                               "database is locked")                    │
//! │                                                                         │
//! │  db.inventory()  db.tills()  db.sales()  share one pool                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use storekeep_core::InvoiceFormat;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::service::{InventoryLedger, SaleOrchestrator, TillManager};

const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Where the store lives and how the pool behaves.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/storekeep/store.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,
    /// Upper bound on pooled connections (default 5).
    pub max_connections: u32,
    /// Connections opened eagerly (default 1).
    pub min_connections: u32,
    /// How long a caller waits for a free pooled connection (default 30s).
    pub acquire_timeout: Duration,
    /// Idle connections are closed after this long (default 10 min).
    pub idle_timeout: Duration,
    /// How long a writer waits on the SQLite write lock (default 5s).
    pub busy_timeout: Duration,
    pub run_migrations: bool,
}

impl DbConfig {
    /// File-backed store at `path`, created on first connect.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Private in-memory store for tests.
    ///
    /// An in-memory database exists only inside the connection that created
    /// it, so the pool holds exactly one connection and never lets it idle out.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(3600),
            ..DbConfig::new(IN_MEMORY)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    fn is_in_memory(&self) -> bool {
        self.database_path == Path::new(IN_MEMORY)
    }

    /// Per-connection settings: WAL, NORMAL sync, foreign keys (off by
    /// default in SQLite) and the write-lock wait.
    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let url = if self.is_in_memory() {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", self.database_path.display())
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout)
            .create_if_missing(true);

        Ok(options)
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to an open store. Clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    invoice_format: InvoiceFormat,
}

impl Database {
    /// Opens the store, building the pool and migrating unless disabled.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening store");

        let options = config.connect_options()?;
        debug!(busy_timeout = ?config.busy_timeout, "Connection options ready");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(max_connections = config.max_connections, "Pool ready");

        let db = Database {
            pool,
            invoice_format: InvoiceFormat::default(),
        };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    /// Uses `format` for invoice numbers issued through [`Database::sales`].
    pub fn with_invoice_format(mut self, format: InvoiceFormat) -> Self {
        self.invoice_format = format;
        self
    }

    /// Applies pending migrations. Safe to call repeatedly.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Raw pool access for read-only queries the services don't cover.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn inventory(&self) -> InventoryLedger {
        InventoryLedger::new(self.pool.clone())
    }

    pub fn tills(&self) -> TillManager {
        TillManager::new(self.pool.clone())
    }

    pub fn sales(&self) -> SaleOrchestrator {
        SaleOrchestrator::new(self.pool.clone(), self.invoice_format.clone())
    }

    pub async fn close(&self) {
        info!("Closing store");
        self.pool.close().await;
    }

    /// `true` if a trivial query round-trips.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('products', 'stock_movements', 'tills', 'till_closings', 'sales', 'sale_lines', 'sequences')",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(tables, 7);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/store.db")
            .max_connections(10)
            .min_connections(2)
            .busy_timeout(Duration::from_secs(1));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert!(!config.is_in_memory());

        let memory = DbConfig::in_memory();
        assert!(memory.is_in_memory());
        assert_eq!(memory.max_connections, 1);
        assert_eq!(memory.busy_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_foreign_keys_are_enforced() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let result = sqlx::query(
            "INSERT INTO sale_lines (id, sale_id, line_number, product_id, sku_snapshot, \
             name_snapshot, quantity, unit_price, discount_rate, discount_amount, tax_rate, \
             tax_amount, line_subtotal, line_total) \
             VALUES ('l-1', 'no-such-sale', 1, 'no-such-product', 'X', 'X', 1000, 100, 0, 0, 0, 0, 100, 100)",
        )
        .execute(db.pool())
        .await;

        let err = DbError::from(result.unwrap_err());
        assert!(matches!(err, DbError::ForeignKeyViolation(_)));
    }

    #[tokio::test]
    async fn test_on_disk_store_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let db = Database::new(DbConfig::new(&path).run_migrations(false)).await.unwrap();

        assert!(db.health_check().await);
        assert!(path.exists());
        db.close().await;
    }
}
