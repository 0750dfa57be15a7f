//! # Product Repository
//!
//! Stock records and the append-only movement trail.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use storekeep_core::{Product, StockMovement};
use tracing::debug;

use crate::error::DbResult;

const PRODUCT_COLUMNS: &str = "id, sku, name, quantity_on_hand, quantity_reserved, \
    reorder_threshold, max_threshold, average_cost, sale_price, tax_rate, is_active, \
    created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, product_id, kind, quantity, quantity_before, quantity_after, \
    unit_cost, unit_price, reason, acting_user_id, reference_id, created_at";

/// Repository for product stock records.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        debug!(id = %id, "Fetching product");

        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Active products ordered by SKU.
    pub async fn list_active(&self) -> DbResult<Vec<Product>> {
        let sql =
            format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 ORDER BY sku");
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Loaded active products");
        Ok(products)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Movements of one product, oldest first.
    pub async fn movements_for(&self, product_id: &str) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE product_id = ? ORDER BY created_at, rowid"
        );
        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// Movements caused by one business document (e.g. a sale id).
    pub async fn movements_by_reference(&self, reference_id: &str) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE reference_id = ? ORDER BY created_at, rowid"
        );
        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(reference_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    // =========================================================================
    // Unit-of-work operations
    // =========================================================================

    /// Claims the product row for the current transaction and returns it.
    pub async fn lock(
        conn: &mut SqliteConnection,
        id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<Option<Product>> {
        debug!(id = %id, "Locking product");

        let sql = format!(
            "UPDATE products SET updated_at = ? WHERE id = ? RETURNING {PRODUCT_COLUMNS}"
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(at)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(product)
    }

    /// The product holding `sku`, read inside the caller's transaction.
    pub async fn find_by_sku(
        conn: &mut SqliteConnection,
        sku: &str,
    ) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(sku.trim())
            .fetch_optional(&mut *conn)
            .await?;

        Ok(product)
    }

    pub async fn insert(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, quantity_on_hand, quantity_reserved,
                reorder_threshold, max_threshold, average_cost, sale_price, tax_rate,
                is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.quantity_on_hand)
        .bind(product.quantity_reserved)
        .bind(product.reorder_threshold)
        .bind(product.max_threshold)
        .bind(product.average_cost)
        .bind(product.sale_price)
        .bind(product.tax_rate)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Writes back the mutable fields of a locked product.
    pub async fn save(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
        debug!(
            id = %product.id,
            on_hand = %product.quantity_on_hand,
            reserved = %product.quantity_reserved,
            "Saving product"
        );

        sqlx::query(
            r#"
            UPDATE products
            SET quantity_on_hand = ?, quantity_reserved = ?, is_active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(product.quantity_on_hand)
        .bind(product.quantity_reserved)
        .bind(product.is_active)
        .bind(product.updated_at)
        .bind(&product.id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_movement(
        conn: &mut SqliteConnection,
        movement: &StockMovement,
    ) -> DbResult<()> {
        debug!(
            product_id = %movement.product_id,
            kind = ?movement.kind,
            quantity = %movement.quantity,
            "Recording stock movement"
        );

        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, product_id, kind, quantity, quantity_before, quantity_after,
                unit_cost, unit_price, reason, acting_user_id, reference_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.product_id)
        .bind(movement.kind)
        .bind(movement.quantity)
        .bind(movement.quantity_before)
        .bind(movement.quantity_after)
        .bind(movement.unit_cost)
        .bind(movement.unit_price)
        .bind(&movement.reason)
        .bind(&movement.acting_user_id)
        .bind(&movement.reference_id)
        .bind(movement.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
