//! # Sale Repository
//!
//! Sales, sale lines, the invoice counter, and the per-day aggregates the
//! till closing reads.
//!
//! ## Invoice Counter
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sequences('invoice')                                                  │
//! │                                                                         │
//! │  UPDATE sequences SET value = value + 1 WHERE name = 'invoice'         │
//! │  RETURNING value                                                        │
//! │                                                                         │
//! │  Runs inside the sale transaction: concurrent sales queue on the       │
//! │  write lock and each sees the previous one's increment. A rolled back  │
//! │  sale rolls back its increment too, so numbers stay gap-free.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use storekeep_core::{Money, PaymentTotal, Sale, SaleLine, SaleState};
use tracing::debug;

use crate::error::{DbError, DbResult};

const SALE_COLUMNS: &str = "id, invoice_number, sequence_number, state, customer_id, cashier_id, \
    till_id, subtotal, discount_total, tax_total, grand_total, payment_method, cash_tendered, \
    change_due, business_date, created_at, completed_at, voided_at, void_reason";

const LINE_COLUMNS: &str = "id, sale_id, line_number, product_id, sku_snapshot, name_snapshot, \
    quantity, unit_price, discount_rate, discount_amount, tax_rate, tax_amount, line_subtotal, \
    line_total";

const INVOICE_SEQUENCE: &str = "invoice";

/// Repository for sales and sale lines.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        debug!(id = %id, "Fetching sale");

        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?");
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    pub async fn get_by_invoice(&self, invoice_number: &str) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE invoice_number = ?");
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(invoice_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    pub async fn get_lines(&self, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let sql = format!(
            "SELECT {LINE_COLUMNS} FROM sale_lines WHERE sale_id = ? ORDER BY line_number"
        );
        let lines = sqlx::query_as::<_, SaleLine>(&sql)
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(lines)
    }

    /// COMPLETED sales of a till on a business date, in invoice order.
    pub async fn completed_for(&self, till_id: &str, date: NaiveDate) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM sales \
             WHERE till_id = ? AND business_date = ? AND state = ? \
             ORDER BY sequence_number"
        );
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(till_id)
            .bind(date)
            .bind(SaleState::Completed)
            .fetch_all(&self.pool)
            .await?;

        Ok(sales)
    }

    /// Current value of the invoice counter (the last number issued).
    pub async fn current_sequence(&self) -> DbResult<i64> {
        let value: i64 = sqlx::query_scalar("SELECT value FROM sequences WHERE name = ?")
            .bind(INVOICE_SEQUENCE)
            .fetch_one(&self.pool)
            .await?;
        Ok(value)
    }

    // =========================================================================
    // Unit-of-work operations
    // =========================================================================

    /// Increments the invoice counter and returns the new value.
    pub async fn next_sequence(conn: &mut SqliteConnection) -> DbResult<i64> {
        let value: Option<i64> = sqlx::query_scalar(
            "UPDATE sequences SET value = value + 1 WHERE name = ? RETURNING value",
        )
        .bind(INVOICE_SEQUENCE)
        .fetch_optional(&mut *conn)
        .await?;

        value.ok_or_else(|| DbError::not_found("Sequence", INVOICE_SEQUENCE))
    }

    /// Claims the sale row for the current transaction and returns it.
    pub async fn lock(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        debug!(id = %id, "Locking sale");

        let sql = format!("UPDATE sales SET state = state WHERE id = ? RETURNING {SALE_COLUMNS}");
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(sale)
    }

    pub async fn lines_on(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let sql = format!(
            "SELECT {LINE_COLUMNS} FROM sale_lines WHERE sale_id = ? ORDER BY line_number"
        );
        let lines = sqlx::query_as::<_, SaleLine>(&sql)
            .bind(sale_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(lines)
    }

    pub async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, invoice_number = %sale.invoice_number, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, invoice_number, sequence_number, state, customer_id, cashier_id, till_id,
                subtotal, discount_total, tax_total, grand_total, payment_method,
                cash_tendered, change_due, business_date, created_at, completed_at,
                voided_at, void_reason
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.invoice_number)
        .bind(sale.sequence_number)
        .bind(sale.state)
        .bind(&sale.customer_id)
        .bind(&sale.cashier_id)
        .bind(&sale.till_id)
        .bind(sale.subtotal)
        .bind(sale.discount_total)
        .bind(sale.tax_total)
        .bind(sale.grand_total)
        .bind(sale.payment_method)
        .bind(sale.cash_tendered)
        .bind(sale.change_due)
        .bind(sale.business_date)
        .bind(sale.created_at)
        .bind(sale.completed_at)
        .bind(sale.voided_at)
        .bind(&sale.void_reason)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_line(conn: &mut SqliteConnection, line: &SaleLine) -> DbResult<()> {
        debug!(sale_id = %line.sale_id, product_id = %line.product_id, "Inserting sale line");

        sqlx::query(
            r#"
            INSERT INTO sale_lines (
                id, sale_id, line_number, product_id, sku_snapshot, name_snapshot, quantity,
                unit_price, discount_rate, discount_amount, tax_rate, tax_amount,
                line_subtotal, line_total
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&line.id)
        .bind(&line.sale_id)
        .bind(line.line_number)
        .bind(&line.product_id)
        .bind(&line.sku_snapshot)
        .bind(&line.name_snapshot)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.discount_rate)
        .bind(line.discount_amount)
        .bind(line.tax_rate)
        .bind(line.tax_amount)
        .bind(line.line_subtotal)
        .bind(line.line_total)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Writes back the state fields of a locked sale.
    pub async fn save_state(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, state = %sale.state, "Saving sale state");

        sqlx::query("UPDATE sales SET state = ?, voided_at = ?, void_reason = ? WHERE id = ?")
            .bind(sale.state)
            .bind(sale.voided_at)
            .bind(&sale.void_reason)
            .bind(&sale.id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Day aggregates (read by till closing)
    // =========================================================================

    /// Σ grand total of COMPLETED sales for the till on `date`.
    pub async fn completed_total_on(
        conn: &mut SqliteConnection,
        till_id: &str,
        date: NaiveDate,
    ) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(grand_total), 0) FROM sales
            WHERE till_id = ? AND business_date = ? AND state = ?
            "#,
        )
        .bind(till_id)
        .bind(date)
        .bind(SaleState::Completed)
        .fetch_one(&mut *conn)
        .await?;

        Ok(Money::from_cents(cents))
    }

    /// COMPLETED sales for the till on `date`, grouped by payment method.
    pub async fn payment_breakdown_on(
        conn: &mut SqliteConnection,
        till_id: &str,
        date: NaiveDate,
    ) -> DbResult<Vec<PaymentTotal>> {
        let totals = sqlx::query_as::<_, PaymentTotal>(
            r#"
            SELECT payment_method AS method,
                   COUNT(*) AS sale_count,
                   COALESCE(SUM(grand_total), 0) AS total
            FROM sales
            WHERE till_id = ? AND business_date = ? AND state = ?
            GROUP BY payment_method
            ORDER BY payment_method
            "#,
        )
        .bind(till_id)
        .bind(date)
        .bind(SaleState::Completed)
        .fetch_all(&mut *conn)
        .await?;

        Ok(totals)
    }
}
