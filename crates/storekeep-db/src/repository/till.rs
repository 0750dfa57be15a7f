//! # Till Repository
//!
//! Tills and their end-of-day closing records.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};
use storekeep_core::{ClosingState, Till, TillClosing, TillState};
use tracing::debug;

use crate::error::DbResult;

const TILL_COLUMNS: &str = "id, name, state, opening_balance, current_balance, assigned_user_id, \
    opened_at, closed_at, blocked_reason, created_at, updated_at";

const CLOSING_COLUMNS: &str = "id, till_id, business_date, opening_balance, \
    theoretical_closing_balance, actual_closing_balance, payment_breakdown, state, notes, \
    closed_by, closed_at, reconciled_by, reconciled_at, approved_by, approved_at, \
    rejected_by, rejected_at, rejection_reason";

/// Repository for tills and till closings.
#[derive(Debug, Clone)]
pub struct TillRepository {
    pool: SqlitePool,
}

impl TillRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TillRepository { pool }
    }

    // =========================================================================
    // Till reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Till>> {
        debug!(id = %id, "Fetching till");

        let sql = format!("SELECT {TILL_COLUMNS} FROM tills WHERE id = ?");
        let till = sqlx::query_as::<_, Till>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(till)
    }

    pub async fn list(&self) -> DbResult<Vec<Till>> {
        let sql = format!("SELECT {TILL_COLUMNS} FROM tills ORDER BY name");
        let tills = sqlx::query_as::<_, Till>(&sql).fetch_all(&self.pool).await?;
        Ok(tills)
    }

    pub async fn find_open_for_user(&self, user_id: &str) -> DbResult<Option<Till>> {
        let sql =
            format!("SELECT {TILL_COLUMNS} FROM tills WHERE assigned_user_id = ? AND state = ?");
        let till = sqlx::query_as::<_, Till>(&sql)
            .bind(user_id)
            .bind(TillState::Open)
            .fetch_optional(&self.pool)
            .await?;

        Ok(till)
    }

    // =========================================================================
    // Till unit-of-work operations
    // =========================================================================

    /// Claims the till row for the current transaction and returns it.
    pub async fn lock(
        conn: &mut SqliteConnection,
        id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<Option<Till>> {
        debug!(id = %id, "Locking till");

        let sql = format!("UPDATE tills SET updated_at = ? WHERE id = ? RETURNING {TILL_COLUMNS}");
        let till = sqlx::query_as::<_, Till>(&sql)
            .bind(at)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(till)
    }

    /// The user's OPEN till other than `except_till_id`, read inside the
    /// caller's transaction.
    pub async fn find_other_open_for_user(
        conn: &mut SqliteConnection,
        user_id: &str,
        except_till_id: &str,
    ) -> DbResult<Option<Till>> {
        let sql = format!(
            "SELECT {TILL_COLUMNS} FROM tills \
             WHERE assigned_user_id = ? AND state = ? AND id <> ?"
        );
        let till = sqlx::query_as::<_, Till>(&sql)
            .bind(user_id)
            .bind(TillState::Open)
            .bind(except_till_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(till)
    }

    pub async fn insert(conn: &mut SqliteConnection, till: &Till) -> DbResult<()> {
        debug!(id = %till.id, name = %till.name, "Inserting till");

        sqlx::query(
            r#"
            INSERT INTO tills (
                id, name, state, opening_balance, current_balance, assigned_user_id,
                opened_at, closed_at, blocked_reason, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&till.id)
        .bind(&till.name)
        .bind(till.state)
        .bind(till.opening_balance)
        .bind(till.current_balance)
        .bind(&till.assigned_user_id)
        .bind(till.opened_at)
        .bind(till.closed_at)
        .bind(&till.blocked_reason)
        .bind(till.created_at)
        .bind(till.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Writes back the state fields of a locked till.
    pub async fn save(conn: &mut SqliteConnection, till: &Till) -> DbResult<()> {
        debug!(id = %till.id, state = %till.state, "Saving till");

        sqlx::query(
            r#"
            UPDATE tills
            SET state = ?, opening_balance = ?, current_balance = ?, assigned_user_id = ?,
                opened_at = ?, closed_at = ?, blocked_reason = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(till.state)
        .bind(till.opening_balance)
        .bind(till.current_balance)
        .bind(&till.assigned_user_id)
        .bind(till.opened_at)
        .bind(till.closed_at)
        .bind(&till.blocked_reason)
        .bind(till.updated_at)
        .bind(&till.id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Closings
    // =========================================================================

    pub async fn get_closing(&self, id: &str) -> DbResult<Option<TillClosing>> {
        let sql = format!("SELECT {CLOSING_COLUMNS} FROM till_closings WHERE id = ?");
        let closing = sqlx::query_as::<_, TillClosing>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(closing)
    }

    pub async fn get_closing_for_date(
        &self,
        till_id: &str,
        date: NaiveDate,
    ) -> DbResult<Option<TillClosing>> {
        let sql = format!(
            "SELECT {CLOSING_COLUMNS} FROM till_closings WHERE till_id = ? AND business_date = ?"
        );
        let closing = sqlx::query_as::<_, TillClosing>(&sql)
            .bind(till_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;

        Ok(closing)
    }

    /// Closings in `state`, newest business date first.
    pub async fn list_closings(&self, state: ClosingState) -> DbResult<Vec<TillClosing>> {
        let sql = format!(
            "SELECT {CLOSING_COLUMNS} FROM till_closings \
             WHERE state = ? ORDER BY business_date DESC, closed_at DESC"
        );
        let closings = sqlx::query_as::<_, TillClosing>(&sql)
            .bind(state)
            .fetch_all(&self.pool)
            .await?;

        Ok(closings)
    }

    /// State of the till's closing for `date`, if one exists, read inside
    /// the caller's transaction.
    pub async fn closing_state_on(
        conn: &mut SqliteConnection,
        till_id: &str,
        date: NaiveDate,
    ) -> DbResult<Option<ClosingState>> {
        let state: Option<ClosingState> = sqlx::query_scalar(
            "SELECT state FROM till_closings WHERE till_id = ? AND business_date = ?",
        )
        .bind(till_id)
        .bind(date)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(state)
    }

    /// Claims the closing row for the current transaction and returns it.
    pub async fn lock_closing(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<TillClosing>> {
        debug!(id = %id, "Locking till closing");

        let sql = format!(
            "UPDATE till_closings SET state = state WHERE id = ? RETURNING {CLOSING_COLUMNS}"
        );
        let closing = sqlx::query_as::<_, TillClosing>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(closing)
    }

    pub async fn insert_closing(
        conn: &mut SqliteConnection,
        closing: &TillClosing,
    ) -> DbResult<()> {
        debug!(
            id = %closing.id,
            till_id = %closing.till_id,
            date = %closing.business_date,
            "Inserting till closing"
        );

        sqlx::query(
            r#"
            INSERT INTO till_closings (
                id, till_id, business_date, opening_balance, theoretical_closing_balance,
                actual_closing_balance, payment_breakdown, state, notes, closed_by, closed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&closing.id)
        .bind(&closing.till_id)
        .bind(closing.business_date)
        .bind(closing.opening_balance)
        .bind(closing.theoretical_closing_balance)
        .bind(closing.actual_closing_balance)
        .bind(Json(&closing.payment_breakdown))
        .bind(closing.state)
        .bind(&closing.notes)
        .bind(&closing.closed_by)
        .bind(closing.closed_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Writes back the workflow fields of a locked closing.
    pub async fn save_closing(conn: &mut SqliteConnection, closing: &TillClosing) -> DbResult<()> {
        debug!(id = %closing.id, state = %closing.state, "Saving till closing");

        sqlx::query(
            r#"
            UPDATE till_closings
            SET state = ?, notes = ?,
                reconciled_by = ?, reconciled_at = ?,
                approved_by = ?, approved_at = ?,
                rejected_by = ?, rejected_at = ?, rejection_reason = ?
            WHERE id = ?
            "#,
        )
        .bind(closing.state)
        .bind(&closing.notes)
        .bind(&closing.reconciled_by)
        .bind(closing.reconciled_at)
        .bind(&closing.approved_by)
        .bind(closing.approved_at)
        .bind(&closing.rejected_by)
        .bind(closing.rejected_at)
        .bind(&closing.rejection_reason)
        .bind(&closing.id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
