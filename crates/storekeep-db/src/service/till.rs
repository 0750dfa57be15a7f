//! # Till Lifecycle Manager
//!
//! Opens and closes tills, produces the end-of-day closing record, and runs
//! the closing review workflow.
//!
//! ## State Machines
//! ```text
//! Till                                       Closing record
//! ────                                       ──────────────
//!            open(user)                      PENDING ──reconcile──► RECONCILED
//!   CLOSED ─────────────► OPEN                  │                      │
//!     ▲  ◄──────────────── │                    │                   approve
//!     │      close(user)   │                    │                      ▼
//!     │                    │                    │                   APPROVED
//!  unblock   block (any)   │                    │
//!     │          ▼         │                    └──────reject──────► REJECTED
//!   BLOCKED ◄──────────────┘                        (from PENDING or      │
//!                                                    RECONCILED)          │
//!   CLOSED ⇄ UNDER_AUDIT                                                  │
//!                                            till CLOSED → OPEN  ◄────────┘
//! ```
//!
//! ## Closing Balance
//! `theoretical = opening + Σ COMPLETED sales of the till on the day`,
//! always summed from the sale ledger at close time.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use storekeep_core::validation;
use storekeep_core::{
    ClosingDraft, ClosingState, CoreError, CoreResult, Money, Till, TillClosing,
};
use tracing::{info, warn};

use crate::error::{DbError, ServiceError, ServiceResult};
use crate::repository::{SaleRepository, TillRepository};

#[derive(Debug, Clone)]
pub struct TillManager {
    pool: SqlitePool,
    tills: TillRepository,
}

impl TillManager {
    pub fn new(pool: SqlitePool) -> Self {
        let tills = TillRepository::new(pool.clone());
        TillManager { pool, tills }
    }

    // =========================================================================
    // Till lifecycle
    // =========================================================================

    /// Registers a new till in state `CLOSED`.
    pub async fn create_till(&self, name: &str) -> ServiceResult<Till> {
        validation::validate_till_name(name)?;

        let till = Till::new(name.trim(), Utc::now());
        let mut tx = self.pool.begin().await?;
        TillRepository::insert(&mut tx, &till).await?;
        tx.commit().await?;

        info!(id = %till.id, name = %till.name, "Till created");
        Ok(till)
    }

    pub async fn get_till(&self, till_id: &str) -> ServiceResult<Till> {
        self.tills
            .get_by_id(till_id)
            .await?
            .ok_or_else(|| CoreError::not_found("till", till_id).into())
    }

    pub async fn list_tills(&self) -> ServiceResult<Vec<Till>> {
        Ok(self.tills.list().await?)
    }

    /// `CLOSED → OPEN` for `user_id`.
    ///
    /// A till closed today stays closed until its closing is rejected;
    /// `reject_closing` is the only way back to `OPEN` on that date.
    ///
    /// ## Errors
    /// - `TillAlreadyOpen` if the till is open
    /// - `UserHasOpenTill` if the user has another till open
    /// - `InvalidTillTransition` from `BLOCKED` / `UNDER_AUDIT`
    /// - `DuplicateClosing` if a closing for today exists and is not `REJECTED`
    pub async fn open(
        &self,
        till_id: &str,
        user_id: &str,
        opening_balance: Option<Money>,
    ) -> ServiceResult<Till> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut till = Self::locked(&mut tx, till_id, now).await?;
        if let Err(err) = till.open(user_id, opening_balance, now) {
            warn!(till_id = %till_id, user_id = %user_id, error = %err, "Open rejected");
            return Err(err.into());
        }
        let today = now.date_naive();
        match TillRepository::closing_state_on(&mut tx, till_id, today).await? {
            None | Some(ClosingState::Rejected) => {}
            Some(state) => {
                warn!(
                    till_id = %till_id,
                    date = %today,
                    closing = %state,
                    "Open rejected: till already closed today"
                );
                return Err(duplicate_closing(till_id, today).into());
            }
        }
        Self::ensure_user_free(&mut tx, user_id, till_id).await?;

        if let Err(err) = TillRepository::save(&mut tx, &till).await {
            return Err(Self::open_conflict(&mut tx, err, user_id, till_id).await);
        }
        tx.commit().await?;

        info!(
            till_id = %till.id,
            user_id = %user_id,
            opening_balance = %till.opening_balance,
            "Till opened"
        );
        Ok(till)
    }

    /// `OPEN → CLOSED`, creating the `PENDING` closing record for today.
    ///
    /// Without `actual_balance` the counted amount is taken to be the
    /// theoretical one. The till keeps the counted amount as its float.
    pub async fn close(
        &self,
        till_id: &str,
        user_id: &str,
        actual_balance: Option<Money>,
        notes: Option<String>,
    ) -> ServiceResult<TillClosing> {
        if let Some(balance) = actual_balance {
            validation::validate_non_negative_money("actual_balance", balance)?;
        }

        let now = Utc::now();
        let business_date = now.date_naive();
        let mut tx = self.pool.begin().await?;

        let mut till = Self::locked(&mut tx, till_id, now).await?;
        if let Err(err) = till.ensure_closable_by(user_id) {
            warn!(till_id = %till_id, user_id = %user_id, error = %err, "Close rejected");
            return Err(err.into());
        }

        if TillRepository::closing_state_on(&mut tx, till_id, business_date)
            .await?
            .is_some()
        {
            warn!(till_id = %till_id, date = %business_date, "Duplicate closing");
            return Err(duplicate_closing(till_id, business_date).into());
        }

        let sales_total =
            SaleRepository::completed_total_on(&mut tx, till_id, business_date).await?;
        let breakdown =
            SaleRepository::payment_breakdown_on(&mut tx, till_id, business_date).await?;

        let closing = TillClosing::from_draft(
            ClosingDraft {
                till_id: till.id.clone(),
                business_date,
                opening_balance: till.opening_balance,
                completed_sales_total: sales_total,
                payment_breakdown: breakdown,
                actual_balance,
                notes: notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
                closed_by: user_id.to_string(),
            },
            now,
        )?;
        TillRepository::insert_closing(&mut tx, &closing)
            .await
            .map_err(|err| {
                if err.is_unique_violation_on("till_closings.till_id") {
                    duplicate_closing(till_id, business_date).into()
                } else {
                    ServiceError::from(err)
                }
            })?;

        till.close(user_id, closing.actual_closing_balance, now)?;
        TillRepository::save(&mut tx, &till).await?;
        tx.commit().await?;

        info!(
            till_id = %till.id,
            closing_id = %closing.id,
            theoretical = %closing.theoretical_closing_balance,
            actual = %closing.actual_closing_balance,
            difference = %closing.difference(),
            "Till closed"
        );
        Ok(closing)
    }

    /// Administrative block from any state but `BLOCKED`.
    pub async fn block(&self, till_id: &str, reason: &str) -> ServiceResult<Till> {
        let till = self
            .transition(till_id, "block", |till, at| till.block(reason, at))
            .await?;
        info!(till_id = %till.id, reason = %reason, "Till blocked");
        Ok(till)
    }

    /// `BLOCKED → CLOSED`.
    pub async fn unblock(&self, till_id: &str) -> ServiceResult<Till> {
        let till = self.transition(till_id, "unblock", Till::unblock).await?;
        info!(till_id = %till.id, "Till unblocked");
        Ok(till)
    }

    /// `CLOSED → UNDER_AUDIT`.
    pub async fn start_audit(&self, till_id: &str) -> ServiceResult<Till> {
        let till = self.transition(till_id, "start audit", Till::start_audit).await?;
        info!(till_id = %till.id, "Till audit started");
        Ok(till)
    }

    /// `UNDER_AUDIT → CLOSED`.
    pub async fn finish_audit(&self, till_id: &str) -> ServiceResult<Till> {
        let till = self.transition(till_id, "finish audit", Till::finish_audit).await?;
        info!(till_id = %till.id, "Till audit finished");
        Ok(till)
    }

    pub async fn get_open_till_for_user(&self, user_id: &str) -> ServiceResult<Option<Till>> {
        Ok(self.tills.find_open_for_user(user_id).await?)
    }

    // =========================================================================
    // Closing workflow
    // =========================================================================

    pub async fn get_closing(&self, closing_id: &str) -> ServiceResult<TillClosing> {
        self.tills
            .get_closing(closing_id)
            .await?
            .ok_or_else(|| CoreError::not_found("till closing", closing_id).into())
    }

    pub async fn get_closing_for_date(
        &self,
        till_id: &str,
        date: NaiveDate,
    ) -> ServiceResult<Option<TillClosing>> {
        Ok(self.tills.get_closing_for_date(till_id, date).await?)
    }

    pub async fn list_closings(&self, state: ClosingState) -> ServiceResult<Vec<TillClosing>> {
        Ok(self.tills.list_closings(state).await?)
    }

    /// `PENDING → RECONCILED`.
    pub async fn reconcile_closing(
        &self,
        closing_id: &str,
        user_id: &str,
        notes: Option<String>,
    ) -> ServiceResult<TillClosing> {
        validation::validate_id("user_id", user_id)?;
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

        let closing = self
            .review(closing_id, |closing, at| closing.reconcile(user_id, notes, at))
            .await?;
        info!(closing_id = %closing.id, user_id = %user_id, "Closing reconciled");
        Ok(closing)
    }

    /// `RECONCILED → APPROVED`.
    pub async fn approve_closing(
        &self,
        closing_id: &str,
        user_id: &str,
    ) -> ServiceResult<TillClosing> {
        validation::validate_id("user_id", user_id)?;

        let closing = self
            .review(closing_id, |closing, at| closing.approve(user_id, at))
            .await?;
        info!(closing_id = %closing.id, user_id = %user_id, "Closing approved");
        Ok(closing)
    }

    /// `PENDING | RECONCILED → REJECTED`, reopening the till in the same
    /// transaction.
    ///
    /// The closing record stays in place, so the till cannot be closed a
    /// second time on the same business date.
    ///
    /// ## Errors
    /// - `InvalidClosingTransition` unless the closing is `PENDING` or `RECONCILED`
    /// - `InvalidTillTransition` if the till is no longer `CLOSED`
    ///   (blocked or under audit since the close); nothing is changed
    /// - `UserHasOpenTill` if the cashier has opened another till since
    pub async fn reject_closing(
        &self,
        closing_id: &str,
        user_id: &str,
        reason: &str,
    ) -> ServiceResult<TillClosing> {
        validation::validate_id("user_id", user_id)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut closing = Self::locked_closing(&mut tx, closing_id).await?;
        if let Err(err) = closing.reject(user_id, reason, now) {
            warn!(closing_id = %closing_id, error = %err, "Reject rejected");
            return Err(err.into());
        }

        let mut till = Self::locked(&mut tx, &closing.till_id, now).await?;
        if let Err(err) = till.reopen(now) {
            warn!(closing_id = %closing_id, till_id = %till.id, error = %err, "Reject rejected");
            return Err(err.into());
        }
        if let Some(cashier) = till.assigned_user_id.clone() {
            Self::ensure_user_free(&mut tx, &cashier, &till.id).await?;
        }

        TillRepository::save_closing(&mut tx, &closing).await?;
        TillRepository::save(&mut tx, &till).await?;
        tx.commit().await?;

        info!(closing_id = %closing.id, till_id = %till.id, "Closing rejected, till reopened");
        Ok(closing)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn locked(
        conn: &mut SqliteConnection,
        till_id: &str,
        at: DateTime<Utc>,
    ) -> ServiceResult<Till> {
        TillRepository::lock(conn, till_id, at)
            .await?
            .ok_or_else(|| ServiceError::from(CoreError::not_found("till", till_id)))
    }

    async fn locked_closing(
        conn: &mut SqliteConnection,
        closing_id: &str,
    ) -> ServiceResult<TillClosing> {
        TillRepository::lock_closing(conn, closing_id)
            .await?
            .ok_or_else(|| ServiceError::from(CoreError::not_found("till closing", closing_id)))
    }

    /// Fails with `UserHasOpenTill` if `user_id` has an OPEN till other than
    /// `till_id`. Must run inside the transaction that opens the till.
    async fn ensure_user_free(
        conn: &mut SqliteConnection,
        user_id: &str,
        till_id: &str,
    ) -> ServiceResult<()> {
        let other = TillRepository::find_other_open_for_user(conn, user_id, till_id).await?;
        if let Some(other) = other {
            warn!(user_id = %user_id, open_till = %other.id, "User already has an open till");
            return Err(CoreError::UserHasOpenTill {
                user_id: user_id.to_string(),
                till_id: other.id,
            }
            .into());
        }
        Ok(())
    }

    /// Maps a one-open-till-per-user index violation onto `UserHasOpenTill`,
    /// naming the till the user holds. Any other error passes through.
    async fn open_conflict(
        conn: &mut SqliteConnection,
        err: DbError,
        user_id: &str,
        till_id: &str,
    ) -> ServiceError {
        let index_hit = err.is_unique_violation_on("tills.assigned_user_id")
            || err.is_unique_violation_on("idx_tills_one_open_per_user");
        if !index_hit {
            return err.into();
        }
        match TillRepository::find_other_open_for_user(conn, user_id, till_id).await {
            Ok(Some(other)) => CoreError::UserHasOpenTill {
                user_id: user_id.to_string(),
                till_id: other.id,
            }
            .into(),
            Ok(None) | Err(_) => err.into(),
        }
    }

    /// Runs one till state transition in its own transaction.
    async fn transition<F>(&self, till_id: &str, action: &str, apply: F) -> ServiceResult<Till>
    where
        F: FnOnce(&mut Till, DateTime<Utc>) -> CoreResult<()>,
    {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut till = Self::locked(&mut tx, till_id, now).await?;
        if let Err(err) = apply(&mut till, now) {
            warn!(
                till_id = %till_id,
                action = %action,
                error = %err,
                "Till transition rejected"
            );
            return Err(err.into());
        }
        TillRepository::save(&mut tx, &till).await?;

        tx.commit().await?;
        Ok(till)
    }

    /// Runs one closing-record transition in its own transaction.
    async fn review<F>(&self, closing_id: &str, apply: F) -> ServiceResult<TillClosing>
    where
        F: FnOnce(&mut TillClosing, DateTime<Utc>) -> CoreResult<()>,
    {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut closing = Self::locked_closing(&mut tx, closing_id).await?;
        if let Err(err) = apply(&mut closing, now) {
            warn!(closing_id = %closing_id, error = %err, "Closing transition rejected");
            return Err(err.into());
        }
        TillRepository::save_closing(&mut tx, &closing).await?;

        tx.commit().await?;
        Ok(closing)
    }
}

fn duplicate_closing(till_id: &str, date: NaiveDate) -> CoreError {
    CoreError::DuplicateClosing {
        till_id: till_id.to_string(),
        date,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{open_till, product, test_db, MANAGER};
    use crate::{Database, DbConfig};
    use storekeep_core::{
        NewSale, PaymentMethod, Quantity, SaleLineRequest, TillState, ValidationError,
    };

    const CASHIER: &str = "cashier-1";

    async fn ring_up(db: &Database, till_id: &str, product_id: &str, units: i64) {
        db.sales()
            .create_sale(NewSale {
                customer_id: None,
                cashier_id: CASHIER.to_string(),
                till_id: till_id.to_string(),
                lines: vec![SaleLineRequest::new(product_id, Quantity::from_units(units))],
                payment_method: PaymentMethod::Cash,
                cash_tendered: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_and_open() {
        let db = test_db().await;
        let till = db.tills().create_till("Front 1").await.unwrap();
        assert_eq!(till.state, TillState::Closed);

        let opened = db
            .tills()
            .open(&till.id, CASHIER, Some(Money::from_cents(10_000)))
            .await
            .unwrap();
        assert_eq!(opened.state, TillState::Open);
        assert_eq!(opened.assigned_user_id.as_deref(), Some(CASHIER));
        assert_eq!(opened.opening_balance, Money::from_cents(10_000));

        let found = db.tills().get_open_till_for_user(CASHIER).await.unwrap();
        assert_eq!(found.map(|t| t.id), Some(till.id));
    }

    #[tokio::test]
    async fn test_open_twice_fails() {
        let db = test_db().await;
        let till = open_till(&db, "Front 1", CASHIER, 0).await;

        let err = db.tills().open(&till.id, CASHIER, None).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::TillAlreadyOpen(_))));
    }

    #[tokio::test]
    async fn test_one_open_till_per_user() {
        let db = test_db().await;
        let first = open_till(&db, "Front 1", CASHIER, 0).await;
        let second = db.tills().create_till("Front 2").await.unwrap();

        let err = db.tills().open(&second.id, CASHIER, None).await.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::UserHasOpenTill { till_id, .. }) if *till_id == first.id
        ));

        // nothing was written for the second till
        let second = db.tills().get_till(&second.id).await.unwrap();
        assert_eq!(second.state, TillState::Closed);
        assert!(second.assigned_user_id.is_none());

        // a different user can open it
        db.tills().open(&second.id, "cashier-2", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_index_backstops_the_user_check() {
        let db = test_db().await;
        let held = open_till(&db, "Front 1", CASHIER, 0).await;
        let other = db.tills().create_till("Front 2").await.unwrap();

        // write the second OPEN row directly, bypassing the service check
        let mut tx = db.pool().begin().await.unwrap();
        let mut till = TillRepository::lock(&mut tx, &other.id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        till.open(CASHIER, None, Utc::now()).unwrap();
        let err = TillRepository::save(&mut tx, &till).await.unwrap_err();

        let err = TillManager::open_conflict(&mut tx, err, CASHIER, &other.id).await;
        assert!(matches!(
            err.domain(),
            Some(CoreError::UserHasOpenTill { till_id, .. }) if *till_id == held.id
        ));
    }

    #[tokio::test]
    async fn test_concurrent_opens_for_one_user() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("store.db")).max_connections(8))
            .await
            .unwrap();

        let first = db.tills().create_till("Front 1").await.unwrap();
        let second = db.tills().create_till("Front 2").await.unwrap();

        let handles: Vec<_> = [first.id.clone(), second.id.clone()]
            .into_iter()
            .map(|till_id| {
                let tills = db.tills();
                tokio::spawn(async move { tills.open(&till_id, CASHIER, None).await })
            })
            .collect();

        let mut opened = Vec::new();
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(till) => opened.push(till.id),
                Err(err) => {
                    assert!(matches!(err.domain(), Some(CoreError::UserHasOpenTill { .. })));
                    conflicts += 1;
                }
            }
        }

        assert_eq!(opened.len(), 1);
        assert_eq!(conflicts, 1);
        let held = db.tills().get_open_till_for_user(CASHIER).await.unwrap();
        assert_eq!(held.map(|t| t.id), opened.pop());
    }

    #[tokio::test]
    async fn test_till_name_is_bounded() {
        let db = test_db().await;
        let err = db.tills().create_till("   ").await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::Validation(_))));

        let err = db.tills().create_till(&"T".repeat(61)).await.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::Validation(ValidationError::TooLong { .. }))
        ));

        let till = db.tills().create_till(" Front 1 ").await.unwrap();
        assert_eq!(till.name, "Front 1");
    }

    #[tokio::test]
    async fn test_close_computes_theoretical_from_sales() {
        let db = test_db().await;
        let till = open_till(&db, "Front 1", CASHIER, 10_000).await;
        let p = product(&db, "RADIO", 50, 5).await; // 10.00, no tax

        ring_up(&db, &till.id, &p.id, 10).await; // 100.00
        ring_up(&db, &till.id, &p.id, 15).await; // 150.00

        let closing = db.tills().close(&till.id, CASHIER, None, None).await.unwrap();
        assert_eq!(closing.theoretical_closing_balance, Money::from_cents(35_000));
        assert_eq!(closing.actual_closing_balance, Money::from_cents(35_000));
        assert_eq!(closing.difference(), Money::zero());
        assert_eq!(closing.state, ClosingState::Pending);
        assert_eq!(closing.payment_breakdown.len(), 1);
        assert_eq!(closing.payment_breakdown[0].method, PaymentMethod::Cash);
        assert_eq!(closing.payment_breakdown[0].sale_count, 2);

        let till = db.tills().get_till(&till.id).await.unwrap();
        assert_eq!(till.state, TillState::Closed);
        assert_eq!(till.current_balance, Money::from_cents(35_000));
    }

    #[tokio::test]
    async fn test_close_with_counted_shortfall() {
        let db = test_db().await;
        let till = open_till(&db, "Front 1", CASHIER, 5_000).await;

        let closing = db
            .tills()
            .close(&till.id, CASHIER, Some(Money::from_cents(4_750)), Some("short".into()))
            .await
            .unwrap();
        assert_eq!(closing.difference(), Money::from_cents(-250));
        assert_eq!(closing.notes.as_deref(), Some("short"));

        let stored = db.tills().get_closing(&closing.id).await.unwrap();
        assert_eq!(stored.difference(), Money::from_cents(-250));
    }

    #[tokio::test]
    async fn test_close_requires_assigned_cashier() {
        let db = test_db().await;
        let till = open_till(&db, "Front 1", CASHIER, 0).await;

        let err = db.tills().close(&till.id, "someone-else", None, None).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::NotAssignedCashier { .. })));
    }

    #[tokio::test]
    async fn test_till_closed_today_cannot_be_reopened() {
        let db = test_db().await;
        let till = open_till(&db, "Front 1", CASHIER, 0).await;
        let closing = db.tills().close(&till.id, CASHIER, None, None).await.unwrap();

        let err = db.tills().open(&till.id, CASHIER, None).await.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::DuplicateClosing { date, .. }) if *date == closing.business_date
        ));

        let till = db.tills().get_till(&till.id).await.unwrap();
        assert_eq!(till.state, TillState::Closed);

        // the cashier is free to work another till
        open_till(&db, "Front 2", CASHIER, 0).await;
    }

    #[tokio::test]
    async fn test_till_closed_yesterday_opens_again() {
        let db = test_db().await;
        let till = open_till(&db, "Front 1", CASHIER, 0).await;
        let closing = db.tills().close(&till.id, CASHIER, None, None).await.unwrap();

        let yesterday = closing.business_date.pred_opt().unwrap();
        sqlx::query("UPDATE till_closings SET business_date = ? WHERE id = ?")
            .bind(yesterday)
            .bind(&closing.id)
            .execute(db.pool())
            .await
            .unwrap();

        let reopened = db.tills().open(&till.id, CASHIER, None).await.unwrap();
        assert_eq!(reopened.state, TillState::Open);
    }

    #[tokio::test]
    async fn test_close_counts_only_sales_of_the_utc_business_date() {
        let db = test_db().await;
        let till = open_till(&db, "Front 1", CASHIER, 0).await;
        let p = product(&db, "RADIO", 50, 5).await;

        ring_up(&db, &till.id, &p.id, 2).await; // 20.00
        ring_up(&db, &till.id, &p.id, 3).await; // 30.00

        // the first sale was rung up before UTC midnight
        let sales = db
            .sales()
            .completed_sales_for(&till.id, Utc::now().date_naive())
            .await
            .unwrap();
        let early = sales.iter().find(|s| s.grand_total == Money::from_cents(2_000)).unwrap();
        let yesterday = early.business_date.pred_opt().unwrap();
        sqlx::query("UPDATE sales SET business_date = ? WHERE id = ?")
            .bind(yesterday)
            .bind(&early.id)
            .execute(db.pool())
            .await
            .unwrap();

        let closing = db.tills().close(&till.id, CASHIER, None, None).await.unwrap();
        assert_eq!(closing.theoretical_closing_balance, Money::from_cents(3_000));
        assert_eq!(closing.payment_breakdown[0].sale_count, 1);
    }

    #[tokio::test]
    async fn test_closing_workflow_to_approved() {
        let db = test_db().await;
        let till = open_till(&db, "Front 1", CASHIER, 0).await;
        let closing = db.tills().close(&till.id, CASHIER, None, None).await.unwrap();

        let err = db.tills().approve_closing(&closing.id, MANAGER).await.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::InvalidClosingTransition { .. })
        ));

        let reconciled = db
            .tills()
            .reconcile_closing(&closing.id, MANAGER, Some("counted twice".into()))
            .await
            .unwrap();
        assert_eq!(reconciled.state, ClosingState::Reconciled);
        assert_eq!(reconciled.reconciled_by.as_deref(), Some(MANAGER));

        let approved = db.tills().approve_closing(&closing.id, MANAGER).await.unwrap();
        assert_eq!(approved.state, ClosingState::Approved);

        let listed = db.tills().list_closings(ClosingState::Approved).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(db.tills().list_closings(ClosingState::Pending).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reject_reopens_till_and_blocks_same_day_close() {
        let db = test_db().await;
        let till = open_till(&db, "Front 1", CASHIER, 2_000).await;
        let closing = db.tills().close(&till.id, CASHIER, None, None).await.unwrap();

        let rejected = db
            .tills()
            .reject_closing(&closing.id, MANAGER, "Drawer not counted")
            .await
            .unwrap();
        assert_eq!(rejected.state, ClosingState::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Drawer not counted"));

        let reopened = db.tills().get_till(&till.id).await.unwrap();
        assert_eq!(reopened.state, TillState::Open);
        assert_eq!(reopened.assigned_user_id.as_deref(), Some(CASHIER));

        let err = db.tills().close(&till.id, CASHIER, None, None).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::DuplicateClosing { .. })));

        let same_day = db
            .tills()
            .get_closing_for_date(&till.id, closing.business_date)
            .await
            .unwrap();
        assert_eq!(same_day.map(|c| c.id), Some(closing.id));
    }

    #[tokio::test]
    async fn test_reject_then_close_on_a_different_date() {
        let db = test_db().await;
        let till = open_till(&db, "Front 1", CASHIER, 0).await;
        let closing = db.tills().close(&till.id, CASHIER, None, None).await.unwrap();
        db.tills()
            .reject_closing(&closing.id, MANAGER, "Recount")
            .await
            .unwrap();

        // the rejected closing belongs to yesterday
        let yesterday = closing.business_date.pred_opt().unwrap();
        sqlx::query("UPDATE till_closings SET business_date = ? WHERE id = ?")
            .bind(yesterday)
            .bind(&closing.id)
            .execute(db.pool())
            .await
            .unwrap();

        let second = db.tills().close(&till.id, CASHIER, None, None).await.unwrap();
        assert_ne!(second.id, closing.id);
        assert_eq!(second.business_date, closing.business_date);
    }

    #[tokio::test]
    async fn test_reject_fails_when_cashier_opened_another_till() {
        let db = test_db().await;
        let till = open_till(&db, "Front 1", CASHIER, 0).await;
        let closing = db.tills().close(&till.id, CASHIER, None, None).await.unwrap();
        open_till(&db, "Front 2", CASHIER, 0).await;

        let err = db
            .tills()
            .reject_closing(&closing.id, MANAGER, "Recount")
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::UserHasOpenTill { .. })));

        // rolled back: closing still pending, till still closed
        let closing = db.tills().get_closing(&closing.id).await.unwrap();
        assert_eq!(closing.state, ClosingState::Pending);
        assert_eq!(db.tills().get_till(&till.id).await.unwrap().state, TillState::Closed);
    }

    #[tokio::test]
    async fn test_reject_fails_when_till_was_blocked_after_close() {
        let db = test_db().await;
        let till = open_till(&db, "Front 1", CASHIER, 0).await;
        let closing = db.tills().close(&till.id, CASHIER, None, None).await.unwrap();
        db.tills().block(&till.id, "Drawer seized").await.unwrap();

        let err = db
            .tills()
            .reject_closing(&closing.id, MANAGER, "Recount")
            .await
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::InvalidTillTransition { action: "reopen", .. })
        ));

        let closing = db.tills().get_closing(&closing.id).await.unwrap();
        assert_eq!(closing.state, ClosingState::Pending);
        assert!(closing.rejected_by.is_none());
        assert_eq!(db.tills().get_till(&till.id).await.unwrap().state, TillState::Blocked);
    }

    #[tokio::test]
    async fn test_block_unblock_and_audit() {
        let db = test_db().await;
        let till = open_till(&db, "Front 1", CASHIER, 0).await;

        let blocked = db.tills().block(&till.id, "Suspected theft").await.unwrap();
        assert_eq!(blocked.state, TillState::Blocked);
        assert_eq!(blocked.blocked_reason.as_deref(), Some("Suspected theft"));

        let err = db.tills().open(&till.id, CASHIER, None).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::InvalidTillTransition { .. })));

        let unblocked = db.tills().unblock(&till.id).await.unwrap();
        assert_eq!(unblocked.state, TillState::Closed);

        let audited = db.tills().start_audit(&till.id).await.unwrap();
        assert_eq!(audited.state, TillState::UnderAudit);
        let err = db.tills().start_audit(&till.id).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::InvalidTillTransition { .. })));

        let done = db.tills().finish_audit(&till.id).await.unwrap();
        assert_eq!(done.state, TillState::Closed);
    }

    #[tokio::test]
    async fn test_unknown_till() {
        let db = test_db().await;
        let err = db.tills().open("missing", CASHIER, None).await.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::EntityNotFound { entity: "till", .. })
        ));
    }
}
