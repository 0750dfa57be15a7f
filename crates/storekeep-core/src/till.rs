//! # Till Module
//!
//! Cash register lifecycle and the end-of-day closing record.
//!
//! ## Till State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │            open(user, opening?)                                         │
//! │   CLOSED ─────────────────────────► OPEN                               │
//! │     ▲  ◄─────────────────────────── │                                  │
//! │     │     close(user, actual?)      │                                  │
//! │     │                               │                                  │
//! │     │   reject(closing) reopens ────┘ (CLOSED → OPEN)                  │
//! │     │                                                                   │
//! │     ├── unblock() ◄── BLOCKED ◄── block(reason) from any other state   │
//! │     │                                                                   │
//! │     └── finish_audit() ◄── UNDER_AUDIT ◄── start_audit() from CLOSED   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Closing Workflow
//! ```text
//!   PENDING ──reconcile──► RECONCILED ──approve──► APPROVED (terminal)
//!      │                        │
//!      └────────reject──────────┴──► REJECTED (terminal, till reopens)
//! ```
//!
//! The "one open till per user" rule spans several tills, and "a till closed
//! today reopens only through a rejected closing" needs the closing table, so
//! both are enforced by the database layer inside the same transaction as
//! [`Till::open`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::sale::PaymentMethod;
use crate::validation;

// =============================================================================
// Till State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum TillState {
    Open,
    Closed,
    Blocked,
    UnderAudit,
}

impl TillState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TillState::Open => "OPEN",
            TillState::Closed => "CLOSED",
            TillState::Blocked => "BLOCKED",
            TillState::UnderAudit => "UNDER_AUDIT",
        }
    }
}

impl fmt::Display for TillState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Till
// =============================================================================

/// A physical cash register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Till {
    pub id: String,
    pub name: String,
    pub state: TillState,
    pub opening_balance: Money,
    /// Counted (or theoretical) cash at the last close; the float carried
    /// into the next opening when none is given.
    pub current_balance: Money,
    /// Cashier the till was last opened for.
    pub assigned_user_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub opened_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    pub blocked_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Till {
    /// A new till starts `CLOSED` with an empty drawer.
    pub fn new(name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Till {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            state: TillState::Closed,
            opening_balance: Money::zero(),
            current_balance: Money::zero(),
            assigned_user_id: None,
            opened_at: None,
            closed_at: None,
            blocked_reason: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == TillState::Open
    }

    /// Fails with `TillNotOpen` unless the till is `OPEN`.
    pub fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::TillNotOpen(self.id.clone()))
        }
    }

    fn invalid(&self, action: &'static str) -> CoreError {
        CoreError::InvalidTillTransition {
            till_id: self.id.clone(),
            state: self.state.to_string(),
            action,
        }
    }

    /// `CLOSED → OPEN` for `user_id`.
    ///
    /// Without an explicit opening balance the drawer float left at the
    /// last close is used.
    pub fn open(
        &mut self,
        user_id: &str,
        opening_balance: Option<Money>,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        match self.state {
            TillState::Closed => {}
            TillState::Open => return Err(CoreError::TillAlreadyOpen(self.id.clone())),
            TillState::Blocked | TillState::UnderAudit => return Err(self.invalid("open")),
        }
        validation::validate_id("user_id", user_id)?;
        let opening = opening_balance.unwrap_or(self.current_balance);
        validation::validate_non_negative_money("opening_balance", opening)?;

        self.state = TillState::Open;
        self.assigned_user_id = Some(user_id.to_string());
        self.opening_balance = opening;
        self.current_balance = opening;
        self.opened_at = Some(at);
        self.closed_at = None;
        self.updated_at = at;
        Ok(())
    }

    /// Checks that `user_id` may close this till.
    pub fn ensure_closable_by(&self, user_id: &str) -> CoreResult<()> {
        self.ensure_open()?;
        if self.assigned_user_id.as_deref() != Some(user_id) {
            return Err(CoreError::NotAssignedCashier {
                till_id: self.id.clone(),
                user_id: user_id.to_string(),
            });
        }
        Ok(())
    }

    /// `OPEN → CLOSED`, leaving `balance` in the drawer.
    pub fn close(&mut self, user_id: &str, balance: Money, at: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_closable_by(user_id)?;

        self.state = TillState::Closed;
        self.current_balance = balance;
        self.closed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Reverses a close after its closing record was rejected.
    pub fn reopen(&mut self, at: DateTime<Utc>) -> CoreResult<()> {
        if self.state != TillState::Closed {
            return Err(self.invalid("reopen"));
        }
        self.state = TillState::Open;
        self.closed_at = None;
        self.updated_at = at;
        Ok(())
    }

    /// Administrative block from any state. No balance side effects.
    pub fn block(&mut self, reason: &str, at: DateTime<Utc>) -> CoreResult<()> {
        validation::validate_reason("reason", reason)?;
        if self.state == TillState::Blocked {
            return Err(self.invalid("block"));
        }
        self.state = TillState::Blocked;
        self.blocked_reason = Some(reason.trim().to_string());
        self.updated_at = at;
        Ok(())
    }

    /// `BLOCKED → CLOSED`.
    pub fn unblock(&mut self, at: DateTime<Utc>) -> CoreResult<()> {
        if self.state != TillState::Blocked {
            return Err(self.invalid("unblock"));
        }
        self.state = TillState::Closed;
        self.blocked_reason = None;
        self.updated_at = at;
        Ok(())
    }

    /// `CLOSED → UNDER_AUDIT`.
    pub fn start_audit(&mut self, at: DateTime<Utc>) -> CoreResult<()> {
        if self.state != TillState::Closed {
            return Err(self.invalid("start audit"));
        }
        self.state = TillState::UnderAudit;
        self.updated_at = at;
        Ok(())
    }

    /// `UNDER_AUDIT → CLOSED`.
    pub fn finish_audit(&mut self, at: DateTime<Utc>) -> CoreResult<()> {
        if self.state != TillState::UnderAudit {
            return Err(self.invalid("finish audit"));
        }
        self.state = TillState::Closed;
        self.updated_at = at;
        Ok(())
    }
}

// =============================================================================
// Closing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ClosingState {
    Pending,
    Reconciled,
    Approved,
    Rejected,
}

impl ClosingState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ClosingState::Pending => "PENDING",
            ClosingState::Reconciled => "RECONCILED",
            ClosingState::Approved => "APPROVED",
            ClosingState::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ClosingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completed-sale total for one payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentTotal {
    pub method: PaymentMethod,
    pub sale_count: i64,
    pub total: Money,
}

/// End-of-day reconciliation document for one till on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TillClosing {
    pub id: String,
    pub till_id: String,
    #[ts(as = "String")]
    pub business_date: NaiveDate,
    pub opening_balance: Money,
    /// Opening balance plus the day's completed sales, summed from the
    /// sale ledger at close time.
    pub theoretical_closing_balance: Money,
    /// Counted by the operator, or the theoretical balance if not counted.
    pub actual_closing_balance: Money,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub payment_breakdown: Vec<PaymentTotal>,
    pub state: ClosingState,
    pub notes: Option<String>,
    pub closed_by: String,
    #[ts(as = "String")]
    pub closed_at: DateTime<Utc>,
    pub reconciled_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub reconciled_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

/// Inputs gathered by the till manager when a till is closed.
#[derive(Debug, Clone)]
pub struct ClosingDraft {
    pub till_id: String,
    pub business_date: NaiveDate,
    pub opening_balance: Money,
    pub completed_sales_total: Money,
    pub payment_breakdown: Vec<PaymentTotal>,
    pub actual_balance: Option<Money>,
    pub notes: Option<String>,
    pub closed_by: String,
}

impl TillClosing {
    /// Creates a `PENDING` closing from the day's figures.
    ///
    /// ## Errors
    /// `AmountOutOfRange` if opening plus sales leaves the i64 cent range.
    pub fn from_draft(draft: ClosingDraft, at: DateTime<Utc>) -> CoreResult<Self> {
        let theoretical = validation::amount_in_range(
            "theoretical_closing_balance",
            draft.opening_balance.checked_add(draft.completed_sales_total),
        )?;
        Ok(TillClosing {
            id: Uuid::new_v4().to_string(),
            till_id: draft.till_id,
            business_date: draft.business_date,
            opening_balance: draft.opening_balance,
            theoretical_closing_balance: theoretical,
            actual_closing_balance: draft.actual_balance.unwrap_or(theoretical),
            payment_breakdown: draft.payment_breakdown,
            state: ClosingState::Pending,
            notes: draft.notes,
            closed_by: draft.closed_by,
            closed_at: at,
            reconciled_by: None,
            reconciled_at: None,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
        })
    }

    /// `actual − theoretical`, recomputed on every call.
    pub fn difference(&self) -> Money {
        self.actual_closing_balance - self.theoretical_closing_balance
    }

    fn invalid(&self, action: &'static str) -> CoreError {
        CoreError::InvalidClosingTransition {
            closing_id: self.id.clone(),
            state: self.state.to_string(),
            action,
        }
    }

    /// `PENDING → RECONCILED`.
    pub fn reconcile(
        &mut self,
        user_id: &str,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        if self.state != ClosingState::Pending {
            return Err(self.invalid("reconcile"));
        }
        self.state = ClosingState::Reconciled;
        self.reconciled_by = Some(user_id.to_string());
        self.reconciled_at = Some(at);
        if notes.is_some() {
            self.notes = notes;
        }
        Ok(())
    }

    /// `RECONCILED → APPROVED`.
    pub fn approve(&mut self, user_id: &str, at: DateTime<Utc>) -> CoreResult<()> {
        if self.state != ClosingState::Reconciled {
            return Err(self.invalid("approve"));
        }
        self.state = ClosingState::Approved;
        self.approved_by = Some(user_id.to_string());
        self.approved_at = Some(at);
        Ok(())
    }

    /// `PENDING | RECONCILED → REJECTED`. The caller reopens the till.
    pub fn reject(&mut self, user_id: &str, reason: &str, at: DateTime<Utc>) -> CoreResult<()> {
        validation::validate_reason("reason", reason)?;
        if !matches!(self.state, ClosingState::Pending | ClosingState::Reconciled) {
            return Err(self.invalid("reject"));
        }
        self.state = ClosingState::Rejected;
        self.rejected_by = Some(user_id.to_string());
        self.rejected_at = Some(at);
        self.rejection_reason = Some(reason.trim().to_string());
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn open_till(user: &str, opening: i64) -> Till {
        let mut till = Till::new("Front 1", Utc::now());
        till.open(user, Some(Money::from_cents(opening)), Utc::now()).unwrap();
        till
    }

    fn draft(till: &Till, sales: i64, actual: Option<i64>) -> ClosingDraft {
        ClosingDraft {
            till_id: till.id.clone(),
            business_date: NaiveDate::from_ymd_opt(2026, 5, 2).unwrap(),
            opening_balance: till.opening_balance,
            completed_sales_total: Money::from_cents(sales),
            payment_breakdown: Vec::new(),
            actual_balance: actual.map(Money::from_cents),
            notes: None,
            closed_by: "u-1".to_string(),
        }
    }

    #[test]
    fn test_new_till_is_closed() {
        let till = Till::new("Front 1", Utc::now());
        assert_eq!(till.state, TillState::Closed);
        assert!(matches!(till.ensure_open(), Err(CoreError::TillNotOpen(_))));
    }

    #[test]
    fn test_open_twice_fails() {
        let mut till = open_till("u-1", 10_000);
        assert_eq!(till.opening_balance, Money::from_cents(10_000));
        assert!(matches!(
            till.open("u-1", None, Utc::now()),
            Err(CoreError::TillAlreadyOpen(_))
        ));
    }

    #[test]
    fn test_open_carries_float_forward() {
        let mut till = open_till("u-1", 10_000);
        till.close("u-1", Money::from_cents(12_345), Utc::now()).unwrap();
        till.open("u-2", None, Utc::now()).unwrap();
        assert_eq!(till.opening_balance, Money::from_cents(12_345));
        assert_eq!(till.assigned_user_id.as_deref(), Some("u-2"));
    }

    #[test]
    fn test_only_assigned_cashier_closes() {
        let mut till = open_till("u-1", 0);
        let err = till.close("u-2", Money::zero(), Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::NotAssignedCashier { .. }));
        assert!(till.is_open());

        till.close("u-1", Money::zero(), Utc::now()).unwrap();
        assert_eq!(till.state, TillState::Closed);
        assert!(till.closed_at.is_some());
        assert!(matches!(
            till.close("u-1", Money::zero(), Utc::now()),
            Err(CoreError::TillNotOpen(_))
        ));
    }

    #[test]
    fn test_block_and_unblock() {
        let mut till = open_till("u-1", 500);
        till.block("drawer jammed", Utc::now()).unwrap();
        assert_eq!(till.state, TillState::Blocked);
        assert_eq!(till.current_balance, Money::from_cents(500));
        assert!(till.block("again", Utc::now()).is_err());
        assert!(matches!(
            till.open("u-1", None, Utc::now()),
            Err(CoreError::InvalidTillTransition { .. })
        ));

        till.unblock(Utc::now()).unwrap();
        assert_eq!(till.state, TillState::Closed);
        assert!(till.blocked_reason.is_none());
        assert!(till.unblock(Utc::now()).is_err());
    }

    #[test]
    fn test_audit_cycle() {
        let mut till = Till::new("Back", Utc::now());
        till.start_audit(Utc::now()).unwrap();
        assert_eq!(till.state, TillState::UnderAudit);
        assert!(till.start_audit(Utc::now()).is_err());
        till.finish_audit(Utc::now()).unwrap();
        assert_eq!(till.state, TillState::Closed);
    }

    #[test]
    fn test_closing_balances() {
        let till = open_till("u-1", 10_000);

        let closing = TillClosing::from_draft(draft(&till, 25_000, None), Utc::now()).unwrap();
        assert_eq!(closing.theoretical_closing_balance, Money::from_cents(35_000));
        assert_eq!(closing.actual_closing_balance, Money::from_cents(35_000));
        assert_eq!(closing.difference(), Money::zero());
        assert_eq!(closing.state, ClosingState::Pending);

        let short =
            TillClosing::from_draft(draft(&till, 25_000, Some(34_950)), Utc::now()).unwrap();
        assert_eq!(short.difference(), Money::from_cents(-50));
    }

    #[test]
    fn test_closing_workflow() {
        let till = open_till("u-1", 0);
        let mut closing = TillClosing::from_draft(draft(&till, 0, None), Utc::now()).unwrap();

        assert!(closing.approve("mgr", Utc::now()).is_err());
        closing.reconcile("mgr", Some("counted twice".into()), Utc::now()).unwrap();
        assert_eq!(closing.notes.as_deref(), Some("counted twice"));
        closing.approve("mgr", Utc::now()).unwrap();
        assert_eq!(closing.state, ClosingState::Approved);
        assert!(closing.reject("mgr", "late", Utc::now()).is_err());
    }

    #[test]
    fn test_reject_from_pending_or_reconciled() {
        let till = open_till("u-1", 0);

        let mut pending = TillClosing::from_draft(draft(&till, 0, None), Utc::now()).unwrap();
        assert!(pending.reject("mgr", "  ", Utc::now()).is_err());
        pending.reject("mgr", "missing sales", Utc::now()).unwrap();
        assert_eq!(pending.state, ClosingState::Rejected);
        assert_eq!(pending.rejection_reason.as_deref(), Some("missing sales"));

        let mut reconciled = TillClosing::from_draft(draft(&till, 0, None), Utc::now()).unwrap();
        reconciled.reconcile("mgr", None, Utc::now()).unwrap();
        reconciled.reject("mgr", "recount", Utc::now()).unwrap();
        assert!(reconciled.reconcile("mgr", None, Utc::now()).is_err());
    }

    #[test]
    fn test_reopen_only_from_closed() {
        let mut till = open_till("u-1", 0);
        assert!(till.reopen(Utc::now()).is_err());
        till.close("u-1", Money::zero(), Utc::now()).unwrap();
        till.reopen(Utc::now()).unwrap();
        assert!(till.is_open());
        assert!(till.closed_at.is_none());
        assert_eq!(till.assigned_user_id.as_deref(), Some("u-1"));
    }
}
