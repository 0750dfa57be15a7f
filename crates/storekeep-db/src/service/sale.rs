//! # Sale Orchestrator
//!
//! Rings up and voids sales. Each operation is a single transaction across
//! the till, product, sale and movement tables.
//!
//! ## Create Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. lock till            → TillNotOpen                                │
//! │   2. per line:                                                          │
//! │        reserve(product)   → InsufficientStock / ProductInactive        │
//! │        price line         (product snapshot from the locked row)       │
//! │   3. totals, change       → InvalidPaymentAmount                       │
//! │   4. next invoice number  (counter row, same transaction)              │
//! │   5. insert sale + lines  (state COMPLETED)                            │
//! │   6. per reservation:                                                   │
//! │        release + OUT movement referencing the sale                     │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any failure drops the transaction: reservations already taken on      │
//! │  earlier lines disappear with it and the invoice number is not used.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use storekeep_core::validation;
use storekeep_core::{
    CoreError, InvoiceFormat, LineAmounts, MovementKind, NewSale, Reservation, Sale, SaleLine,
    SaleState, SaleTotals,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::repository::{SaleRepository, TillRepository};
use crate::service::inventory::{InventoryLedger, MovementRequest};

#[derive(Debug, Clone)]
pub struct SaleOrchestrator {
    pool: SqlitePool,
    sales: SaleRepository,
    invoice_format: InvoiceFormat,
}

impl SaleOrchestrator {
    pub fn new(pool: SqlitePool, invoice_format: InvoiceFormat) -> Self {
        let sales = SaleRepository::new(pool.clone());
        SaleOrchestrator {
            pool,
            sales,
            invoice_format,
        }
    }

    /// Creates a `COMPLETED` sale and books its stock out.
    ///
    /// ## Errors
    /// - `Validation` for malformed requests (nothing is touched)
    /// - `TillNotOpen`
    /// - `InsufficientStock` / `ProductInactive` for the first line that
    ///   cannot be reserved
    /// - `InvalidPaymentAmount` when cash tendered is below the total
    pub async fn create_sale(&self, request: NewSale) -> ServiceResult<Sale> {
        request.validate()?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let till = TillRepository::lock(&mut tx, &request.till_id, now)
            .await?
            .ok_or_else(|| ServiceError::from(CoreError::not_found("till", &request.till_id)))?;
        if let Err(err) = till.ensure_open() {
            warn!(till_id = %till.id, state = %till.state, "Sale rejected: till not open");
            return Err(err.into());
        }

        let sale_id = Uuid::new_v4().to_string();
        let mut reservations: Vec<Reservation> = Vec::with_capacity(request.lines.len());
        let mut amounts: Vec<LineAmounts> = Vec::with_capacity(request.lines.len());
        let mut lines: Vec<SaleLine> = Vec::with_capacity(request.lines.len());

        for (index, line) in request.lines.iter().enumerate() {
            let (product, reservation) =
                InventoryLedger::reserve_on(&mut tx, &line.product_id, line.quantity, now).await?;
            let line_amounts = line.amounts_for(&product)?;

            lines.push(SaleLine::build(
                &sale_id,
                index as i64 + 1,
                &product,
                line,
                &line_amounts,
            ));
            amounts.push(line_amounts);
            reservations.push(reservation);
        }

        let totals = SaleTotals::from_lines(&amounts)?;
        let change_due = match totals.change_for(request.cash_tendered) {
            Ok(change) => change,
            Err(err) => {
                warn!(
                    till_id = %till.id,
                    grand_total = %totals.grand_total,
                    "Sale rejected: tender too low"
                );
                return Err(err.into());
            }
        };

        let sequence = SaleRepository::next_sequence(&mut tx).await?;
        let sale = Sale {
            id: sale_id,
            invoice_number: self.invoice_format.format(sequence),
            sequence_number: sequence,
            state: SaleState::Completed,
            customer_id: request.customer_id,
            cashier_id: request.cashier_id,
            till_id: request.till_id,
            subtotal: totals.subtotal,
            discount_total: totals.discount_total,
            tax_total: totals.tax_total,
            grand_total: totals.grand_total,
            payment_method: request.payment_method,
            cash_tendered: request.cash_tendered,
            change_due,
            business_date: now.date_naive(),
            created_at: now,
            completed_at: Some(now),
            voided_at: None,
            void_reason: None,
        };

        SaleRepository::insert(&mut tx, &sale).await?;
        for line in &lines {
            SaleRepository::insert_line(&mut tx, line).await?;
        }

        let reason = format!("Sale {}", sale.invoice_number);
        for reservation in reservations {
            Self::fulfil(&mut tx, reservation, &reason, &sale, now).await?;
        }

        tx.commit().await?;

        info!(
            sale_id = %sale.id,
            invoice_number = %sale.invoice_number,
            till_id = %sale.till_id,
            lines = lines.len(),
            grand_total = %sale.grand_total,
            "Sale completed"
        );
        Ok(sale)
    }

    /// Voids a `PENDING` or `COMPLETED` sale and returns its stock.
    ///
    /// Each line is booked back as a `RETURN` movement referencing the sale.
    /// The till is not touched.
    pub async fn void_sale(&self, sale_id: &str, reason: &str) -> ServiceResult<Sale> {
        validation::validate_reason("reason", reason)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut sale = SaleRepository::lock(&mut tx, sale_id)
            .await?
            .ok_or_else(|| ServiceError::from(CoreError::not_found("sale", sale_id)))?;
        if let Err(err) = sale.void(reason, now) {
            warn!(sale_id = %sale_id, state = %sale.state, "Void rejected");
            return Err(err.into());
        }
        SaleRepository::save_state(&mut tx, &sale).await?;

        let movement_reason = format!("Void of {}", sale.invoice_number);
        for line in SaleRepository::lines_on(&mut tx, &sale.id).await? {
            InventoryLedger::adjust_on(
                &mut tx,
                &line.product_id,
                MovementRequest {
                    kind: MovementKind::Return,
                    quantity: line.quantity,
                    reason: &movement_reason,
                    acting_user_id: &sale.cashier_id,
                    reference_id: Some(&sale.id),
                },
                now,
            )
            .await?;
        }

        tx.commit().await?;

        info!(
            sale_id = %sale.id,
            invoice_number = %sale.invoice_number,
            reason = %reason,
            "Sale voided"
        );
        Ok(sale)
    }

    /// The invoice number the next sale will get. Does not consume it.
    pub async fn next_invoice_number(&self) -> ServiceResult<String> {
        let current = self.sales.current_sequence().await?;
        Ok(self.invoice_format.format(current + 1))
    }

    pub async fn get_sale(&self, sale_id: &str) -> ServiceResult<Sale> {
        self.sales
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| CoreError::not_found("sale", sale_id).into())
    }

    pub async fn get_sale_by_invoice(&self, invoice_number: &str) -> ServiceResult<Sale> {
        self.sales
            .get_by_invoice(invoice_number)
            .await?
            .ok_or_else(|| CoreError::not_found("sale", invoice_number).into())
    }

    pub async fn sale_lines(&self, sale_id: &str) -> ServiceResult<Vec<SaleLine>> {
        Ok(self.sales.get_lines(sale_id).await?)
    }

    pub async fn completed_sales_for(
        &self,
        till_id: &str,
        date: NaiveDate,
    ) -> ServiceResult<Vec<Sale>> {
        Ok(self.sales.completed_for(till_id, date).await?)
    }

    /// Turns a reservation into a permanent `OUT` movement.
    async fn fulfil(
        conn: &mut SqliteConnection,
        reservation: Reservation,
        reason: &str,
        sale: &Sale,
        at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let (product_id, quantity) = reservation.into_parts();

        InventoryLedger::release_on(conn, &product_id, quantity, at).await?;
        InventoryLedger::adjust_on(
            conn,
            &product_id,
            MovementRequest {
                kind: MovementKind::Out,
                quantity,
                reason,
                acting_user_id: &sale.cashier_id,
                reference_id: Some(&sale.id),
            },
            at,
        )
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
