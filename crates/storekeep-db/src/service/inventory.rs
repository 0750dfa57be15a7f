//! # Inventory Ledger
//!
//! Owns on-hand and reserved quantities per product and the movement trail.
//!
//! ## Reservation vs. Movement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  reserve(p, q)      reserved += q          no movement row             │
//! │  release(p, q)      reserved −= q          no movement row             │
//! │  adjust(p, q, OUT)  on_hand  −= q          movement row (before/after) │
//! │                                                                         │
//! │  available = on_hand − reserved, computed on read, never stored        │
//! │                                                                         │
//! │  Every mutation claims the product row first, so two writers on the    │
//! │  same product never both pass a stock check against a stale read.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use storekeep_core::validation;
use storekeep_core::{
    AlertState, CoreError, MovementKind, NewProduct, Product, Quantity, Reservation,
    StockMovement, StockValuation,
};
use tracing::{info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::repository::ProductRepository;

/// One permanent stock change, as recorded in the movement trail.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MovementRequest<'a> {
    pub kind: MovementKind,
    pub quantity: Quantity,
    pub reason: &'a str,
    pub acting_user_id: &'a str,
    pub reference_id: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct InventoryLedger {
    pool: SqlitePool,
    products: ProductRepository,
}

impl InventoryLedger {
    pub fn new(pool: SqlitePool) -> Self {
        let products = ProductRepository::new(pool.clone());
        InventoryLedger { pool, products }
    }

    // =========================================================================
    // Product lifecycle
    // =========================================================================

    /// Creates a stock record. A seeded quantity is booked as an `IN` movement.
    pub async fn register_product(
        &self,
        new_product: NewProduct,
        acting_user_id: &str,
    ) -> ServiceResult<Product> {
        new_product.validate()?;
        validation::validate_id("acting_user_id", acting_user_id)?;

        let now = Utc::now();
        let initial = new_product.initial_quantity;
        let mut product = new_product.into_product(now);

        let mut tx = self.pool.begin().await?;
        if let Some(existing) = ProductRepository::find_by_sku(&mut tx, &product.sku).await? {
            warn!(sku = %product.sku, existing = %existing.id, "Duplicate SKU");
            return Err(duplicate_sku(&product.sku, existing.id).into());
        }
        ProductRepository::insert(&mut tx, &product)
            .await
            .map_err(|err| {
                if err.is_unique_violation_on("products.sku") {
                    duplicate_sku(&product.sku, &product.id).into()
                } else {
                    ServiceError::from(err)
                }
            })?;

        if initial.is_positive() {
            let change = product.apply_movement(MovementKind::In, initial)?;
            ProductRepository::save(&mut tx, &product).await?;
            let movement =
                StockMovement::record(&product, change, "Initial stock", acting_user_id, None, now);
            ProductRepository::insert_movement(&mut tx, &movement).await?;
        }

        tx.commit().await?;

        info!(
            id = %product.id,
            sku = %product.sku,
            on_hand = %product.quantity_on_hand,
            "Product registered"
        );
        Ok(product)
    }

    pub async fn get_product(&self, product_id: &str) -> ServiceResult<Product> {
        self.products
            .get_by_id(product_id)
            .await?
            .ok_or_else(|| CoreError::not_found("product", product_id).into())
    }

    /// Soft deactivation: the product keeps its history but can no longer
    /// be reserved.
    pub async fn deactivate_product(&self, product_id: &str) -> ServiceResult<Product> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut product = Self::locked(&mut tx, product_id, now).await?;
        product.is_active = false;
        product.updated_at = now;
        ProductRepository::save(&mut tx, &product).await?;

        tx.commit().await?;

        info!(id = %product.id, "Product deactivated");
        Ok(product)
    }

    // =========================================================================
    // Reservations
    // =========================================================================

    /// Places a hold on `quantity` of the product.
    pub async fn reserve(
        &self,
        product_id: &str,
        quantity: Quantity,
    ) -> ServiceResult<Reservation> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let (_, reservation) = Self::reserve_on(&mut tx, product_id, quantity, now).await?;
        tx.commit().await?;
        Ok(reservation)
    }

    /// Drops a hold of `quantity` on the product.
    ///
    /// ## Errors
    /// `ReleaseExceedsReserved` if more is released than is reserved.
    pub async fn release(&self, product_id: &str, quantity: Quantity) -> ServiceResult<Product> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let product = Self::release_on(&mut tx, product_id, quantity, now).await?;
        tx.commit().await?;
        Ok(product)
    }

    /// Releases exactly what `reservation` holds.
    pub async fn release_reservation(&self, reservation: Reservation) -> ServiceResult<Product> {
        let (product_id, quantity) = reservation.into_parts();
        self.release(&product_id, quantity).await
    }

    /// `true` when `available ≥ quantity`. Pure read.
    pub async fn has_sufficient_stock(
        &self,
        product_id: &str,
        quantity: Quantity,
    ) -> ServiceResult<bool> {
        let product = self.get_product(product_id).await?;
        Ok(product.has_sufficient_stock(quantity))
    }

    // =========================================================================
    // Movements
    // =========================================================================

    /// Applies a permanent stock change and appends its movement record.
    ///
    /// ## Semantics per kind
    /// ```text
    /// IN, RETURN       on_hand += qty
    /// OUT, TRANSFER    on_hand −= qty   InsufficientStock if available < qty
    /// ADJUSTMENT       on_hand  = qty   (physical count)
    /// ```
    pub async fn adjust(
        &self,
        product_id: &str,
        quantity: Quantity,
        kind: MovementKind,
        reason: &str,
        acting_user_id: &str,
    ) -> ServiceResult<StockMovement> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let request = MovementRequest {
            kind,
            quantity,
            reason,
            acting_user_id,
            reference_id: None,
        };
        let (product, movement) = Self::adjust_on(&mut tx, product_id, request, now).await?;

        tx.commit().await?;

        info!(
            product_id = %product.id,
            kind = ?movement.kind,
            before = %movement.quantity_before,
            after = %movement.quantity_after,
            alert = ?product.alert_state(),
            "Stock adjusted"
        );
        Ok(movement)
    }

    /// Audit trail of one product, oldest first.
    pub async fn movements_for_product(
        &self,
        product_id: &str,
    ) -> ServiceResult<Vec<StockMovement>> {
        self.get_product(product_id).await?;
        Ok(self.products.movements_for(product_id).await?)
    }

    /// Movements booked against a business document, e.g. a sale.
    pub async fn movements_for_reference(
        &self,
        reference_id: &str,
    ) -> ServiceResult<Vec<StockMovement>> {
        Ok(self.products.movements_by_reference(reference_id).await?)
    }

    // =========================================================================
    // Reporting queries
    // =========================================================================

    /// Active products whose alert state is one of `kinds`.
    ///
    /// An empty `kinds` selects every state except `NORMAL`.
    pub async fn get_alert_list(&self, kinds: &[AlertState]) -> ServiceResult<Vec<Product>> {
        let products = self.products.list_active().await?;

        Ok(products
            .into_iter()
            .filter(|product| {
                let state = product.alert_state();
                if kinds.is_empty() {
                    state != AlertState::Normal
                } else {
                    kinds.contains(&state)
                }
            })
            .collect())
    }

    /// Cost and retail value of all active stock.
    pub async fn get_valuation(&self) -> ServiceResult<StockValuation> {
        let products = self.products.list_active().await?;
        Ok(StockValuation::of(&products)?)
    }

    // =========================================================================
    // Unit-of-work building blocks (shared with SaleOrchestrator)
    // =========================================================================

    async fn locked(
        conn: &mut SqliteConnection,
        product_id: &str,
        at: DateTime<Utc>,
    ) -> ServiceResult<Product> {
        ProductRepository::lock(conn, product_id, at)
            .await?
            .ok_or_else(|| ServiceError::from(CoreError::not_found("product", product_id)))
    }

    pub(crate) async fn reserve_on(
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: Quantity,
        at: DateTime<Utc>,
    ) -> ServiceResult<(Product, Reservation)> {
        let mut product = Self::locked(conn, product_id, at).await?;

        let reservation = match product.reserve(quantity) {
            Ok(reservation) => reservation,
            Err(err) => {
                warn!(
                    product_id = %product_id,
                    requested = %quantity,
                    available = %product.available(),
                    error = %err,
                    "Reservation rejected"
                );
                return Err(err.into());
            }
        };

        product.updated_at = at;
        ProductRepository::save(conn, &product).await?;
        Ok((product, reservation))
    }

    pub(crate) async fn release_on(
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: Quantity,
        at: DateTime<Utc>,
    ) -> ServiceResult<Product> {
        let mut product = Self::locked(conn, product_id, at).await?;

        if let Err(err) = product.release(quantity) {
            warn!(product_id = %product_id, error = %err, "Release rejected");
            return Err(err.into());
        }

        product.updated_at = at;
        ProductRepository::save(conn, &product).await?;
        Ok(product)
    }

    pub(crate) async fn adjust_on(
        conn: &mut SqliteConnection,
        product_id: &str,
        request: MovementRequest<'_>,
        at: DateTime<Utc>,
    ) -> ServiceResult<(Product, StockMovement)> {
        validation::validate_reason("reason", request.reason)?;
        validation::validate_id("acting_user_id", request.acting_user_id)?;

        let mut product = Self::locked(conn, product_id, at).await?;

        let change = match product.apply_movement(request.kind, request.quantity) {
            Ok(change) => change,
            Err(err) => {
                warn!(
                    product_id = %product_id,
                    kind = ?request.kind,
                    requested = %request.quantity,
                    error = %err,
                    "Stock movement rejected"
                );
                return Err(err.into());
            }
        };

        product.updated_at = at;
        ProductRepository::save(conn, &product).await?;

        let movement = StockMovement::record(
            &product,
            change,
            request.reason.trim(),
            request.acting_user_id,
            request.reference_id.map(str::to_string),
            at,
        );
        ProductRepository::insert_movement(conn, &movement).await?;

        Ok((product, movement))
    }
}

fn duplicate_sku(sku: &str, product_id: impl Into<String>) -> CoreError {
    CoreError::DuplicateSku {
        sku: sku.to_string(),
        product_id: product_id.into(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
