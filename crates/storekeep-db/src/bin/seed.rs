//! # Seed Data Generator
//!
//! Populates the database with demo products and tills for development.
//!
//! ## Usage
//! ```bash
//! # Seed the database from STOREKEEP_DB_PATH (or ./storekeep.db)
//! cargo run -p storekeep-db --bin seed
//!
//! # Specify database path
//! cargo run -p storekeep-db --bin seed -- --db ./data/store.db
//!
//! # More tills
//! cargo run -p storekeep-db --bin seed -- --tills 4
//! ```
//!
//! Log level follows `RUST_LOG`, defaulting to `info,storekeep=debug,sqlx=warn`.

use std::env;
use std::path::PathBuf;
use storekeep_core::{Money, NewProduct, Percentage, Quantity};
use storekeep_db::{ProductRepository, StoreConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SEED_USER: &str = "seed";

/// (sku, name, price cents, cost cents, tax bps, on hand, reorder threshold)
const PRODUCTS: &[(&str, &str, i64, i64, u32, i64, i64)] = &[
    ("BEV-COLA-355", "Cola 355ml", 150, 90, 1600, 120, 24),
    ("BEV-WATER-600", "Still Water 600ml", 100, 45, 0, 200, 48),
    ("BEV-JUICE-1L", "Orange Juice 1L", 320, 210, 1600, 30, 12),
    ("SNK-CHIPS-45", "Potato Chips 45g", 180, 110, 800, 60, 20),
    ("SNK-CHOC-50", "Milk Chocolate 50g", 210, 120, 800, 8, 15),
    ("DRY-MILK-1L", "Whole Milk 1L", 260, 190, 0, 3, 18),
    ("DRY-EGGS-12", "Eggs Dozen", 450, 330, 0, 0, 10),
    ("GRO-RICE-1KG", "Long Grain Rice 1kg", 390, 250, 0, 75, 15),
    ("GRO-PASTA-500", "Spaghetti 500g", 240, 140, 0, 90, 20),
    ("HOM-SOAP-3", "Hand Soap 3-Pack", 560, 300, 1600, 25, 6),
];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,storekeep=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut config = StoreConfig::from_env();
    let mut till_count: usize = 2;

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.db.database_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--tills" | "-t" => {
                if i + 1 < args.len() {
                    till_count = args[i + 1].parse().unwrap_or(2);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Storekeep Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: $STOREKEEP_DB_PATH or ./storekeep.db)");
                println!("  -t, --tills <N>    Number of tills to create (default: 2)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    info!(path = %config.db.database_path.display(), "Seeding database");
    let db = config.connect().await?;

    let existing = ProductRepository::new(db.pool().clone()).count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        return Ok(());
    }

    let inventory = db.inventory();
    for &(sku, name, price, cost, tax_bps, on_hand, reorder) in PRODUCTS {
        let product = NewProduct {
            sku: sku.to_string(),
            name: name.to_string(),
            reorder_threshold: Quantity::from_units(reorder),
            max_threshold: Some(Quantity::from_units(reorder * 10)),
            average_cost: Money::from_cents(cost),
            sale_price: Money::from_cents(price),
            tax_rate: Percentage::from_bps(tax_bps),
            initial_quantity: Quantity::from_units(on_hand),
        };

        match inventory.register_product(product, SEED_USER).await {
            Ok(product) => {
                info!(sku = %product.sku, alert = ?product.alert_state(), "Product seeded")
            }
            Err(err) => warn!(sku = %sku, error = %err, "Failed to seed product"),
        }
    }

    let tills = db.tills();
    for n in 1..=till_count {
        let till = tills.create_till(&format!("Till {n}")).await?;
        info!(id = %till.id, name = %till.name, "Till seeded");
    }

    let valuation = inventory.get_valuation().await?;
    let alerts = inventory.get_alert_list(&[]).await?;
    info!(
        products = PRODUCTS.len(),
        tills = till_count,
        cost_value = %valuation.cost_value,
        retail_value = %valuation.retail_value,
        alerts = alerts.len(),
        "Seed complete"
    );

    db.close().await;
    Ok(())
}
