//! # Seed Data Generator
//!
//! Populates a development database with a spaza/fast-food catalogue, an
//! opening delivery per shelf item and a handful of sales. Everything goes
//! through the logged write helpers, so the operation log fills up exactly
//! as it would at a real till.
//!
//! ## Usage
//! ```bash
//! cargo run -p sapos-db --bin seed
//!
//! # Specify database path (or set SAPOS_DB_PATH)
//! cargo run -p sapos-db --bin seed -- --db ./data/sapos.db
//!
//! # Number of sales to ring up
//! cargo run -p sapos-db --bin seed -- --sales 50
//! ```

use sapos_core::{ItemMode, MovementType, NewItem, NewSale, NewStockMovement, SaleLine};
use sapos_db::{Database, DbConfig};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (name, price in cents, opening stock, category, mode)
const CATALOGUE: &[(&str, i64, i64, &str, ItemMode)] = &[
    ("Kota Full House", 4500, 0, "food", ItemMode::Fastfood),
    ("Kota Quarter", 2500, 0, "food", ItemMode::Fastfood),
    ("Amagwinya", 300, 0, "food", ItemMode::Fastfood),
    ("Chips Small", 1500, 0, "food", ItemMode::Fastfood),
    ("Bread White 700g", 1899, 20, "bakery", ItemMode::Spaza),
    ("Milk 1L", 2199, 24, "dairy", ItemMode::Spaza),
    ("Maize Meal 2.5kg", 4299, 10, "grocery", ItemMode::Spaza),
    ("Sugar 1kg", 2599, 12, "grocery", ItemMode::Spaza),
    ("Airtime R10", 1000, 0, "airtime", ItemMode::Spaza),
    ("Coke 300ml", 1200, 48, "drinks", ItemMode::Both),
    ("Stoney 440ml", 1400, 24, "drinks", ItemMode::Both),
    ("Simba Chips 36g", 900, 30, "snacks", ItemMode::Both),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sapos=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut config = DbConfig::from_env_or("./sapos_dev.db");
    let mut sales_to_ring: usize = 20;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config = DbConfig::new(&args[i + 1]);
                    i += 1;
                }
            }
            "--sales" | "-s" => {
                if i + 1 < args.len() {
                    sales_to_ring = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("SA POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>     Database file path (default: $SAPOS_DB_PATH or ./sapos_dev.db)");
                println!("  -s, --sales <N>     Number of sales to ring up (default: 20)");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(path = %config.database_path.display(), "Seeding database");
    let db = Database::new(config).await?;

    if !db.items().list_active().await?.is_empty() {
        warn!("Database already has items, skipping seed. Delete the file to regenerate.");
        return Ok(());
    }

    let mut items = Vec::with_capacity(CATALOGUE.len());
    for (name, price_cents, initial_stock, category, mode) in CATALOGUE {
        let item = db
            .items()
            .create(NewItem {
                name: name.to_string(),
                price_cents: *price_cents,
                initial_stock: *initial_stock,
                category: Some(category.to_string()),
                mode: *mode,
                ..Default::default()
            })
            .await?;

        if *initial_stock > 0 {
            db.stock_movements()
                .record(NewStockMovement {
                    item_id: item.id.clone(),
                    quantity: initial_stock / 2,
                    movement_type: MovementType::Delivery,
                    notes: Some("seed delivery".to_string()),
                })
                .await?;
        }

        items.push(item);
    }
    info!(count = items.len(), "Created items");

    for n in 0..sales_to_ring {
        let lines = items
            .iter()
            .skip(n % items.len())
            .take(1 + n % 3)
            .map(|item| SaleLine {
                item_id: item.id.clone(),
                name: item.name.clone(),
                price_cents: item.price_cents,
                quantity: 1 + (n % 2) as i64,
            })
            .collect();

        db.sales().record(NewSale { lines }).await?;
    }
    info!(count = sales_to_ring, "Rang up sales");

    let pending = db.operation_log().count_pending().await?;
    let identity = db.device_identity().await?;
    info!(
        pending,
        device_id = %identity.device_id,
        device_seq = identity.device_seq,
        "Seed complete"
    );

    for item in items.iter().filter(|i| i.initial_stock > 0).take(3) {
        let stock = db.compute_stock(&item.id).await?;
        info!(item = %item.name, stock, "Derived stock");
    }

    db.close().await;
    Ok(())
}
