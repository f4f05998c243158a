//! # Seed Data Generator
//!
//! Populates the database with demo drivers, riders and routes.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in rydex.toml (or ./rydex.db)
//! cargo run -p rydex-db --bin seed
//!
//! # Specify config file or database path
//! cargo run -p rydex-db --bin seed -- --config ./rydex.toml
//! cargo run -p rydex-db --bin seed -- --db ./data/rydex.db
//! ```
//!
//! ## Generated Data
//! - Drivers, each with a vehicle and a shift covering the whole of today
//! - Riders, each with a wallet top-up
//! - Routes between common Lahore destinations
//!
//! Logging follows `RUST_LOG` (default `info`).

use chrono::{Local, NaiveTime};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rydex_core::Money;
use rydex_db::{Database, EngineConfig};

/// (name, email, license, vehicle model, plate, capacity, color)
const DRIVERS: &[(&str, &str, &str, &str, &str, i64, &str)] = &[
    ("Bilal Ahmed", "bilal@rydex.pk", "LHR-10231", "Suzuki Alto", "LEA-4521", 4, "White"),
    ("Usman Tariq", "usman@rydex.pk", "LHR-10877", "Toyota Corolla", "LEB-9932", 4, "Silver"),
    ("Ayesha Khan", "ayesha@rydex.pk", "LHR-11402", "Honda City", "LEC-2210", 4, "Black"),
    ("Hamza Iqbal", "hamza@rydex.pk", "LHR-11954", "Suzuki Bolan", "LED-7781", 7, "Blue"),
];

/// (name, email, wallet top-up in rupees)
const RIDERS: &[(&str, &str, i64)] = &[
    ("Sana Malik", "sana@example.pk", 1_000),
    ("Ali Raza", "ali@example.pk", 100),
    ("Fatima Noor", "fatima@example.pk", 500),
];

/// (origin, destination, km)
const ROUTES: &[(&str, &str, f64)] = &[
    ("FAST Campus", "Gulberg", 2.5),
    ("Model Town", "Liberty Market", 6.8),
    ("DHA Phase 5", "Allama Iqbal Airport", 12.4),
    ("Johar Town", "Emporium Mall", 1.9),
    ("Anarkali", "Badshahi Mosque", 3.2),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Rydex Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: ./rydex.toml)");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = EngineConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("Rydex Seed Data Generator");
    println!("=========================");
    println!("Database: {}", config.database.path.display());
    println!();

    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let dir = db.directory();
    let existing = dir.list_drivers().await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} drivers", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let today = Local::now().date_naive();
    let shift_start = NaiveTime::MIN;
    let shift_end = NaiveTime::from_hms_opt(23, 59, 59).ok_or("invalid shift end")?;

    println!();
    println!("Drivers:");
    for (name, email, license, model, plate, capacity, color) in DRIVERS {
        let driver = dir.register_driver(name, email, license).await?;
        dir.assign_vehicle(&driver.driver_id, model, plate, *capacity, Some(*color))
            .await?;
        dir.add_shift(&driver.driver_id, today, shift_start, shift_end)
            .await?;
        println!("  {}  {} ({} {})", driver.driver_id, name, model, plate);
    }

    println!();
    println!("Riders:");
    for (name, email, rupees) in RIDERS {
        let rider = dir.register_rider(name, email).await?;
        let balance = db
            .wallets()
            .credit(&rider.rider_id, Money::from_major_minor(*rupees, 0))
            .await?;
        println!("  {}  {} (wallet {})", rider.rider_id, name, balance);
    }

    println!();
    println!("Routes:");
    let fare = config.fare_policy();
    for (origin, destination, km) in ROUTES {
        let route = dir.add_route(origin, destination, *km).await?;
        println!(
            "  {}  {} → {} ({} km, fare {})",
            route.route_id,
            origin,
            destination,
            km,
            fare.fare(*km)?
        );
    }

    println!();
    println!("✓ Seed complete");

    db.close().await;
    Ok(())
}
