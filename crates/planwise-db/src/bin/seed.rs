//! # Seed Data Generator
//!
//! Populates a database with a small household for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p planwise-db --bin seed
//!
//! # Specify database path
//! cargo run -p planwise-db --bin seed -- --db ./data/planwise.db
//! ```
//!
//! ## Generated Records
//! - People: a two-adult household with one child
//! - Categories: therapy, dental, prescriptions, primary care
//! - Plans: a single HMO and a family PPO with different limits
//! - Coverages: plan-wide and category-specific cost sharing
//! - Expenses: monthly costs spread over the year

use std::env;

use planwise_db::{Database, DbConfig, TableStore};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PEOPLE: &[&str] = &["Alex Rivera", "Sam Rivera", "Jamie Rivera"];

const CATEGORIES: &[&str] = &["Therapy", "Dental", "Prescriptions", "Primary care"];

/// (name, monthly premium, family, deductible, out-of-pocket max)
const PLANS: &[(&str, f64, bool, f64, f64)] = &[
    ("Silver HMO", 310.0, false, 1500.0, 6000.0),
    ("Gold PPO Family", 890.0, true, 750.0, 4000.0),
];

/// (person index, category index, name, monthly amount, months)
const EXPENSES: &[(usize, usize, &str, f64, &[u8])] = &[
    (0, 0, "Weekly therapy", 480.0, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]),
    (1, 1, "Crown", 1200.0, &[3]),
    (1, 1, "Cleaning", 120.0, &[2, 8]),
    (2, 2, "Inhaler", 45.0, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]),
    (2, 3, "Checkup", 180.0, &[9]),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./planwise_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Planwise Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./planwise_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    info!(path = %db_path, "Seeding database");
    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.plans().count().await?;
    if existing > 0 {
        warn!(plans = existing, "Database already has plans, skipping seed");
        return Ok(());
    }

    let people = save_all(&db.people(), PEOPLE.iter().map(|n| json!({ "name": n }))).await?;
    let categories =
        save_all(&db.categories(), CATEGORIES.iter().map(|n| json!({ "name": n }))).await?;

    let plans = save_all(
        &db.plans(),
        PLANS.iter().map(|(name, premium, family, deductible, oop)| {
            let in_network = json!({
                "deductible": deductible,
                "familyDeductible": deductible * 2.0,
                "outOfPocketMax": oop,
                "familyOutOfPocketMax": oop * 2.0,
            });
            let out_of_network = json!({
                "deductible": deductible * 2.0,
                "familyDeductible": deductible * 4.0,
                "outOfPocketMax": oop * 2.0,
                "familyOutOfPocketMax": oop * 4.0,
            });
            json!({
                "name": name,
                "premium": premium,
                "isFamilyPlan": family,
                "inNetworkLimit": in_network,
                "outOfNetworkLimit": out_of_network,
            })
        }),
    )
    .await?;

    let coverages = [
        // Global fallback: 20% coinsurance after the deductible
        json!({
            "beforeDeductible": { "type": "percent", "amount": 100 },
            "afterDeductible": { "type": "percent", "amount": 20 },
        }),
        // Therapy is a flat copay on the PPO
        json!({
            "planId": plans[1],
            "categoryId": categories[0],
            "isInNetwork": true,
            "beforeDeductible": { "type": "copay", "amount": 40 },
            "afterDeductible": { "type": "copay", "amount": 25 },
        }),
        // Prescriptions are cheap everywhere
        json!({
            "categoryId": categories[2],
            "beforeDeductible": { "type": "copay", "amount": 15 },
            "afterDeductible": { "type": "copay", "amount": 10 },
        }),
    ];
    save_all(&db.coverages(), coverages.into_iter()).await?;

    save_all(
        &db.expenses(),
        EXPENSES.iter().map(|(person, category, name, amount, months)| {
            json!({
                "name": name,
                "personId": people[*person],
                "categoryId": categories[*category],
                "amount": amount,
                "months": months,
            })
        }),
    )
    .await?;

    for row in db.cost_report().await? {
        info!(
            plan = %row.name,
            premiums = %row.premiums,
            expenses = %row.expenses,
            total = %row.total,
            "Yearly cost"
        );
    }

    info!("Seed complete");
    Ok(())
}

/// Saves every input and returns the minted ids.
async fn save_all(
    store: &TableStore,
    inputs: impl Iterator<Item = Value>,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut ids = Vec::new();
    for input in inputs {
        let record = store.save(input).await?;
        ids.push(record.id().to_string());
    }
    info!(table = %store.table(), count = ids.len(), "Seeded table");
    Ok(ids)
}

/// Log output for the seed run.
///
/// `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,planwise=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
