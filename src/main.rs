//! Wardboard
//!
//! Opens the configured store and prints the dashboard snapshot.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wardboard::{config, db, views, DepartmentDesk, EncounterTracker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize logger
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Arc::new(config::load_config().context("failed to load configuration")?);

    // Connect to database
    let store = db::open_store(&config.store)
        .await
        .context("failed to open document store")?;

    let tracker = EncounterTracker::new(store.clone(), config.clone());
    let desk = DepartmentDesk::new(store, config.clone());

    let patients = tracker.patients().await?;
    let stats = views::dashboard_stats(
        &patients,
        &desk.surgeries().await?,
        &desk.lab_orders().await?,
        &config,
    );
    let emergency = views::emergency_board(&patients, Utc::now());

    info!(
        patients = patients.len(),
        waiting_room = emergency.waiting_room,
        "Wardboard ready on {} store",
        config.store.backend
    );
    for (kpi, rating) in stats.ratings() {
        info!("{kpi}: {rating:?}");
    }
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
