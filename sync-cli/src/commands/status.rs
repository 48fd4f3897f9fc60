//! Show sync status.

use anyhow::Result;
use chrono::Utc;
use journal_sync_client::{load_collections, RelayStore};
use std::path::Path;

use super::devices::format_age;
use super::{friendly, record_store, Session};
use crate::config::CliConfig;

/// Run the status command.
pub async fn run(data_dir: &Path) -> Result<()> {
    println!("=== journal-sync status ===");
    println!();

    if !CliConfig::exists(data_dir) {
        println!("Device: NOT INITIALIZED");
        println!();
        println!("Run 'journal-sync init --name <name>' to initialize.");
        return Ok(());
    }

    let session = Session::open(data_dir, false).await?;
    let device_id = session.orchestrator.device_id().await.map_err(friendly)?;

    println!("Device:");
    println!("  ID:   {}", device_id);
    println!("  Name: {}", session.config.device.name);
    println!();

    let records = load_collections(&record_store(data_dir)).await?;
    println!("Records:");
    println!("  Entries:      {}", records.entries.len());
    println!("  Expenses:     {}", records.expenses.len());
    println!("  Action items: {}", records.action_items.len());
    println!();

    println!("Relay:");
    println!("  Store:   {}", session.config.relay_path(data_dir).display());
    match session.relay.pending(&device_id).await {
        Ok(pending) => println!("  Pending: {} update(s) waiting", pending.len()),
        Err(e) => println!("  Pending: unknown ({})", e),
    }
    println!();

    let devices = session
        .orchestrator
        .paired_devices()
        .await
        .map_err(friendly)?;
    if devices.is_empty() {
        println!("Paired devices: NONE");
        println!();
        println!("Run 'journal-sync code' here and 'journal-sync pair <code>' on the other device.");
    } else {
        let now = Utc::now();
        println!("Paired devices: {}", devices.len());
        for device in devices {
            let last = device
                .last_sync_at
                .map_or_else(|| "never synced".to_string(), |at| format_age(at, now));
            println!("  {} {} ({})", device.id.short(), device.name, last);
        }
    }

    session.close().await;
    Ok(())
}
