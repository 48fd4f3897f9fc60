//! Initialize device identity.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::Session;
use crate::config::CliConfig;

/// Run the init command.
pub async fn run(data_dir: &Path, name: &str, relay: Option<PathBuf>) -> Result<()> {
    if CliConfig::exists(data_dir) {
        anyhow::bail!(
            "Device already initialized at {}. Remove it first to re-initialize.",
            data_dir.display()
        );
    }

    let relay = match relay {
        Some(path) if path.is_relative() => Some(
            std::env::current_dir()
                .context("Failed to resolve relay path")?
                .join(path),
        ),
        other => other,
    };
    CliConfig::new(name, relay).save(data_dir).await?;

    let session = Session::open(data_dir, false).await?;
    let device_id = session.orchestrator.device_id().await?;

    println!("Device initialized!");
    println!("  ID:    {}", device_id);
    println!("  Name:  {}", name);
    println!(
        "  Relay: {}",
        session.config.relay_path(data_dir).display()
    );
    println!();
    println!("Next: run 'journal-sync code' here and 'journal-sync pair <code>' on the other device.");

    session.close().await;
    Ok(())
}
