//! Pair with another device.

use anyhow::Result;
use std::path::Path;

use super::{friendly, Session};

/// Run the pair command with the code shown by the other device.
pub async fn run(data_dir: &Path, code: &str) -> Result<()> {
    let session = Session::open(data_dir, false).await?;
    let device = session.orchestrator.pair(code).await.map_err(friendly)?;

    println!("Paired with {} ({})", device.name, device.id.short());
    println!();
    println!(
        "Run 'journal-sync sync \"{}\"' to send your data.",
        device.name
    );

    session.close().await;
    Ok(())
}
