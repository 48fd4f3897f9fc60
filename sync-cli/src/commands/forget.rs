//! Forget paired devices.

use anyhow::Result;
use std::path::Path;

use super::{friendly, Session};

/// Run the forget command.
pub async fn run(data_dir: &Path, all: bool) -> Result<()> {
    if !all {
        anyhow::bail!("Refusing to forget devices without --all");
    }

    let session = Session::open(data_dir, false).await?;
    let count = session
        .orchestrator
        .paired_devices()
        .await
        .map_err(friendly)?
        .len();
    session
        .orchestrator
        .forget_all_devices()
        .await
        .map_err(friendly)?;

    println!("Forgot {} device(s).", count);
    session.close().await;
    Ok(())
}
