//! Sync with a paired device.

use anyhow::Result;
use journal_sync_core::SyncState;
use std::path::Path;
use tokio::time::{sleep, Instant};

use super::{friendly, Session};

/// Run the sync command.
///
/// With `both`, waits for the other device's push after sending ours.
/// The other device has to run `sync --both` (or plain `sync`) towards us.
pub async fn run(data_dir: &Path, device: &str, both: bool) -> Result<()> {
    let session = Session::open(data_dir, false).await?;
    let target = session.resolve(device).await?;
    let orchestrator = &session.orchestrator;

    let report = if both {
        orchestrator.sync_bidirectional(&target.id).await
    } else {
        orchestrator.sync_with_device(&target.id).await
    }
    .map_err(friendly)?;

    println!(
        "Sent {} bytes to {} via {}",
        report.payload_size, target.name, report.channel
    );

    if both {
        let config = session.config.sync_config();
        let deadline = Instant::now() + config.send_timeout;
        loop {
            orchestrator.poll_relay().await.map_err(friendly)?;
            if orchestrator.sync_state(&target.id) == SyncState::Merged {
                println!("Merged reply from {}", target.name);
                break;
            }
            if Instant::now() >= deadline {
                println!(
                    "No reply from {} within {}s. Run 'journal-sync listen' later to pick it up.",
                    target.name,
                    config.send_timeout.as_secs()
                );
                break;
            }
            sleep(config.relay_poll_interval).await;
        }
    }

    session.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::init;
    use tempfile::tempdir;

    #[tokio::test]
    async fn sync_unknown_device_fails() {
        let dir = tempdir().unwrap();
        init::run(dir.path(), "Laptop", None).await.unwrap();

        let err = run(dir.path(), "Phone", false).await.unwrap_err();
        assert!(err.to_string().contains("no paired device"));
    }
}
