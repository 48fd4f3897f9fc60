//! Receive updates from paired devices.

use anyhow::Result;
use journal_sync_client::SyncEvent;
use journal_sync_core::MergeSummary;
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{friendly, Session};

/// Run the listen command.
///
/// With `once`, drains the relay mailbox and exits. Otherwise keeps
/// listening until interrupted.
pub async fn run(data_dir: &Path, once: bool) -> Result<()> {
    if once {
        let session = Session::open(data_dir, false).await?;
        let received = session.orchestrator.poll_relay().await.map_err(friendly)?;
        println!("Received {} update(s)", received);
        session.close().await;
        return Ok(());
    }

    let session = Session::open(data_dir, true).await?;
    let mut events = session.orchestrator.subscribe();
    println!("Listening for updates (Ctrl-C to stop)...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SyncEvent::DataChanged { from, summary }) => {
                    println!("Update from {}: {}", from.short(), describe(&summary));
                }
                Ok(SyncEvent::InboundDropped { from, reason }) => {
                    let from = from.map_or_else(|| "unknown".to_string(), |d| d.short());
                    println!("Dropped update from {}: {}", from, reason);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!(missed, "event listener lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.close().await;
    Ok(())
}

/// One-line description of a merge.
fn describe(summary: &MergeSummary) -> String {
    let parts = [
        ("entries", summary.entries),
        ("expenses", summary.expenses),
        ("action items", summary.action_items),
    ];
    parts
        .iter()
        .filter(|(_, stats)| stats.changed())
        .map(|(label, stats)| {
            format!("{} +{} ~{}", label, stats.added, stats.replaced)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use journal_sync_core::MergeStats;

    #[test]
    fn describe_lists_changed_collections() {
        let summary = MergeSummary {
            entries: MergeStats {
                added: 2,
                replaced: 1,
                kept: 0,
            },
            ..Default::default()
        };
        assert_eq!(describe(&summary), "entries +2 ~1");
    }
}
