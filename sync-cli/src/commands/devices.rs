//! List paired devices.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;

use super::{friendly, Session};

/// Run the devices command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let session = Session::open(data_dir, false).await?;
    let mut devices = session
        .orchestrator
        .paired_devices()
        .await
        .map_err(friendly)?;
    session.close().await;

    if devices.is_empty() {
        println!("No paired devices.");
        println!();
        println!("Run 'journal-sync pair <code>' with the code shown on the other device.");
        return Ok(());
    }

    devices.sort_by(|a, b| b.paired_at.cmp(&a.paired_at));
    let now = Utc::now();
    for device in devices {
        println!("{}  {}", device.id.short(), device.name);
        println!("    paired:    {}", format_age(device.paired_at, now));
        println!(
            "    last sync: {}",
            device
                .last_sync_at
                .map_or_else(|| "never".to_string(), |at| format_age(at, now))
        );
    }
    Ok(())
}

/// Format a point in time relative to `now`.
pub fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - at).num_seconds().max(0);

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn format_age_works() {
        let now = Utc::now();

        assert_eq!(format_age(now, now), "just now");
        assert!(format_age(now - Duration::seconds(120), now).contains("minutes"));
        assert!(format_age(now - Duration::seconds(7200), now).contains("hours"));
        assert!(format_age(now - Duration::seconds(172800), now).contains("days"));
    }

    #[test]
    fn future_timestamps_are_just_now() {
        let now = Utc::now();
        assert_eq!(format_age(now + Duration::seconds(30), now), "just now");
    }
}
