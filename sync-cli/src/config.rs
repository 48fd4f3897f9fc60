//! Local CLI configuration.
//!
//! Stored as `config.toml` in the data directory:
//!
//! ```toml
//! [device]
//! name = "Laptop"
//!
//! [relay]
//! path = "/shared/relay.db"   # default: <data dir>/relay.db
//! provision = true            # create the relay schema if missing
//!
//! [sync]
//! timeout_secs = 30
//! poll_interval_ms = 2000
//! ```

use anyhow::{Context, Result};
use journal_sync_client::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "config.toml";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// This device.
    pub device: DeviceSection,
    /// Relay store location.
    #[serde(default)]
    pub relay: RelaySection,
    /// Sync tuning.
    #[serde(default)]
    pub sync: SyncSection,
}

/// `[device]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSection {
    /// Human-readable device name, embedded in pairing codes.
    pub name: String,
}

/// `[relay]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySection {
    /// Path to the SQLite relay database shared by the devices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Create the relay schema when it is missing.
    #[serde(default = "default_provision")]
    pub provision: bool,
}

/// `[sync]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    /// Bound on one send attempt, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Relay mailbox poll interval, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_provision() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            path: None,
            provision: default_provision(),
        }
    }
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl CliConfig {
    /// Create a configuration for a new device.
    pub fn new(name: &str, relay_path: Option<PathBuf>) -> Self {
        Self {
            device: DeviceSection {
                name: name.to_string(),
            },
            relay: RelaySection {
                path: relay_path,
                ..Default::default()
            },
            sync: SyncSection::default(),
        }
    }

    /// Load the configuration from a data directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Device not initialized. Run 'journal-sync init' first.")?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Reject values the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sync.timeout_secs == 0 {
            anyhow::bail!("sync.timeout_secs must be greater than 0");
        }
        if self.sync.poll_interval_ms == 0 {
            anyhow::bail!("sync.poll_interval_ms must be greater than 0");
        }
        Ok(())
    }

    /// Save the configuration to a data directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(CONFIG_FILE);
        let contents = toml::to_string_pretty(self).context("Failed to encode configuration")?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save configuration")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Check if the device is initialized.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.join(CONFIG_FILE).exists()
    }

    /// Where the relay database lives.
    pub fn relay_path(&self, data_dir: &Path) -> PathBuf {
        self.relay
            .path
            .clone()
            .unwrap_or_else(|| data_dir.join("relay.db"))
    }

    /// Orchestrator configuration for this device.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new(&self.device.name)
            .with_send_timeout(Duration::from_secs(self.sync.timeout_secs))
            .with_relay_poll_interval(Duration::from_millis(self.sync.poll_interval_ms))
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempdir().unwrap();
        let config = CliConfig::new("Laptop", Some(PathBuf::from("/shared/relay.db")));
        config.save(dir.path()).await.unwrap();

        let loaded = CliConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded.device.name, "Laptop");
        assert_eq!(
            loaded.relay_path(dir.path()),
            PathBuf::from("/shared/relay.db")
        );
        assert!(loaded.relay.provision);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: CliConfig = toml::from_str(
            r#"
[device]
name = "Phone"
"#,
        )
        .unwrap();

        assert_eq!(config.sync.timeout_secs, 30);
        assert_eq!(config.sync.poll_interval_ms, 2000);
        assert!(config.relay.path.is_none());
        assert!(config.relay.provision);
    }

    #[test]
    fn sync_section_feeds_orchestrator_config() {
        let config: CliConfig = toml::from_str(
            r#"
[device]
name = "Phone"

[sync]
timeout_secs = 5
poll_interval_ms = 250
"#,
        )
        .unwrap();

        let sync = config.sync_config();
        assert_eq!(sync.device_name, "Phone");
        assert_eq!(sync.send_timeout, Duration::from_secs(5));
        assert_eq!(sync.relay_poll_interval, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn zero_poll_interval_is_rejected() {
        let dir = tempdir().unwrap();
        let mut config = CliConfig::new("Phone", None);
        config.sync.poll_interval_ms = 0;
        config.save(dir.path()).await.unwrap();

        let err = CliConfig::load(dir.path()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("poll_interval_ms must be greater than 0"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = CliConfig::new("Phone", None);
        config.sync.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_relay_lives_in_data_dir() {
        let config = CliConfig::new("Laptop", None);
        assert_eq!(
            config.relay_path(Path::new("/data")),
            PathBuf::from("/data/relay.db")
        );
    }

    #[tokio::test]
    async fn load_without_init_explains() {
        let dir = tempdir().unwrap();
        let err = CliConfig::load(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("journal-sync init"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn config_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        CliConfig::new("Laptop", None).save(dir.path()).await.unwrap();

        let perms = tokio::fs::metadata(dir.path().join(CONFIG_FILE))
            .await
            .unwrap()
            .permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }
}
