//! CLI command implementations.

pub mod add;
pub mod code;
pub mod devices;
pub mod forget;
pub mod init;
pub mod listen;
pub mod pair;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use journal_sync_client::{
    FileKvStore, KvRecordStore, MemoryRelayStore, RelayError, RelayStore, SqliteRelayStore,
    SyncError, SyncOrchestrator, SyncServices,
};
use journal_sync_types::PairedDevice;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::config::CliConfig;

/// An initialized orchestrator over the data directory's stores.
pub struct Session {
    /// Loaded configuration.
    pub config: CliConfig,
    /// The running orchestrator.
    pub orchestrator: SyncOrchestrator,
    /// The relay store the orchestrator publishes to.
    pub relay: Arc<dyn RelayStore>,
}

impl Session {
    /// Load the configuration and start an orchestrator.
    ///
    /// `listen` starts the standing relay listener.
    pub async fn open(data_dir: &Path, listen: bool) -> Result<Self> {
        let config = CliConfig::load(data_dir).await?;
        let kv = Arc::new(FileKvStore::new(data_dir.join("store")));
        let relay = open_relay(&config, data_dir).await?;

        let services = SyncServices::new(
            kv.clone(),
            Arc::new(KvRecordStore::new(kv)),
            Arc::clone(&relay),
        );
        let orchestrator =
            SyncOrchestrator::new(config.sync_config().with_relay_listen(listen), services);
        orchestrator.initialize().await.map_err(friendly)?;

        Ok(Self {
            config,
            orchestrator,
            relay,
        })
    }

    /// Find a paired device by id, id prefix or name.
    pub async fn resolve(&self, query: &str) -> Result<PairedDevice> {
        let devices = self.orchestrator.paired_devices().await.map_err(friendly)?;
        Ok(resolve_device(devices, query)?)
    }

    /// Stop background tasks.
    pub async fn close(self) {
        self.orchestrator.dispose().await;
    }
}

/// The local record store of a data directory.
pub fn record_store(data_dir: &Path) -> KvRecordStore {
    KvRecordStore::new(Arc::new(FileKvStore::new(data_dir.join("store"))))
}

async fn open_relay(config: &CliConfig, data_dir: &Path) -> Result<Arc<dyn RelayStore>> {
    let path = config.relay_path(data_dir);
    if config.relay.provision {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create relay directory")?;
        }
        let store = SqliteRelayStore::open(&path)
            .await
            .with_context(|| format!("Failed to open relay store {}", path.display()))?;
        return Ok(Arc::new(store));
    }

    match SqliteRelayStore::connect_existing(&path).await {
        Ok(store) => Ok(Arc::new(store)),
        Err(RelayError::NotProvisioned) => {
            warn!(path = %path.display(), "relay store missing, relay sync will fail");
            Ok(Arc::new(MemoryRelayStore::unprovisioned()))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to open relay store {}", path.display())),
    }
}

/// Attach the user-facing message to a sync error.
pub fn friendly(err: SyncError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}

/// Device lookup failures.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Nothing matched.
    #[error("no paired device matches '{0}'. Run 'journal-sync devices' to list them.")]
    NotFound(String),

    /// More than one device matched.
    #[error("'{query}' matches several devices: {}", .candidates.join(", "))]
    Ambiguous {
        /// What the user typed.
        query: String,
        /// Names of the matching devices.
        candidates: Vec<String>,
    },
}

/// Exact id, then exact name (case-insensitive), then unique id prefix.
fn resolve_device(devices: Vec<PairedDevice>, query: &str) -> Result<PairedDevice, ResolveError> {
    if let Some(device) = devices.iter().find(|d| d.id.as_str() == query) {
        return Ok(device.clone());
    }

    let by_name: Vec<&PairedDevice> = devices
        .iter()
        .filter(|d| d.name.eq_ignore_ascii_case(query))
        .collect();
    let matches = if by_name.is_empty() {
        devices
            .iter()
            .filter(|d| d.id.as_str().starts_with(query))
            .collect()
    } else {
        by_name
    };

    match matches.as_slice() {
        [] => Err(ResolveError::NotFound(query.to_string())),
        [device] => Ok((*device).clone()),
        many => Err(ResolveError::Ambiguous {
            query: query.to_string(),
            candidates: many
                .iter()
                .map(|d| format!("{} ({})", d.name, d.id.short()))
                .collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use journal_sync_types::DeviceId;

    fn devices() -> Vec<PairedDevice> {
        vec![
            PairedDevice::new(DeviceId::new("abc123-laptop"), "Laptop"),
            PairedDevice::new(DeviceId::new("abd456-phone"), "Phone"),
            PairedDevice::new(DeviceId::new("ffe789-tablet"), "Phone"),
        ]
    }

    #[test]
    fn resolves_by_id_and_prefix() {
        assert_eq!(
            resolve_device(devices(), "abc123-laptop").unwrap().name,
            "Laptop"
        );
        assert_eq!(resolve_device(devices(), "ffe").unwrap().id.as_str(), "ffe789-tablet");
    }

    #[test]
    fn resolves_by_name_case_insensitive() {
        assert_eq!(
            resolve_device(devices(), "laptop").unwrap().id.as_str(),
            "abc123-laptop"
        );
    }

    #[test]
    fn ambiguous_and_missing() {
        assert!(matches!(
            resolve_device(devices(), "phone"),
            Err(ResolveError::Ambiguous { .. })
        ));
        assert!(matches!(
            resolve_device(devices(), "ab"),
            Err(ResolveError::Ambiguous { .. })
        ));
        assert!(matches!(
            resolve_device(devices(), "zzz"),
            Err(ResolveError::NotFound(_))
        ));
    }
}
