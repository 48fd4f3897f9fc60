//! Paired device registry entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DeviceId;

/// A device this device has paired with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairedDevice {
    /// The remote device's identifier.
    pub id: DeviceId,
    /// Display name from the pairing code.
    pub name: String,
    /// When the pairing happened.
    pub paired_at: DateTime<Utc>,
    /// Last successful sync with this device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl PairedDevice {
    /// A freshly paired device that has never synced.
    pub fn new(id: DeviceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            paired_at: Utc::now(),
            last_sync_at: None,
        }
    }
}
