//! Sync payload and relay mailbox record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActionItem, DeviceId, Expense, JournalEntry, WireError};

/// Snapshot of all three collections, exchanged wholesale in one sync.
///
/// A collection that is `None` was not sent at all (the receiver leaves
/// its own copy alone); `Some(vec![])` was sent and is empty. The
/// distinction survives [`SyncPayload::to_json`] / [`SyncPayload::from_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    /// Journal entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<JournalEntry>>,
    /// Expenses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expenses: Option<Vec<Expense>>,
    /// Action items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_items: Option<Vec<ActionItem>>,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

impl SyncPayload {
    /// Build a full snapshot stamped now.
    pub fn snapshot(
        entries: Vec<JournalEntry>,
        expenses: Vec<Expense>,
        action_items: Vec<ActionItem>,
    ) -> Self {
        Self {
            entries: Some(entries),
            expenses: Some(expenses),
            action_items: Some(action_items),
            timestamp: Utc::now(),
        }
    }

    /// Total number of records across the collections present.
    pub fn record_count(&self) -> usize {
        self.entries.as_ref().map_or(0, Vec::len)
            + self.expenses.as_ref().map_or(0, Vec::len)
            + self.action_items.as_ref().map_or(0, Vec::len)
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }

    /// Deserialize from JSON text.
    pub fn from_json(raw: &str) -> Result<Self, WireError> {
        serde_json::from_str(raw).map_err(WireError::Deserialization)
    }

    /// Deserialize from JSON bytes (direct channel frames).
    pub fn from_slice(raw: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(raw).map_err(WireError::Deserialization)
    }
}

/// What the relay stores in a target device's mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxRecord {
    /// Serialized [`SyncPayload`].
    pub data: String,
    /// Write time, epoch milliseconds.
    pub timestamp: i64,
    /// Device that wrote the record.
    pub from_device: DeviceId,
}

impl MailboxRecord {
    /// Wrap a payload for delivery to a mailbox.
    pub fn seal(payload: &SyncPayload, from_device: DeviceId) -> Result<Self, WireError> {
        Ok(Self {
            data: payload.to_json()?,
            timestamp: Utc::now().timestamp_millis(),
            from_device,
        })
    }

    /// Parse the payload back out.
    pub fn open(&self) -> Result<SyncPayload, WireError> {
        if self.data.trim().is_empty() {
            return Err(WireError::InvalidData("empty mailbox record".into()));
        }
        SyncPayload::from_json(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryType;

    fn sample() -> SyncPayload {
        SyncPayload::snapshot(
            vec![JournalEntry::new("walked the dog", EntryType::Log)],
            vec![Expense::new("groceries", 31.25)],
            vec![],
        )
    }

    #[test]
    fn payload_roundtrips_exactly() {
        let payload = sample();
        let back = SyncPayload::from_json(&payload.to_json().unwrap()).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn absent_collection_differs_from_empty() {
        let mut payload = sample();
        payload.expenses = None;
        let json = payload.to_json().unwrap();

        assert!(!json.contains("\"expenses\""));
        assert!(json.contains("\"actionItems\":[]"));

        let back = SyncPayload::from_json(&json).unwrap();
        assert!(back.expenses.is_none());
        assert_eq!(back.action_items, Some(vec![]));
    }

    #[test]
    fn payload_timestamp_is_iso_8601() {
        let json: serde_json::Value = serde_json::to_value(sample()).unwrap();
        let ts = json["timestamp"].as_str().unwrap();
        assert!(crate::timestamp::parse(ts).is_some());
    }

    #[test]
    fn record_count_sums_present_collections() {
        let mut payload = sample();
        assert_eq!(payload.record_count(), 2);
        payload.entries = None;
        assert_eq!(payload.record_count(), 1);
    }

    #[test]
    fn garbage_is_a_deserialization_error() {
        assert!(matches!(
            SyncPayload::from_json("not json"),
            Err(WireError::Deserialization(_))
        ));
    }

    #[test]
    fn mailbox_record_wire_shape() {
        let record = MailboxRecord::seal(&sample(), DeviceId::new("device-a")).unwrap();
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["fromDevice"], "device-a");
        assert!(json["timestamp"].is_i64());
        assert!(json["data"].is_string());
        assert_eq!(record.open().unwrap().record_count(), 2);
    }

    #[test]
    fn empty_mailbox_record_is_invalid() {
        let record = MailboxRecord {
            data: "  ".into(),
            timestamp: 0,
            from_device: DeviceId::new("d"),
        };
        assert!(matches!(record.open(), Err(WireError::InvalidData(_))));
    }
}
