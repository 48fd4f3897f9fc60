//! Pairing codes for journal-sync.
//!
//! This module provides:
//! - The pairing payload (device id, sync key, display name, creation time)
//! - Plain JSON encoding, for copy/paste
//! - Compact encoding (base64 JSON), for QR codes
//! - Validating decode that reports malformed input as a typed error
//!
//! The pairing flow:
//! 1. Device A shows its pairing code
//! 2. Device B scans or pastes it
//! 3. Device B stores A's id, name and sync key in its registry
//! 4. Device B can now address sync payloads to A's relay mailbox

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use journal_sync_types::{timestamp, DeviceId, SyncKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error type for pairing code parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    /// The text is not a pairing payload at all.
    #[error("invalid pairing code format: {0}")]
    InvalidFormat(String),
    /// The payload parsed but lacks required fields.
    #[error("pairing code is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    /// The code belongs to this very device.
    #[error("cannot pair a device with itself")]
    SelfPairing,
}

impl PairingError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            PairingError::SelfPairing => {
                "This is this device's own pairing code. Scan the code shown on the other device."
                    .to_string()
            }
            _ => "This pairing code is not valid. Please generate a new code on the other device."
                .to_string(),
        }
    }
}

/// Everything another device needs to sync with us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingPayload {
    /// The advertising device's id.
    pub device_id: DeviceId,
    /// Its relay mailbox key.
    pub sync_key: SyncKey,
    /// Human-readable name.
    pub device_name: String,
    /// When the code was generated.
    pub timestamp: DateTime<Utc>,
}

impl PairingPayload {
    /// Create a payload stamped now.
    pub fn new(device_id: DeviceId, sync_key: SyncKey, device_name: impl Into<String>) -> Self {
        Self {
            device_id,
            sync_key,
            device_name: device_name.into(),
            timestamp: Utc::now(),
        }
    }

    /// Encode as JSON text (copy/paste form).
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("pairing payload serialization failed")
    }

    /// Encode as URL-safe base64 of the JSON text (QR form).
    pub fn encode_compact(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.encode().as_bytes())
    }

    /// Decode either form.
    ///
    /// Fails with [`PairingError::InvalidFormat`] when the text is not a
    /// JSON object (directly or inside base64), and with
    /// [`PairingError::MissingFields`] when `deviceId` or `syncKey` is
    /// absent or empty. A missing `deviceName` falls back to a name
    /// derived from the id; a missing or unreadable `timestamp` to now.
    pub fn decode(text: &str) -> Result<Self, PairingError> {
        let value = parse_value(text.trim())?;
        let object = value.as_object().ok_or_else(|| {
            PairingError::InvalidFormat("expected a JSON object".into())
        })?;

        let device_id = required_str(object, "deviceId")?;
        let sync_key = required_str(object, "syncKey")?;
        let (device_id, sync_key) = match (device_id, sync_key) {
            (Some(id), Some(key)) => (id, key),
            (id, key) => {
                let mut missing = Vec::new();
                if id.is_none() {
                    missing.push("deviceId");
                }
                if key.is_none() {
                    missing.push("syncKey");
                }
                return Err(PairingError::MissingFields(missing));
            }
        };

        let device_name = object
            .get("deviceName")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| placeholder_name(&device_id));

        let timestamp = object
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(timestamp::parse)
            .unwrap_or_else(Utc::now);

        Ok(Self {
            device_id: DeviceId::new(device_id),
            sync_key: SyncKey::new(sync_key),
            device_name,
            timestamp,
        })
    }
}

/// Encode a pairing code for this device.
pub fn encode(device_id: &DeviceId, sync_key: &SyncKey, display_name: &str) -> String {
    PairingPayload::new(device_id.clone(), sync_key.clone(), display_name).encode()
}

/// Decode a pairing code scanned or pasted from another device.
pub fn decode(text: &str) -> Result<PairingPayload, PairingError> {
    PairingPayload::decode(text)
}

fn parse_value(text: &str) -> Result<Value, PairingError> {
    if text.is_empty() {
        return Err(PairingError::InvalidFormat("empty pairing code".into()));
    }
    if text.starts_with('{') {
        return serde_json::from_str(text)
            .map_err(|e| PairingError::InvalidFormat(format!("json parse: {}", e)));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|e| PairingError::InvalidFormat(format!("base64 decode: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PairingError::InvalidFormat(format!("json parse: {}", e)))
}

/// `Ok(None)` for absent/null/blank, error for a non-string value.
fn required_str(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, PairingError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_owned())),
        Some(_) => Err(PairingError::InvalidFormat(format!(
            "{} must be a string",
            field
        ))),
    }
}

fn placeholder_name(device_id: &str) -> String {
    let prefix: String = device_id.chars().take(6).collect();
    format!("Device {}", prefix)
}
