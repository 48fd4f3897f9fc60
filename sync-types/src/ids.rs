//! Device identity types for journal-sync.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Identifier of a device taking part in sync.
///
/// Opaque string. Locally generated ids combine the creation time with
/// 96 random bits; ids received from peers are taken verbatim.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier from the clock and the OS random source.
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let mut bytes = [0u8; 12];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(format!("device-{:x}-{}", millis, URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for display in lists and logs.
    pub fn short(&self) -> String {
        self.0.chars().take(12).collect()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Per-device shared secret ("syncKey").
///
/// Handed out inside a pairing code and used to address and authorize
/// relay messages to the device that owns it. 32 random bytes, encoded
/// as URL-safe base64.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SyncKey(String);

impl SyncKey {
    /// Create a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        let key = URL_SAFE_NO_PAD.encode(bytes);
        bytes.zeroize();
        Self(key)
    }

    /// Wrap a key received from a pairing code or loaded from storage.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The encoded key.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Hex SHA-256 fingerprint of the key.
    ///
    /// Relay stores only ever see this fingerprint, never the key.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"journal-sync-mailbox-v1");
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }
}

// Intentionally opaque debug to avoid logging secrets
impl fmt::Debug for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_device_ids_are_unique() {
        let a = DeviceId::generate();
        let b = DeviceId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("device-"));
    }

    #[test]
    fn device_id_serializes_as_plain_string() {
        let id = DeviceId::new("device-abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"device-abc\"");
        let back: DeviceId = serde_json::from_str("\"device-abc\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn short_handles_multibyte_ids() {
        let id = DeviceId::new("ééééééééééééééé");
        assert_eq!(id.short().chars().count(), 12);
    }

    #[test]
    fn sync_key_is_32_bytes_base64() {
        let key = SyncKey::generate();
        // 32 bytes = 43 base64 chars (URL-safe, no padding)
        assert_eq!(key.expose().len(), 43);
        assert_ne!(key, SyncKey::generate());
    }

    #[test]
    fn sync_key_debug_is_redacted() {
        let key = SyncKey::new("super-secret");
        let debug = format!("{:?}", key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn fingerprint_is_deterministic_and_hides_key() {
        let key = SyncKey::new("k1");
        assert_eq!(key.fingerprint(), SyncKey::new("k1").fingerprint());
        assert_ne!(key.fingerprint(), SyncKey::new("k2").fingerprint());
        assert_eq!(key.fingerprint().len(), 64);
        assert!(!key.fingerprint().contains("k1"));
    }
}
