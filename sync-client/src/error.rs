//! Error types for sync-client.
//!
//! Failures below the orchestrator (storage, direct channels, relay) are
//! translated into [`SyncError`] before they reach the application. Every
//! user-visible error has a `user_message()` with a remediation hint.

use std::fmt;
use std::time::Duration;

use journal_sync_core::PairingError;
use journal_sync_types::DeviceId;
use thiserror::Error;

/// Local storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store cannot be used at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be parsed.
    #[error("corrupt value under '{key}': {source}")]
    Corrupt {
        /// Key holding the value.
        key: String,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
}

/// Why a direct channel could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// This platform provides no direct transport.
    Unsupported,
    /// The transport has not finished initializing.
    NotReady,
    /// The peer could not be reached.
    Unreachable,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::Unsupported => f.write_str("not supported on this platform"),
            UnavailableReason::NotReady => f.write_str("transport not ready"),
            UnavailableReason::Unreachable => f.write_str("peer unreachable"),
        }
    }
}

/// Direct channel errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// No channel could be established; the caller falls back to the relay.
    #[error("direct channel unavailable: {0}")]
    Unavailable(UnavailableReason),

    /// Inbound connection from a device that is not in the registry.
    #[error("rejected connection from unpaired device {0}")]
    Rejected(DeviceId),

    /// The channel was closed.
    #[error("channel closed")]
    Closed,

    /// Sending over an open channel failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Errors returned by relay store backends.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The store has not been set up (schema missing).
    #[error("relay store is not provisioned")]
    NotProvisioned,

    /// The mailbox is claimed by a different key.
    #[error("mailbox for {target} rejected the presented key")]
    PermissionDenied {
        /// Mailbox owner.
        target: DeviceId,
    },

    /// The backend does not support standing listeners.
    #[error("relay store does not support listening")]
    ListenUnsupported,

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Any other backend failure.
    #[error("relay store error: {0}")]
    Backend(String),
}

/// Sub-reason of a rejected relay write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishFailure {
    /// The relay store is not provisioned.
    NotProvisioned,
    /// The store refused the write.
    PermissionDenied,
    /// Anything else.
    Unknown(String),
}

impl fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishFailure::NotProvisioned => f.write_str("store not provisioned"),
            PublishFailure::PermissionDenied => f.write_str("permission denied"),
            PublishFailure::Unknown(detail) => write!(f, "{}", detail),
        }
    }
}

/// A relay write was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("relay publish failed: {reason}")]
pub struct PublishError {
    /// Why.
    pub reason: PublishFailure,
}

impl PublishError {
    /// Hint for the user, when the sub-reason is known.
    pub fn remediation(&self) -> Option<&'static str> {
        match self.reason {
            PublishFailure::NotProvisioned => {
                Some("Enable the relay store, then try again.")
            }
            PublishFailure::PermissionDenied => Some(
                "Check the relay store permissions, or pair the devices again to refresh the sync key.",
            ),
            PublishFailure::Unknown(_) => None,
        }
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self.remediation() {
            Some(hint) => format!("Could not hand the data to the relay ({}). {}", self.reason, hint),
            None => "Could not hand the data to the relay. Please try again.".to_string(),
        }
    }
}

impl From<RelayError> for PublishError {
    fn from(err: RelayError) -> Self {
        let reason = match err {
            RelayError::NotProvisioned => PublishFailure::NotProvisioned,
            RelayError::PermissionDenied { .. } => PublishFailure::PermissionDenied,
            other => PublishFailure::Unknown(other.to_string()),
        };
        Self { reason }
    }
}

/// Errors surfaced by the sync orchestrator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Every channel failed.
    #[error("sync with {device} failed: {cause}")]
    Failed {
        /// Target device.
        device: DeviceId,
        /// Concatenated causes, one per channel tried.
        cause: String,
        /// Relay sub-reason, when the relay rejected the write.
        publish: Option<PublishError>,
    },

    /// The relay did not answer within the configured timeout.
    #[error("sync with {device} timed out after {after:?}")]
    Timeout {
        /// Target device.
        device: DeviceId,
        /// Configured timeout.
        after: Duration,
    },

    /// The device is not in the registry.
    #[error("device {0} is not paired")]
    NotPaired(DeviceId),

    /// Pairing code problem.
    #[error("pairing failed: {0}")]
    Pairing(#[from] PairingError),

    /// Local storage failure.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Relay failure outside of a publish.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Called before `initialize` (or after `dispose`).
    #[error("sync orchestrator not initialized")]
    NotInitialized,
}

impl SyncError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Failed {
                publish: Some(publish),
                ..
            } if publish.remediation().is_some() => publish.user_message(),
            SyncError::Failed { cause, .. } => {
                format!("Sync failed ({}). Use \"Sync now\" to try again.", cause)
            }
            SyncError::Timeout { .. } => {
                "The other device did not respond in time. Use \"Sync now\" to try again."
                    .to_string()
            }
            SyncError::NotPaired(_) => {
                "This device is not paired. Scan its pairing code first.".to_string()
            }
            SyncError::Pairing(err) => err.user_message(),
            SyncError::Store(_) => "Local storage could not be read or written.".to_string(),
            SyncError::Relay(_) => "The relay store could not be reached.".to_string(),
            SyncError::NotInitialized => "Sync is still starting up.".to_string(),
        }
    }
}
