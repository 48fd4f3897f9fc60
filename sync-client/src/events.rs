//! Events published by the orchestrator.
//!
//! Any number of consumers can subscribe; each gets its own receiver.
//! A slow consumer that falls behind the bus capacity misses events
//! (`RecvError::Lagged`) rather than blocking sync.

use journal_sync_core::{ChannelKind, MergeSummary, SyncState};
use journal_sync_types::DeviceId;
use tokio::sync::broadcast;

/// Result of one successful outbound sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Target device.
    pub device: DeviceId,
    /// Channel the payload went over.
    pub channel: ChannelKind,
    /// Serialized payload size in bytes.
    pub payload_size: usize,
}

/// Notifications for the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// An inbound payload changed local data; dependent views should refresh.
    DataChanged {
        /// Sender of the payload.
        from: DeviceId,
        /// What changed per collection.
        summary: MergeSummary,
    },
    /// A direct channel to the device opened.
    PeerOnline(DeviceId),
    /// The last direct channel to the device closed.
    PeerOffline(DeviceId),
    /// The per-device sync state changed.
    StateChanged {
        /// The device.
        device: DeviceId,
        /// Its new state.
        state: SyncState,
    },
    /// An inbound message was dropped.
    InboundDropped {
        /// Sender, if known.
        from: Option<DeviceId>,
        /// Why it was dropped.
        reason: String,
    },
    /// An outbound sync succeeded.
    SyncCompleted(SyncReport),
}

/// Messages for the orchestrator's inbound task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Application message received on a direct channel.
    Direct {
        /// Sending peer.
        from: DeviceId,
        /// Raw message.
        data: Vec<u8>,
    },
    /// A direct channel to the peer opened.
    PeerOpened(DeviceId),
    /// A direct channel to the peer closed.
    PeerClosed(DeviceId),
}

/// Multi-subscriber event bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}
