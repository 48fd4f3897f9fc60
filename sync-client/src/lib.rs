//! # sync-client
//!
//! Client library for journal device-to-device sync.
//!
//! This is the main library that applications use to pair devices and
//! keep their journal entries, expenses and action items in sync.
//!
//! ## Features
//!
//! - **Pairing**: exchange a one-shot code (JSON or compact QR form)
//! - **Direct first**: live peer channels when the platform has them
//! - **Relay fallback**: a shared mailbox store, one pending record per sender
//! - **Pure core**: merge and per-device state machine live in sync-core
//!
//! ## Example
//!
//! ```ignore
//! use journal_sync_client::{SyncConfig, SyncOrchestrator, SyncServices};
//!
//! let orchestrator = SyncOrchestrator::new(SyncConfig::new("Laptop"), services);
//! orchestrator.initialize().await?;
//!
//! // Show this to the other device
//! let code = orchestrator.pairing_code(true).await?;
//!
//! // Pair with the code the other device showed, then sync
//! let peer = orchestrator.pair(&scanned).await?;
//! orchestrator.sync_with_device(&peer.id).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod orchestrator;
pub mod registry;
pub mod relay;
pub mod store;

pub use channel::{Channel, DirectChannelManager, DirectTransport, MockChannel, MockTransport};
pub use config::SyncConfig;
pub use error::{
    ChannelError, PublishError, PublishFailure, RelayError, StoreError, SyncError,
    UnavailableReason,
};
pub use events::{EventBus, Inbound, SyncEvent, SyncReport};
pub use identity::IdentityManager;
pub use orchestrator::{SyncOrchestrator, SyncServices};
pub use registry::DeviceRegistry;
pub use relay::{MemoryRelayStore, RelayClient, RelayStore, SqliteRelayStore};
pub use store::{
    load_collections, save_collections, FileKvStore, KeyValueStore, KvRecordStore, MemoryKvStore,
    RecordStore,
};
