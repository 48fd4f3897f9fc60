//! SyncOrchestrator - the main interface for journal-sync.
//!
//! # Architecture
//!
//! The orchestrator drives the per-device state machine from sync-core
//! and interprets its actions against the channels and stores:
//!
//! ```text
//! Application → SyncOrchestrator → DirectChannelManager → peer
//!                     ↓      ↘
//!          sync-core         RelayClient → relay store
//!     (merge, state machine)
//! ```
//!
//! An outbound sync tries the direct channel first and falls back to the
//! relay. Inbound payloads from either channel are merged into the
//! record store one at a time.
//!
//! # Lifecycle
//!
//! `new -> initialize -> dispose`. Every operation except
//! [`SyncOrchestrator::subscribe`] and [`SyncOrchestrator::sync_state`]
//! fails with [`SyncError::NotInitialized`] outside that window.
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = SyncOrchestrator::new(SyncConfig::new("Laptop"), services);
//! orchestrator.initialize().await?;
//!
//! let device = orchestrator.pair(&scanned_code).await?;
//! orchestrator.sync_with_device(&device.id).await?;
//! ```

use std::sync::{Arc, Mutex as StdMutex};

use dashmap::DashMap;
use journal_sync_core::{
    merge_payload, Action, ChannelKind, Event, MergeSummary, PairingError, PairingPayload,
    SyncState,
};
use journal_sync_types::{DeviceId, MailboxRecord, PairedDevice, SyncKey, SyncPayload};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{DirectChannelManager, DirectTransport};
use crate::config::SyncConfig;
use crate::error::{PublishError, SyncError};
use crate::events::{EventBus, Inbound, SyncEvent, SyncReport};
use crate::identity::IdentityManager;
use crate::registry::DeviceRegistry;
use crate::relay::{RelayClient, RelayStore};
use crate::store::{load_collections, save_collections, KeyValueStore, RecordStore};

/// The collaborators an orchestrator is built from.
#[derive(Clone)]
pub struct SyncServices {
    /// Durable key-value storage (identity, registry, sync keys).
    pub store: Arc<dyn KeyValueStore>,
    /// The three record collections.
    pub records: Arc<dyn RecordStore>,
    /// Relay store backend.
    pub relay: Arc<dyn RelayStore>,
    /// Direct transport, on platforms that have one.
    pub direct: Option<Arc<dyn DirectTransport>>,
}

impl SyncServices {
    /// Services without a direct transport.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        records: Arc<dyn RecordStore>,
        relay: Arc<dyn RelayStore>,
    ) -> Self {
        Self {
            store,
            records,
            relay,
            direct: None,
        }
    }

    /// Add a direct transport.
    pub fn with_direct(mut self, transport: Arc<dyn DirectTransport>) -> Self {
        self.direct = Some(transport);
        self
    }
}

enum Lifecycle {
    Created,
    Running { device_id: DeviceId, sync_key: SyncKey },
    Disposed,
}

/// State shared with the background tasks.
struct Shared {
    records: Arc<dyn RecordStore>,
    registry: DeviceRegistry,
    events: EventBus,
    states: DashMap<DeviceId, SyncState>,
    merge_lock: Mutex<()>,
}

/// Orchestrates pairing, outbound sync and inbound merges for one device.
pub struct SyncOrchestrator {
    config: SyncConfig,
    shared: Arc<Shared>,
    identity: IdentityManager,
    relay: RelayClient,
    direct: Arc<DirectChannelManager>,
    send_locks: DashMap<DeviceId, Arc<Mutex<()>>>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    lifecycle: RwLock<Lifecycle>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl SyncOrchestrator {
    /// Create an orchestrator. Nothing runs until [`initialize`](Self::initialize).
    pub fn new(config: SyncConfig, services: SyncServices) -> Self {
        let registry = DeviceRegistry::new(Arc::clone(&services.store));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let transport = services.direct.filter(|_| config.direct_enabled);
        let direct = DirectChannelManager::new(transport, registry.clone(), inbound_tx);

        let shared = Shared {
            records: services.records,
            registry,
            events: EventBus::new(config.event_capacity),
            states: DashMap::new(),
            merge_lock: Mutex::new(()),
        };

        Self {
            identity: IdentityManager::new(services.store),
            relay: RelayClient::new(services.relay),
            direct: Arc::new(direct),
            send_locks: DashMap::new(),
            shared: Arc::new(shared),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            lifecycle: RwLock::new(Lifecycle::Created),
            tasks: StdMutex::new(Vec::new()),
            config,
        }
    }

    /// Load (or create) this device's identity, claim its relay mailbox
    /// and start the inbound tasks. Returns this device's id.
    ///
    /// Calling it again while running is a no-op.
    pub async fn initialize(&self) -> Result<DeviceId, SyncError> {
        let mut lifecycle = self.lifecycle.write().await;
        match &*lifecycle {
            Lifecycle::Running { device_id, .. } => return Ok(device_id.clone()),
            Lifecycle::Disposed => return Err(SyncError::NotInitialized),
            Lifecycle::Created => {}
        }

        let device_id = self.identity.ensure_identity().await;
        let sync_key = self.identity.ensure_shared_secret().await;

        if let Err(e) = self.relay.claim(&device_id, &sync_key).await {
            warn!(device = %device_id, error = %e, "could not claim relay mailbox");
        }

        let mut tasks = Vec::new();
        if let Some(rx) = self.inbound_rx.lock().await.take() {
            tasks.push(tokio::spawn(inbound_loop(Arc::clone(&self.shared), rx)));
        }

        if self.config.relay_listen {
            let shared = Arc::clone(&self.shared);
            let listener = self.relay.subscribe(
                device_id.clone(),
                self.config.relay_poll_interval,
                move |record| {
                    let shared = Arc::clone(&shared);
                    async move { shared.receive_relay(record).await }
                },
            );
            match listener {
                Ok(handle) => tasks.push(handle),
                Err(e) => info!(error = %e, "no standing relay listener, poll explicitly"),
            }
        }
        self.tasks_guard().extend(tasks);

        info!(device = %device_id, name = %self.config.device_name, "sync orchestrator initialized");
        *lifecycle = Lifecycle::Running {
            device_id: device_id.clone(),
            sync_key,
        };
        Ok(device_id)
    }

    /// Stop background tasks and close direct channels.
    pub async fn dispose(&self) {
        let mut lifecycle = self.lifecycle.write().await;
        for task in self.tasks_guard().drain(..) {
            task.abort();
        }
        self.direct.close_all().await;
        if matches!(*lifecycle, Lifecycle::Running { .. }) {
            info!("sync orchestrator disposed");
        }
        *lifecycle = Lifecycle::Disposed;
    }

    /// This device's id.
    pub async fn device_id(&self) -> Result<DeviceId, SyncError> {
        Ok(self.running().await?.0)
    }

    /// This device's pairing code, as JSON text or in compact (QR) form.
    pub async fn pairing_code(&self, compact: bool) -> Result<String, SyncError> {
        let (device_id, sync_key) = self.running().await?;
        let payload = PairingPayload::new(device_id, sync_key, self.config.device_name.clone());
        Ok(if compact {
            payload.encode_compact()
        } else {
            payload.encode()
        })
    }

    /// Pair with the device whose code was scanned or pasted.
    pub async fn pair(&self, code: &str) -> Result<PairedDevice, SyncError> {
        let (device_id, _) = self.running().await?;
        let payload = PairingPayload::decode(code)?;
        if payload.device_id == device_id {
            return Err(PairingError::SelfPairing.into());
        }
        Ok(self.shared.registry.pair(&payload).await?)
    }

    /// All paired devices.
    pub async fn paired_devices(&self) -> Result<Vec<PairedDevice>, SyncError> {
        self.running().await?;
        Ok(self.shared.registry.list_paired().await?)
    }

    /// Forget every paired device and its sync key.
    pub async fn forget_all_devices(&self) -> Result<(), SyncError> {
        self.running().await?;
        self.shared.registry.remove_all().await?;
        self.direct.close_all().await;
        self.shared.states.clear();
        Ok(())
    }

    /// Push the local snapshot to `device`.
    ///
    /// Uses a live or newly opened direct channel when possible and the
    /// relay otherwise. Succeeds once a channel accepts the payload and
    /// stamps the device's `lastSyncAt`. Concurrent calls for the same
    /// device run one after the other.
    pub async fn sync_with_device(&self, device: &DeviceId) -> Result<SyncReport, SyncError> {
        let (self_id, _) = self.running().await?;
        if !self.shared.registry.is_paired(device).await? {
            return Err(SyncError::NotPaired(device.clone()));
        }

        let send_lock = Arc::clone(self.send_locks.entry(device.clone()).or_default().value());
        let _sending = send_lock.lock().await;

        let payload = load_collections(self.shared.records.as_ref())
            .await?
            .into_payload();
        let body = payload.to_json().map_err(|e| SyncError::Failed {
            device: device.clone(),
            cause: e.to_string(),
            publish: None,
        })?;

        self.shared.transition(device, Event::SendStarted);
        let mut causes = Vec::new();

        let mut delivered = match self.send_direct(device, body.as_bytes()).await {
            Ok(()) => Some((ChannelKind::Direct, body.len())),
            Err(cause) => {
                debug!(device = %device, cause = %cause, "direct send failed");
                causes.push(format!("direct: {}", cause));
                self.shared.transition(device, Event::DirectFailed { error: cause });
                None
            }
        };

        let mut publish_error: Option<PublishError> = None;
        if delivered.is_none() {
            match self.send_relay(device, &self_id, &payload).await {
                Ok(size) => delivered = Some((ChannelKind::Relay, size)),
                Err(RelayAttempt::TimedOut) => {
                    let after = self.config.send_timeout;
                    self.shared.transition(
                        device,
                        Event::SendFailed {
                            error: format!("relay: timed out after {:?}", after),
                        },
                    );
                    warn!(device = %device, ?after, "relay publish timed out");
                    return Err(SyncError::Timeout {
                        device: device.clone(),
                        after,
                    });
                }
                Err(RelayAttempt::NoKey) => {
                    causes.push("relay: no sync key on record for this device".to_string())
                }
                Err(RelayAttempt::Rejected(e)) => {
                    causes.push(format!("relay: {}", e.reason));
                    publish_error = Some(e);
                }
            }
        }

        match delivered {
            Some((channel, payload_size)) => {
                let actions = self
                    .shared
                    .transition(device, Event::SendSucceeded { via: channel });
                self.shared.apply(device, &actions).await;

                let report = SyncReport {
                    device: device.clone(),
                    channel,
                    payload_size,
                };
                info!(device = %device, via = %channel, bytes = payload_size, "sync sent");
                self.shared.events.emit(SyncEvent::SyncCompleted(report.clone()));
                Ok(report)
            }
            None => {
                let cause = causes.join("; ");
                let actions = self.shared.transition(
                    device,
                    Event::SendFailed {
                        error: cause.clone(),
                    },
                );
                self.shared.apply(device, &actions).await;
                Err(SyncError::Failed {
                    device: device.clone(),
                    cause,
                    publish: publish_error,
                })
            }
        }
    }

    /// Push to `device` and wait for it to push back.
    ///
    /// There is no request message: the remote device runs its own
    /// `sync_with_device` towards us, and each side merges what it
    /// receives. Safe to call from either or both sides.
    pub async fn sync_bidirectional(&self, device: &DeviceId) -> Result<SyncReport, SyncError> {
        let report = self.sync_with_device(device).await?;
        self.shared.transition(device, Event::AwaitRemote);
        Ok(report)
    }

    /// Merge one inbound payload. `None` means it was dropped as undecodable.
    pub async fn handle_inbound(
        &self,
        from: &DeviceId,
        via: ChannelKind,
        data: &[u8],
    ) -> Result<Option<MergeSummary>, SyncError> {
        self.running().await?;
        self.shared.receive(from, via, data).await
    }

    /// Drain our relay mailbox once. Returns the number of records consumed.
    pub async fn poll_relay(&self) -> Result<usize, SyncError> {
        let (device_id, _) = self.running().await?;
        let shared = Arc::clone(&self.shared);
        let consumed = self
            .relay
            .poll_once(&device_id, |record| {
                let shared = Arc::clone(&shared);
                async move { shared.receive_relay(record).await }
            })
            .await?;
        Ok(consumed)
    }

    /// Register a new event subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    /// Current sync state towards `device`.
    pub fn sync_state(&self, device: &DeviceId) -> SyncState {
        self.shared
            .states
            .get(device)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// The direct channel manager, for the platform layer to report
    /// inbound connections, messages and closes.
    pub fn direct(&self) -> &DirectChannelManager {
        &self.direct
    }

    async fn running(&self) -> Result<(DeviceId, SyncKey), SyncError> {
        match &*self.lifecycle.read().await {
            Lifecycle::Running {
                device_id,
                sync_key,
            } => Ok((device_id.clone(), sync_key.clone())),
            _ => Err(SyncError::NotInitialized),
        }
    }

    async fn send_direct(&self, device: &DeviceId, body: &[u8]) -> Result<(), String> {
        let attempt = async {
            let channel = match self.direct.channel(device) {
                Some(channel) => channel,
                None => self.direct.connect(device).await?,
            };
            channel.send(body).await
        };
        match tokio::time::timeout(self.config.send_timeout, attempt).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.config.send_timeout)),
        }
    }

    async fn send_relay(
        &self,
        device: &DeviceId,
        self_id: &DeviceId,
        payload: &SyncPayload,
    ) -> Result<usize, RelayAttempt> {
        let key = match self.shared.registry.sync_key(device).await {
            Ok(Some(key)) => key,
            Ok(None) => return Err(RelayAttempt::NoKey),
            Err(e) => {
                warn!(device = %device, error = %e, "could not read sync key");
                return Err(RelayAttempt::NoKey);
            }
        };

        let publish = self.relay.publish(device, &key, payload, self_id);
        match tokio::time::timeout(self.config.send_timeout, publish).await {
            Ok(Ok(size)) => Ok(size),
            Ok(Err(e)) => Err(RelayAttempt::Rejected(e)),
            Err(_) => Err(RelayAttempt::TimedOut),
        }
    }

    fn tasks_guard(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        for task in self.tasks_guard().drain(..) {
            task.abort();
        }
    }
}

enum RelayAttempt {
    NoKey,
    Rejected(PublishError),
    TimedOut,
}

impl Shared {
    /// Feed `event` to `device`'s state machine and return its actions.
    fn transition(&self, device: &DeviceId, event: Event) -> Vec<Action> {
        let (changed, actions) = {
            let mut state = self.states.entry(device.clone()).or_default();
            let (next, actions) = state.clone().on_event(event);
            let changed = (*state != next).then(|| next.clone());
            *state = next;
            (changed, actions)
        };
        if let Some(state) = changed {
            self.events.emit(SyncEvent::StateChanged {
                device: device.clone(),
                state,
            });
        }
        actions
    }

    async fn apply(&self, device: &DeviceId, actions: &[Action]) {
        for action in actions {
            match action {
                Action::RecordSyncSuccess => {
                    if let Err(e) = self.registry.record_sync_success(device).await {
                        warn!(device = %device, error = %e, "could not record sync time");
                    }
                }
                Action::ReportFailure { error } => {
                    warn!(device = %device, cause = %error, "sync failed on every channel");
                }
            }
        }
    }

    /// Merge one inbound payload into the record store.
    async fn receive(
        &self,
        from: &DeviceId,
        via: ChannelKind,
        data: &[u8],
    ) -> Result<Option<MergeSummary>, SyncError> {
        let _guard = self.merge_lock.lock().await;

        let payload = match SyncPayload::from_slice(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(from = %from, via = %via, error = %e, "dropping undecodable inbound payload");
                self.events.emit(SyncEvent::InboundDropped {
                    from: Some(from.clone()),
                    reason: e.to_string(),
                });
                return Ok(None);
            }
        };

        let local = load_collections(self.records.as_ref()).await?;
        let (merged, summary) = merge_payload(local, payload);
        if summary.changed() {
            save_collections(self.records.as_ref(), &merged).await?;
        }
        debug!(
            from = %from,
            via = %via,
            entries_added = summary.entries.added,
            expenses_added = summary.expenses.added,
            action_items_added = summary.action_items.added,
            changed = summary.changed(),
            "merged inbound payload"
        );

        let actions = self.transition(from, Event::RemoteMerged);
        self.apply(from, &actions).await;

        if summary.changed() {
            self.events.emit(SyncEvent::DataChanged {
                from: from.clone(),
                summary,
            });
        }
        Ok(Some(summary))
    }

    /// Relay handler: returns whether the record may be cleared.
    async fn receive_relay(&self, record: MailboxRecord) -> bool {
        let from = record.from_device.clone();
        match self
            .receive(&from, ChannelKind::Relay, record.data.as_bytes())
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(from = %from, error = %e, "relay payload not merged, leaving it in the mailbox");
                false
            }
        }
    }
}

async fn inbound_loop(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Inbound>) {
    while let Some(message) = rx.recv().await {
        match message {
            Inbound::Direct { from, data } => {
                if let Err(e) = shared.receive(&from, ChannelKind::Direct, &data).await {
                    warn!(from = %from, error = %e, "direct payload not merged");
                }
            }
            Inbound::PeerOpened(peer) => shared.events.emit(SyncEvent::PeerOnline(peer)),
            Inbound::PeerClosed(peer) => shared.events.emit(SyncEvent::PeerOffline(peer)),
        }
    }
    debug!("inbound queue closed");
}
