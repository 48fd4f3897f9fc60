//! Direct channels between paired devices.
//!
//! Direct channels are a platform capability. A platform that can open
//! live peer connections hands the manager a [`DirectTransport`]; one
//! that cannot hands it nothing, and every `connect` fails with
//! [`UnavailableReason::Unsupported`] so the caller falls back to the relay.
//!
//! # Design
//!
//! - At most one outbound channel per peer; `connect` to a connected
//!   peer returns the existing channel
//! - Inbound channels from devices missing from the registry are closed
//!   before any data is exchanged
//! - An accepted inbound channel triggers a best-effort reverse connect
//! - Inbound messages and open/close notices are forwarded to the
//!   orchestrator's inbound queue

mod mock;

pub use mock::{MockChannel, MockTransport};

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use journal_sync_types::DeviceId;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ChannelError, UnavailableReason};
use crate::events::Inbound;
use crate::registry::DeviceRegistry;

/// One live connection to a peer.
#[async_trait]
pub trait Channel: Send + Sync {
    /// The remote device.
    fn peer(&self) -> &DeviceId;

    /// Check if the channel can still carry data.
    fn is_open(&self) -> bool;

    /// Send one application message.
    async fn send(&self, data: &[u8]) -> Result<(), ChannelError>;

    /// Close the channel.
    async fn close(&self);
}

/// Platform transport able to open direct channels.
#[async_trait]
pub trait DirectTransport: Send + Sync {
    /// Check if the transport has finished initializing.
    fn is_ready(&self) -> bool;

    /// Open an outbound channel to `peer`.
    async fn open(&self, peer: &DeviceId) -> Result<Arc<dyn Channel>, ChannelError>;
}

/// Tracks live direct channels.
pub struct DirectChannelManager {
    transport: Option<Arc<dyn DirectTransport>>,
    registry: DeviceRegistry,
    outbound: DashMap<DeviceId, Arc<dyn Channel>>,
    inbound: DashMap<DeviceId, Arc<dyn Channel>>,
    notify: mpsc::UnboundedSender<Inbound>,
}

impl DirectChannelManager {
    /// Create a manager. `transport` is `None` on platforms without direct channels.
    pub fn new(
        transport: Option<Arc<dyn DirectTransport>>,
        registry: DeviceRegistry,
        notify: mpsc::UnboundedSender<Inbound>,
    ) -> Self {
        Self {
            transport,
            registry,
            outbound: DashMap::new(),
            inbound: DashMap::new(),
            notify,
        }
    }

    /// The live outbound channel to `peer`, if any.
    pub fn channel(&self, peer: &DeviceId) -> Option<Arc<dyn Channel>> {
        let channel = self.outbound.get(peer).map(|c| Arc::clone(c.value()))?;
        if channel.is_open() {
            Some(channel)
        } else {
            self.outbound.remove(peer);
            None
        }
    }

    /// Open (or reuse) the outbound channel to `peer`.
    pub async fn connect(&self, peer: &DeviceId) -> Result<Arc<dyn Channel>, ChannelError> {
        if let Some(existing) = self.channel(peer) {
            return Ok(existing);
        }

        let transport = self
            .transport
            .as_ref()
            .ok_or(ChannelError::Unavailable(UnavailableReason::Unsupported))?;
        if !transport.is_ready() {
            return Err(ChannelError::Unavailable(UnavailableReason::NotReady));
        }

        let channel = transport.open(peer).await?;

        // Another task may have connected while we were opening.
        let winner = match self.outbound.entry(peer.clone()) {
            Entry::Occupied(existing) if existing.get().is_open() => {
                Some(Arc::clone(existing.get()))
            }
            Entry::Occupied(mut stale) => {
                stale.insert(Arc::clone(&channel));
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&channel));
                None
            }
        };
        if let Some(winner) = winner {
            debug!(peer = %peer, "lost connect race, closing duplicate channel");
            channel.close().await;
            return Ok(winner);
        }

        debug!(peer = %peer, "direct channel open");
        self.notify_peer(Inbound::PeerOpened(peer.clone()));
        Ok(channel)
    }

    /// Handle an inbound connection request.
    ///
    /// Devices missing from the registry are closed immediately and
    /// rejected. Accepted channels get a best-effort reverse connect.
    pub async fn accept_inbound(&self, channel: Arc<dyn Channel>) -> Result<(), ChannelError> {
        let peer = channel.peer().clone();
        let paired = match self.registry.is_paired(&peer).await {
            Ok(paired) => paired,
            Err(e) => {
                warn!(peer = %peer, error = %e, "registry unreadable, rejecting inbound channel");
                false
            }
        };
        if !paired {
            channel.close().await;
            warn!(peer = %peer, "rejected inbound channel from unpaired device");
            return Err(ChannelError::Rejected(peer));
        }

        if let Some(previous) = self.inbound.insert(peer.clone(), channel) {
            previous.close().await;
        }
        info!(peer = %peer, "accepted inbound channel");
        self.notify_peer(Inbound::PeerOpened(peer.clone()));

        if self.channel(&peer).is_none() {
            if let Err(e) = self.connect(&peer).await {
                debug!(peer = %peer, error = %e, "reverse channel failed, inbound-only");
            }
        }
        Ok(())
    }

    /// Hand an application message received from `from` to the orchestrator.
    ///
    /// Messages from peers without an accepted channel are dropped.
    pub fn deliver(&self, from: &DeviceId, data: Vec<u8>) {
        if !self.inbound.contains_key(from) && !self.outbound.contains_key(from) {
            warn!(peer = %from, "dropping message from peer without a channel");
            return;
        }
        if self
            .notify
            .send(Inbound::Direct {
                from: from.clone(),
                data,
            })
            .is_err()
        {
            debug!(peer = %from, "inbound queue closed, message dropped");
        }
    }

    /// The transport reports that the connection with `peer` closed.
    pub fn channel_closed(&self, peer: &DeviceId) {
        let had_outbound = self.outbound.remove(peer).is_some();
        let had_inbound = self.inbound.remove(peer).is_some();
        if had_outbound || had_inbound {
            debug!(peer = %peer, "direct channel closed");
            self.notify_peer(Inbound::PeerClosed(peer.clone()));
        }
    }

    /// Peers with at least one live channel.
    pub fn connected_peers(&self) -> Vec<DeviceId> {
        let mut peers: Vec<DeviceId> = self
            .outbound
            .iter()
            .chain(self.inbound.iter())
            .filter(|entry| entry.value().is_open())
            .map(|entry| entry.key().clone())
            .collect();
        peers.sort();
        peers.dedup();
        peers
    }

    /// Close every channel.
    pub async fn close_all(&self) {
        let peers: Vec<DeviceId> = self
            .outbound
            .iter()
            .chain(self.inbound.iter())
            .map(|entry| entry.key().clone())
            .collect();

        for peer in peers {
            for table in [&self.outbound, &self.inbound] {
                if let Some((_, channel)) = table.remove(&peer) {
                    channel.close().await;
                }
            }
        }
    }

    fn notify_peer(&self, notice: Inbound) {
        let _ = self.notify.send(notice);
    }
}
