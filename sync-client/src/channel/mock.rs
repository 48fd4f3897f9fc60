//! Mock direct transport for testing.
//!
//! Allows simulating readiness and unreachable peers, and capturing
//! the messages sent over each channel for verification.

use super::{Channel, DirectTransport};
use crate::error::{ChannelError, UnavailableReason};
use async_trait::async_trait;
use journal_sync_types::DeviceId;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Mock direct transport.
///
/// Clones share state. Ready by default; every peer is reachable unless
/// marked otherwise.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug)]
struct MockTransportInner {
    ready: bool,
    unreachable: HashSet<DeviceId>,
    fail_next_open: Option<UnavailableReason>,
    open_delays: VecDeque<Duration>,
    opened: Vec<Arc<MockChannel>>,
    by_peer: HashMap<DeviceId, Arc<MockChannel>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner {
                ready: true,
                unreachable: HashSet::new(),
                fail_next_open: None,
                open_delays: VecDeque::new(),
                opened: Vec::new(),
                by_peer: HashMap::new(),
            })),
        }
    }
}

impl MockTransport {
    /// Create a ready transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether the transport has finished initializing.
    pub fn set_ready(&self, ready: bool) {
        self.lock().ready = ready;
    }

    /// Make every `open` towards `peer` fail.
    pub fn set_unreachable(&self, peer: &DeviceId) {
        self.lock().unreachable.insert(peer.clone());
    }

    /// Make `peer` reachable again.
    pub fn set_reachable(&self, peer: &DeviceId) {
        self.lock().unreachable.remove(peer);
    }

    /// Cause the next `open` to fail with the given reason.
    pub fn fail_next_open(&self, reason: UnavailableReason) {
        self.lock().fail_next_open = Some(reason);
    }

    /// Delay the next `open` (one queued delay per call, in order).
    pub fn delay_next_open(&self, delay: Duration) {
        self.lock().open_delays.push_back(delay);
    }

    /// Number of channels opened so far.
    pub fn open_count(&self) -> usize {
        self.lock().opened.len()
    }

    /// The most recent channel opened towards `peer`.
    pub fn channel_to(&self, peer: &DeviceId) -> Option<Arc<MockChannel>> {
        self.lock().by_peer.get(peer).cloned()
    }

    /// Messages sent to `peer` over the most recent channel.
    pub fn sent_to(&self, peer: &DeviceId) -> Vec<Vec<u8>> {
        self.channel_to(peer)
            .map(|c| c.sent_messages())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DirectTransport for MockTransport {
    fn is_ready(&self) -> bool {
        self.lock().ready
    }

    async fn open(&self, peer: &DeviceId) -> Result<Arc<dyn Channel>, ChannelError> {
        let delay = self.lock().open_delays.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.lock();

        // Check for forced failure
        if let Some(reason) = inner.fail_next_open.take() {
            return Err(ChannelError::Unavailable(reason));
        }
        if !inner.ready {
            return Err(ChannelError::Unavailable(UnavailableReason::NotReady));
        }
        if inner.unreachable.contains(peer) {
            return Err(ChannelError::Unavailable(UnavailableReason::Unreachable));
        }

        let channel = MockChannel::new(peer.clone());
        inner.opened.push(Arc::clone(&channel));
        inner.by_peer.insert(peer.clone(), Arc::clone(&channel));
        Ok(channel)
    }
}

/// Mock channel recording what is sent over it.
#[derive(Debug)]
pub struct MockChannel {
    peer: DeviceId,
    open: AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
    fail_next_send: Mutex<Option<String>>,
}

impl MockChannel {
    /// Create an open channel to `peer`.
    pub fn new(peer: DeviceId) -> Arc<Self> {
        Arc::new(Self {
            peer,
            open: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            fail_next_send: Mutex::new(None),
        })
    }

    /// All messages sent so far.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Cause the next `send` to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        *self
            .fail_next_send
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(error.to_string());
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn peer(&self) -> &DeviceId {
        &self.peer
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send(&self, data: &[u8]) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }

        // Check for forced failure
        if let Some(error) = self
            .fail_next_send
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            return Err(ChannelError::SendFailed(error));
        }

        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(data.to_vec());
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
