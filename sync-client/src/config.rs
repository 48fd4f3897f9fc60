//! Configuration for the sync orchestrator.

use std::time::Duration;

/// Default bound on a single send (direct or relay).
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default relay mailbox poll interval.
pub const DEFAULT_RELAY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Shortest relay poll interval; smaller values are raised to this.
pub const MIN_RELAY_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for [`SyncOrchestrator`](crate::SyncOrchestrator).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Human-readable device name, embedded in pairing codes.
    pub device_name: String,
    /// Bound on one send attempt per channel.
    pub send_timeout: Duration,
    /// How often the relay listener checks the mailbox.
    pub relay_poll_interval: Duration,
    /// Run a standing relay listener after `initialize`.
    pub relay_listen: bool,
    /// Use the direct transport when one is provided.
    pub direct_enabled: bool,
    /// Capacity of the event bus.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            device_name: "Journal device".to_string(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            relay_poll_interval: DEFAULT_RELAY_POLL_INTERVAL,
            relay_listen: true,
            direct_enabled: true,
            event_capacity: 64,
        }
    }
}

impl SyncConfig {
    /// Create a configuration with the given device name.
    pub fn new(device_name: &str) -> Self {
        Self::default().with_device_name(device_name)
    }

    /// Set the device name.
    pub fn with_device_name(mut self, name: &str) -> Self {
        self.device_name = name.to_string();
        self
    }

    /// Set the per-channel send timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the relay poll interval (at least [`MIN_RELAY_POLL_INTERVAL`]).
    pub fn with_relay_poll_interval(mut self, interval: Duration) -> Self {
        self.relay_poll_interval = interval.max(MIN_RELAY_POLL_INTERVAL);
        self
    }

    /// Enable or disable the standing relay listener.
    pub fn with_relay_listen(mut self, listen: bool) -> Self {
        self.relay_listen = listen;
        self
    }

    /// Enable or disable direct channels.
    pub fn with_direct(mut self, enabled: bool) -> Self {
        self.direct_enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.send_timeout, Duration::from_secs(30));
        assert_eq!(config.relay_poll_interval, Duration::from_secs(2));
        assert!(config.relay_listen);
        assert!(config.direct_enabled);
    }

    #[test]
    fn builder_methods() {
        let config = SyncConfig::new("Laptop")
            .with_send_timeout(Duration::from_millis(200))
            .with_relay_listen(false)
            .with_direct(false);

        assert_eq!(config.device_name, "Laptop");
        assert_eq!(config.send_timeout, Duration::from_millis(200));
        assert!(!config.relay_listen);
        assert!(!config.direct_enabled);
    }

    #[test]
    fn zero_poll_interval_is_raised() {
        let config = SyncConfig::new("Laptop").with_relay_poll_interval(Duration::ZERO);
        assert_eq!(config.relay_poll_interval, MIN_RELAY_POLL_INTERVAL);
    }
}
