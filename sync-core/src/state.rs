//! Per-device sync state machine for journal-sync.
//!
//! Tracks one outbound sync towards one paired device:
//!
//! ```text
//! Idle -> Sending -> Delivered -> AwaitingRemote -> Merged
//!                \-> Failed
//! ```
//!
//! Like the rest of this crate the machine is pure. It takes events and
//! returns the new state plus the actions the orchestrator in sync-client
//! must perform. Which channel to try next is decided by the caller; the
//! state only mirrors it.

use std::fmt;

/// The channel a payload travelled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Live peer-to-peer channel.
    Direct,
    /// Relay store mailbox.
    Relay,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Direct => f.write_str("direct"),
            ChannelKind::Relay => f.write_str("relay"),
        }
    }
}

/// Sync state towards one device - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Nothing in flight.
    #[default]
    Idle,
    /// A push is in progress.
    Sending {
        /// Channel currently being tried.
        via: ChannelKind,
    },
    /// The local snapshot was handed to a channel.
    Delivered {
        /// Channel that accepted the payload.
        via: ChannelKind,
    },
    /// Both channels failed.
    Failed {
        /// Concatenated causes.
        reason: String,
    },
    /// Pushed; waiting for the remote device to push back.
    AwaitingRemote {
        /// Channel our push went over.
        via: ChannelKind,
    },
    /// The remote's payload was merged locally.
    Merged,
}

impl SyncState {
    /// Process an event and return the new state plus actions to execute.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            (_, Event::SendStarted) => (
                Self::Sending {
                    via: ChannelKind::Direct,
                },
                vec![],
            ),

            // From Sending
            (Self::Sending { .. }, Event::DirectFailed { .. }) => (
                Self::Sending {
                    via: ChannelKind::Relay,
                },
                vec![],
            ),
            (Self::Sending { .. }, Event::SendSucceeded { via }) => (
                Self::Delivered { via },
                vec![Action::RecordSyncSuccess],
            ),
            (Self::Sending { .. }, Event::SendFailed { error }) => (
                Self::Failed {
                    reason: error.clone(),
                },
                vec![Action::ReportFailure { error }],
            ),

            // From Delivered
            (Self::Delivered { via }, Event::AwaitRemote) => {
                (Self::AwaitingRemote { via }, vec![])
            }

            // Inbound merges can arrive in any state
            (Self::AwaitingRemote { .. }, Event::RemoteMerged) => {
                (Self::Merged, vec![Action::RecordSyncSuccess])
            }
            (state, Event::RemoteMerged) => (state, vec![Action::RecordSyncSuccess]),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }
}

/// Events that can occur during a sync with one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A push was requested.
    SendStarted,
    /// The direct channel could not be used; the relay is tried next.
    DirectFailed {
        /// Why the direct channel failed.
        error: String,
    },
    /// A channel accepted the payload.
    SendSucceeded {
        /// Which channel.
        via: ChannelKind,
    },
    /// Every channel failed.
    SendFailed {
        /// Concatenated causes.
        error: String,
    },
    /// Bidirectional sync: wait for the remote push.
    AwaitRemote,
    /// A payload from this device was merged.
    RemoteMerged,
}

/// Actions to be executed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Update the registry's `lastSyncAt` for the device.
    RecordSyncSuccess,
    /// Surface the failure to the caller.
    ReportFailure {
        /// Concatenated causes.
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        assert_eq!(SyncState::default(), SyncState::Idle);
    }

    const SENDING_DIRECT: SyncState = SyncState::Sending {
        via: ChannelKind::Direct,
    };

    #[test]
    fn send_started_tries_direct_first() {
        let (state, actions) = SyncState::Idle.on_event(Event::SendStarted);
        assert_eq!(state, SENDING_DIRECT);
        assert!(actions.is_empty());
    }

    #[test]
    fn retry_after_failure_is_allowed() {
        let failed = SyncState::Failed {
            reason: "relay down".into(),
        };
        let (state, _) = failed.on_event(Event::SendStarted);
        assert_eq!(state, SENDING_DIRECT);
    }

    #[test]
    fn direct_failure_moves_to_relay() {
        let (state, actions) = SENDING_DIRECT.on_event(Event::DirectFailed {
            error: "peer unreachable".into(),
        });

        assert_eq!(
            state,
            SyncState::Sending {
                via: ChannelKind::Relay
            }
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn direct_failure_outside_sending_is_ignored() {
        let delivered = SyncState::Delivered {
            via: ChannelKind::Direct,
        };
        let (state, actions) = delivered.clone().on_event(Event::DirectFailed {
            error: "peer unreachable".into(),
        });
        assert_eq!(state, delivered);
        assert!(actions.is_empty());
    }

    #[test]
    fn success_records_sync() {
        let (state, actions) = SENDING_DIRECT.on_event(Event::SendSucceeded {
            via: ChannelKind::Relay,
        });

        assert_eq!(
            state,
            SyncState::Delivered {
                via: ChannelKind::Relay
            }
        );
        assert!(actions.iter().any(|a| matches!(a, Action::RecordSyncSuccess)));
    }

    #[test]
    fn failure_reports_cause() {
        let (state, actions) = SENDING_DIRECT.on_event(Event::SendFailed {
            error: "no sync key".into(),
        });

        assert!(matches!(state, SyncState::Failed { ref reason } if reason == "no sync key"));
        assert!(actions.iter().any(
            |a| matches!(a, Action::ReportFailure { error } if error == "no sync key")
        ));
    }

    #[test]
    fn bidirectional_flow() {
        let state = SyncState::Idle;

        let (state, _) = state.on_event(Event::SendStarted);
        let (state, _) = state.on_event(Event::DirectFailed {
            error: "not ready".into(),
        });
        let (state, _) = state.on_event(Event::SendSucceeded {
            via: ChannelKind::Relay,
        });
        let (state, _) = state.on_event(Event::AwaitRemote);
        assert_eq!(
            state,
            SyncState::AwaitingRemote {
                via: ChannelKind::Relay
            }
        );

        let (state, actions) = state.on_event(Event::RemoteMerged);
        assert_eq!(state, SyncState::Merged);
        assert_eq!(actions, vec![Action::RecordSyncSuccess]);
    }

    #[test]
    fn unsolicited_merge_keeps_state() {
        let (state, actions) = SyncState::Idle.on_event(Event::RemoteMerged);
        assert_eq!(state, SyncState::Idle);
        assert_eq!(actions, vec![Action::RecordSyncSuccess]);
    }

    #[test]
    fn await_remote_requires_delivery() {
        let (state, _) = SyncState::Idle.on_event(Event::AwaitRemote);
        assert_eq!(state, SyncState::Idle);
    }

    #[test]
    fn success_outside_sending_is_ignored() {
        let (state, actions) = SyncState::Idle.on_event(Event::SendSucceeded {
            via: ChannelKind::Direct,
        });
        assert_eq!(state, SyncState::Idle);
        assert!(actions.is_empty());
    }

    #[test]
    fn channel_kind_display() {
        assert_eq!(ChannelKind::Direct.to_string(), "direct");
        assert_eq!(ChannelKind::Relay.to_string(), "relay");
    }
}
