//! # sync-core
//!
//! Pure logic for journal-sync (no I/O, instant tests).
//!
//! This crate implements the merge rule, the pairing code format and the
//! per-device sync state machine without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about merge outcomes and state transitions
//!
//! The actual I/O (channels, relay, record store) is performed by
//! `sync-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod merge;
pub mod pairing;
pub mod state;

pub use merge::{merge, merge_payload, merge_with_stats, Collections, MergeStats, MergeSummary};
pub use pairing::{PairingError, PairingPayload};
pub use state::{Action, ChannelKind, Event, SyncState};
