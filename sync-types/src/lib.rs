//! # sync-types
//!
//! Wire format and record types for journal device-to-device sync.
//!
//! This crate provides the foundational types used across all journal-sync crates:
//! - [`DeviceId`], [`SyncKey`] - Device identity and mailbox addressing
//! - [`JournalEntry`], [`Expense`], [`ActionItem`] - The three synced collections
//! - [`SyncPayload`] - The snapshot exchanged wholesale in one sync
//! - [`MailboxRecord`] - What the relay stores for a target device
//! - [`PairedDevice`] - A registry entry for a device we paired with
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod device;
mod error;
mod ids;
mod payload;
mod records;
pub mod timestamp;

pub use device::PairedDevice;
pub use error::WireError;
pub use ids::{DeviceId, SyncKey};
pub use payload::{MailboxRecord, SyncPayload};
pub use records::{ActionItem, EntryType, Expense, JournalEntry, Record, RecordKind};
