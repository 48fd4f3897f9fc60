//! Record-level last-write-wins merge.
//!
//! Given a local and a remote copy of one collection, [`merge`] produces
//! the reconciled collection:
//!
//! - a record present on one side only is kept unchanged
//! - for two records sharing an `id`, the later conflict timestamp wins
//!   and replaces the other wholesale (no field-level merging)
//! - a timestamp beats no timestamp
//! - equal timestamps, or none on either side, keep the local copy
//!
//! The rule is idempotent (`merge(X, X) == X`) and the winner of a
//! conflict does not depend on which side is local, so two devices that
//! push to each other converge regardless of delivery order. Timestamps
//! are device wall clocks; a device with a skewed clock can win or lose
//! conflicts it should not. That is an accepted limitation.

use std::collections::HashMap;

use journal_sync_types::{ActionItem, Expense, JournalEntry, Record, SyncPayload};

/// What one merge did to a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Remote records whose id was not present locally.
    pub added: usize,
    /// Local records replaced by a newer remote copy.
    pub replaced: usize,
    /// Remote records discarded because the local copy won.
    pub kept: usize,
}

impl MergeStats {
    /// Whether the merged collection differs from the local one.
    pub fn changed(&self) -> bool {
        self.added > 0 || self.replaced > 0
    }
}

/// Merge two copies of a collection. Output order is not part of the contract.
pub fn merge<R: Record>(local: Vec<R>, remote: Vec<R>) -> Vec<R> {
    merge_with_stats(local, remote).0
}

/// [`merge`], also reporting what changed.
pub fn merge_with_stats<R: Record>(local: Vec<R>, remote: Vec<R>) -> (Vec<R>, MergeStats) {
    let mut merged: Vec<R> = Vec::with_capacity(local.len() + remote.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(local.len() + remote.len());

    // Duplicate ids inside the local copy collapse under the same rule.
    for record in local {
        match index.get(record.id()) {
            Some(&slot) => {
                if incoming_wins(&merged[slot], &record) {
                    merged[slot] = record;
                }
            }
            None => {
                index.insert(record.id().to_owned(), merged.len());
                merged.push(record);
            }
        }
    }

    let mut stats = MergeStats::default();
    for record in remote {
        match index.get(record.id()) {
            Some(&slot) => {
                if incoming_wins(&merged[slot], &record) {
                    merged[slot] = record;
                    stats.replaced += 1;
                } else {
                    stats.kept += 1;
                }
            }
            None => {
                index.insert(record.id().to_owned(), merged.len());
                merged.push(record);
                stats.added += 1;
            }
        }
    }

    (merged, stats)
}

fn incoming_wins<R: Record>(current: &R, incoming: &R) -> bool {
    match (current.conflict_timestamp(), incoming.conflict_timestamp()) {
        (Some(current), Some(incoming)) => incoming > current,
        (None, Some(_)) => true,
        _ => false,
    }
}

/// The three local collections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collections {
    /// Journal entries.
    pub entries: Vec<JournalEntry>,
    /// Expenses.
    pub expenses: Vec<Expense>,
    /// Action items.
    pub action_items: Vec<ActionItem>,
}

impl Collections {
    /// Total number of records.
    pub fn len(&self) -> usize {
        self.entries.len() + self.expenses.len() + self.action_items.len()
    }

    /// Whether all three collections are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Package as an outbound payload stamped now.
    pub fn into_payload(self) -> SyncPayload {
        SyncPayload::snapshot(self.entries, self.expenses, self.action_items)
    }
}

/// Per-collection stats for one inbound payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Journal entries.
    pub entries: MergeStats,
    /// Expenses.
    pub expenses: MergeStats,
    /// Action items.
    pub action_items: MergeStats,
}

impl MergeSummary {
    /// Whether any collection changed.
    pub fn changed(&self) -> bool {
        self.entries.changed() || self.expenses.changed() || self.action_items.changed()
    }
}

/// Merge an inbound payload into the local collections.
///
/// A collection absent from the payload leaves the local copy as is.
pub fn merge_payload(local: Collections, remote: SyncPayload) -> (Collections, MergeSummary) {
    let mut summary = MergeSummary::default();

    let entries = match remote.entries {
        Some(remote) => {
            let (merged, stats) = merge_with_stats(local.entries, remote);
            summary.entries = stats;
            merged
        }
        None => local.entries,
    };
    let expenses = match remote.expenses {
        Some(remote) => {
            let (merged, stats) = merge_with_stats(local.expenses, remote);
            summary.expenses = stats;
            merged
        }
        None => local.expenses,
    };
    let action_items = match remote.action_items {
        Some(remote) => {
            let (merged, stats) = merge_with_stats(local.action_items, remote);
            summary.action_items = stats;
            merged
        }
        None => local.action_items,
    };

    (
        Collections {
            entries,
            expenses,
            action_items,
        },
        summary,
    )
}
