//! The three synced record collections.
//!
//! Record identity is the `id` alone: two records with the same id are the
//! same logical entity no matter which device wrote them. Ids are assigned
//! by the client that creates the record and never re-derived here.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::timestamp::lenient;

/// Which collection a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Free-text journal entries.
    Entry,
    /// Expenses.
    Expense,
    /// Action items.
    ActionItem,
}

impl RecordKind {
    /// Name of the collection in payloads and in the record store.
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::Entry => "entries",
            RecordKind::Expense => "expenses",
            RecordKind::ActionItem => "actionItems",
        }
    }
}

/// A syncable record.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The collection this record type lives in.
    const KIND: RecordKind;

    /// Stable, caller-assigned identifier.
    fn id(&self) -> &str;

    /// Timestamp used for last-write-wins, if the record has a usable one.
    fn conflict_timestamp(&self) -> Option<DateTime<Utc>>;
}

fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// How the classifier filed a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Entry produced an expense.
    Expense,
    /// Entry produced an action item.
    Action,
    /// Plain log note.
    #[default]
    Log,
}

/// A free-text journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    /// Record id.
    pub id: String,
    /// The text the user typed.
    #[serde(default)]
    pub text: String,
    /// Classification result.
    #[serde(rename = "type", default)]
    pub entry_type: EntryType,
    /// When the entry was written (conflict timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none", with = "lenient")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Fields written by other app versions, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JournalEntry {
    /// Create an entry with a fresh id, stamped now.
    pub fn new(text: impl Into<String>, entry_type: EntryType) -> Self {
        Self {
            id: new_record_id(),
            text: text.into(),
            entry_type,
            timestamp: Some(Utc::now()),
            extra: Map::new(),
        }
    }
}

impl Record for JournalEntry {
    const KIND: RecordKind = RecordKind::Entry;

    fn id(&self) -> &str {
        &self.id
    }

    fn conflict_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

/// An expense extracted from an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// Record id.
    pub id: String,
    /// What the money went on.
    #[serde(default)]
    pub description: String,
    /// Amount in `currency` units.
    #[serde(default)]
    pub amount: f64,
    /// ISO 4217 code, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Free-form category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Creation time (conflict timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none", with = "lenient")]
    pub created_at: Option<DateTime<Utc>>,
    /// Fields written by other app versions, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Expense {
    /// Create an expense with a fresh id, stamped now.
    pub fn new(description: impl Into<String>, amount: f64) -> Self {
        Self {
            id: new_record_id(),
            description: description.into(),
            amount,
            currency: None,
            category: None,
            created_at: Some(Utc::now()),
            extra: Map::new(),
        }
    }
}

impl Record for Expense {
    const KIND: RecordKind = RecordKind::Expense;

    fn id(&self) -> &str {
        &self.id
    }

    fn conflict_timestamp(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

/// A to-do extracted from an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    /// Record id.
    pub id: String,
    /// What needs doing.
    #[serde(default)]
    pub description: String,
    /// Whether it has been done.
    #[serde(default)]
    pub completed: bool,
    /// Optional due date.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "lenient")]
    pub due_date: Option<DateTime<Utc>>,
    /// Creation time (conflict timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none", with = "lenient")]
    pub created_at: Option<DateTime<Utc>>,
    /// Fields written by other app versions, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActionItem {
    /// Create an open action item with a fresh id, stamped now.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: new_record_id(),
            description: description.into(),
            completed: false,
            due_date: None,
            created_at: Some(Utc::now()),
            extra: Map::new(),
        }
    }
}

impl Record for ActionItem {
    const KIND: RecordKind = RecordKind::ActionItem;

    fn id(&self) -> &str {
        &self.id
    }

    fn conflict_timestamp(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}
