//! Add local records.
//!
//! Stand-in for the app's capture flow, so the CLI has something to sync.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use journal_sync_client::RecordStore;
use journal_sync_types::{timestamp, ActionItem, EntryType, Expense, JournalEntry};
use std::path::Path;

use super::record_store;
use crate::config::CliConfig;

/// Add a journal entry.
pub async fn entry(data_dir: &Path, text: &str, entry_type: EntryType) -> Result<()> {
    CliConfig::load(data_dir).await?;
    let store = record_store(data_dir);

    let entry = JournalEntry::new(text, entry_type);
    let mut entries = store.get_entries().await?;
    entries.push(entry.clone());
    store.save_entries(&entries).await?;

    println!("Added entry {}", entry.id);
    Ok(())
}

/// Add an expense.
pub async fn expense(
    data_dir: &Path,
    description: &str,
    amount: f64,
    currency: Option<String>,
    category: Option<String>,
) -> Result<()> {
    CliConfig::load(data_dir).await?;
    let store = record_store(data_dir);

    let mut expense = Expense::new(description, amount);
    expense.currency = currency;
    expense.category = category;
    let mut expenses = store.get_expenses().await?;
    expenses.push(expense.clone());
    store.save_expenses(&expenses).await?;

    println!("Added expense {}", expense.id);
    Ok(())
}

/// Add an action item.
pub async fn action(data_dir: &Path, description: &str, due: Option<&str>) -> Result<()> {
    CliConfig::load(data_dir).await?;
    let store = record_store(data_dir);

    let mut item = ActionItem::new(description);
    item.due_date = due.map(parse_due).transpose()?;
    let mut items = store.get_action_items().await?;
    items.push(item.clone());
    store.save_action_items(&items).await?;

    println!("Added action item {}", item.id);
    Ok(())
}

/// Accept a full RFC 3339 timestamp or a plain `YYYY-MM-DD` date.
fn parse_due(raw: &str) -> Result<DateTime<Utc>> {
    if let Some(at) = timestamp::parse(raw) {
        return Ok(at);
    }
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid due date '{}', expected YYYY-MM-DD", raw))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .context("Invalid due date")?;
    Ok(midnight.and_utc())
}
