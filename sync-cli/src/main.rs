//! # journal-sync
//!
//! CLI tool for pairing journal devices and syncing their records.
//!
//! ## Commands
//!
//! - `init`: Initialize device identity
//! - `code`: Show this device's pairing code
//! - `pair`: Pair with another device's code
//! - `devices`: List paired devices
//! - `add`: Add a local entry, expense or action item
//! - `sync`: Send local records to a paired device
//! - `listen`: Receive updates from paired devices
//! - `status`: Show sync status
//! - `forget`: Forget paired devices
//!
//! The CLI has no direct transport, so every sync goes through the
//! relay store named in `config.toml`.
//!
//! ## Example
//!
//! ```bash
//! # Two devices sharing one relay database
//! journal-sync --data-dir ./laptop init --name Laptop --relay ./relay.db
//! journal-sync --data-dir ./phone init --name Phone --relay ./relay.db
//!
//! # Exchange pairing codes
//! journal-sync --data-dir ./phone pair "$(journal-sync --data-dir ./laptop code)"
//! journal-sync --data-dir ./laptop pair "$(journal-sync --data-dir ./phone code)"
//!
//! # Sync
//! journal-sync --data-dir ./phone add entry "Ran 5k"
//! journal-sync --data-dir ./phone sync Laptop
//! journal-sync --data-dir ./laptop listen --once
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use journal_sync_types::EntryType;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{add, code, devices, forget, init, listen, pair, status, sync};

/// CLI tool for pairing journal devices and syncing their records.
#[derive(Parser, Debug)]
#[command(name = "journal-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for device identity, records and paired devices
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize device identity
    Init {
        /// Device name
        #[arg(long, short)]
        name: String,

        /// Relay database shared with the other devices
        #[arg(long)]
        relay: Option<PathBuf>,
    },

    /// Show this device's pairing code
    Code {
        /// URL-safe compact form, for QR codes
        #[arg(long)]
        compact: bool,
    },

    /// Pair with the code shown on another device
    Pair {
        /// Pairing code (JSON or compact)
        code: String,
    },

    /// List paired devices
    Devices,

    /// Add a local record
    Add {
        #[command(subcommand)]
        record: AddCommand,
    },

    /// Send local records to a paired device
    Sync {
        /// Device name, id or id prefix
        device: String,

        /// Also wait for the other device's records
        #[arg(long)]
        both: bool,
    },

    /// Receive updates from paired devices
    Listen {
        /// Drain pending updates once and exit
        #[arg(long)]
        once: bool,
    },

    /// Show sync status
    Status,

    /// Forget paired devices
    Forget {
        /// Forget every paired device
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
enum AddCommand {
    /// Add a journal entry
    Entry {
        /// Entry text
        text: String,

        /// Classification
        #[arg(long = "type", value_enum, default_value = "log")]
        entry_type: EntryKind,
    },

    /// Add an expense
    Expense {
        /// What the money was spent on
        description: String,

        /// Amount
        amount: f64,

        /// Currency code
        #[arg(long)]
        currency: Option<String>,

        /// Category
        #[arg(long)]
        category: Option<String>,
    },

    /// Add an action item
    Action {
        /// What needs doing
        description: String,

        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EntryKind {
    Log,
    Expense,
    Action,
}

impl From<EntryKind> for EntryType {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Log => EntryType::Log,
            EntryKind::Expense => EntryType::Expense,
            EntryKind::Action => EntryType::Action,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    match cli.command {
        Commands::Init { name, relay } => init::run(&data_dir, &name, relay).await?,
        Commands::Code { compact } => code::run(&data_dir, compact).await?,
        Commands::Pair { code } => pair::run(&data_dir, &code).await?,
        Commands::Devices => devices::run(&data_dir).await?,
        Commands::Add { record } => match record {
            AddCommand::Entry { text, entry_type } => {
                add::entry(&data_dir, &text, entry_type.into()).await?
            }
            AddCommand::Expense {
                description,
                amount,
                currency,
                category,
            } => add::expense(&data_dir, &description, amount, currency, category).await?,
            AddCommand::Action { description, due } => {
                add::action(&data_dir, &description, due.as_deref()).await?
            }
        },
        Commands::Sync { device, both } => sync::run(&data_dir, &device, both).await?,
        Commands::Listen { once } => listen::run(&data_dir, once).await?,
        Commands::Status => status::run(&data_dir).await?,
        Commands::Forget { all } => forget::run(&data_dir, all).await?,
    }

    Ok(())
}

/// Get the default data directory for journal-sync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "ydun", "journal-sync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
