use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tmm_core::EntryKind;

#[derive(Parser)]
#[command(name = "tmm")]
#[command(about = "Track income and expenses offline, sync when connected")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the JSON config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Year to work on (defaults to the current year)
    #[arg(long, global = true)]
    pub year: Option<i32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in, register, or sign out
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Manage categories
    #[command(alias = "cat")]
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Manage transactions
    #[command(alias = "transaction")]
    Tx {
        #[command(subcommand)]
        command: TxCommands,
    },
    /// Synchronize with the server
    Sync(SyncArgs),
    /// Show the audit queue of local changes
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Empty the queue
        #[arg(long, conflicts_with_all = ["json", "drop"])]
        clear: bool,
        /// Remove one entry by its queue ID
        #[arg(long, value_name = "ID", conflicts_with = "json")]
        drop: Option<i64>,
    },
    /// Show local store statistics and yearly totals
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in
    Login {
        username: String,
        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account and sign in
    Register {
        username: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Show the signed-in user
    Status {
        /// Also check the token with the server
        #[arg(long)]
        verify: bool,
    },
    /// Sign out and wipe local data
    Logout,
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// List categories
    List {
        /// Only show one type
        #[arg(long = "type", value_enum)]
        kind: Option<KindArg>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a category
    Add {
        name: String,
        #[arg(long = "type", value_enum)]
        kind: KindArg,
    },
    /// Rename a category
    Rename { id: String, name: String },
    /// Delete a category
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// List transactions
    List {
        #[arg(long = "type", value_enum)]
        kind: Option<KindArg>,
        /// Category ID
        #[arg(long)]
        category: Option<String>,
        /// First day to include (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date, requires = "to")]
        from: Option<NaiveDate>,
        /// Last day to include (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date, requires = "from")]
        to: Option<NaiveDate>,
        /// Show only the most recent N
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a transaction
    Add {
        amount: f64,
        /// Category ID
        #[arg(long)]
        category: String,
        /// Defaults to the category's type
        #[arg(long = "type", value_enum)]
        kind: Option<KindArg>,
        /// Defaults to today
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Change a transaction
    Edit {
        id: String,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long = "type", value_enum)]
        kind: Option<KindArg>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a transaction
    Delete { id: String },
    /// Search descriptions
    Search {
        query: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
pub struct SyncArgs {
    #[command(subcommand)]
    pub command: Option<SyncCommands>,

    /// Upload local changes only
    #[arg(long, conflicts_with = "backoff")]
    pub quick: bool,

    /// Retry transient failures with exponential backoff
    #[arg(long)]
    pub backoff: bool,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show coordinator and store sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing periodically until interrupted
    Watch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Income,
    Expense,
}

impl From<KindArg> for EntryKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Income => Self::Income,
            KindArg::Expense => Self::Expense,
        }
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|error| format!("expected YYYY-MM-DD: {error}"))
}
