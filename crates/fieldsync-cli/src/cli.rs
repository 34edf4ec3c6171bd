use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use fieldsync_core::Action;

#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(about = "Queue inspection changes offline and sync them when the API is reachable")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a mutation in the offline queue
    #[command(alias = "add")]
    Enqueue {
        /// Entity type, e.g. inspection, template, user
        entity: String,
        /// Mutation kind
        #[arg(value_enum)]
        action: ActionArg,
        /// JSON payload (read from stdin when omitted)
        payload: Option<String>,
        /// Try to sync right after queueing
        #[arg(long)]
        sync: bool,
    },
    /// List every stored operation
    List {
        /// Only show operations for this entity type
        #[arg(long, value_name = "ENTITY")]
        entity: Option<String>,
        /// Number of operations to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List operations waiting to be synced
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push pending operations to the API
    Sync {
        /// Output the sync report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List operations rejected by the API
    DeadLetters {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move a rejected operation back into the pending queue
    Requeue {
        /// Operation ID
        id: String,
    },
    /// Show local storage usage
    Storage {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every stored operation, synced or not
    Clear {
        /// Confirm deletion of unsynced work
        #[arg(long)]
        yes: bool,
    },
    /// Keep running, probing connectivity and syncing on reconnect
    Watch {
        /// Seconds between connectivity probes
        #[arg(long, default_value = "15", value_name = "SECS")]
        interval: u64,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ActionArg {
    Create,
    Update,
    Delete,
}

impl From<ActionArg> for Action {
    fn from(value: ActionArg) -> Self {
        match value {
            ActionArg::Create => Self::Create,
            ActionArg::Update => Self::Update,
            ActionArg::Delete => Self::Delete,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// API base URL, e.g. <https://api.example.com/v1>
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Local storage quota in bytes
        #[arg(long, value_name = "BYTES")]
        quota_bytes: Option<u64>,
        /// Entity types routed to the API (repeatable)
        #[arg(long = "entity", value_name = "ENTITY")]
        entities: Vec<String>,
        /// Full engine settings as JSON; individual flags below take precedence
        #[arg(long, value_name = "JSON")]
        engine_json: Option<String>,
        /// Wait after reconnecting before syncing
        #[arg(long, value_name = "MS")]
        settle_delay_ms: Option<u64>,
        /// Per-request timeout
        #[arg(long, value_name = "MS")]
        request_timeout_ms: Option<u64>,
        /// Days to keep synced operations
        #[arg(long, value_name = "DAYS")]
        retention_days: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show {
        /// Profile name to show
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
