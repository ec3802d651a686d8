use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DB_PATH_ENV: &str = "WAYPOINT_DB_PATH";
pub const DEFAULT_DB_PATH: &str = "waypoint.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExpiryArg {
    #[value(name = "never")]
    Never,
    #[value(name = "1h")]
    OneHour,
    #[value(name = "24h")]
    OneDay,
    #[value(name = "7d")]
    SevenDays,
    #[value(name = "30d")]
    ThirtyDays,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    #[value(name = "created")]
    Created,
    #[value(name = "visits")]
    Visits,
    #[value(name = "code")]
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Csv,
}

impl Display for FormatArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatArg::Json => write!(f, "json"),
            FormatArg::Csv => write!(f, "csv"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "waypoint")]
pub struct CLI {
    /// SQLite database file backing the registry.
    #[arg(long, env = DB_PATH_ENV, default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten a URL.
    Create {
        url: String,

        /// Custom alias to register alongside the generated code.
        #[arg(long)]
        alias: Option<String>,

        #[arg(long, value_enum, default_value_t = ExpiryArg::Never)]
        expires: ExpiryArg,

        /// Secret visitors must present before the link resolves.
        #[arg(long)]
        secret: Option<String>,

        /// Mint a fresh code even if the URL is already registered.
        #[arg(long)]
        force: bool,
    },

    /// Resolve a code or alias; a live hit counts as a visit.
    Resolve {
        key: String,

        #[arg(long)]
        secret: Option<String>,
    },

    /// List every registered link.
    List {
        #[arg(long, value_enum, default_value_t = SortArg::Created)]
        sort: SortArg,
    },

    /// Case-insensitive substring search over URLs, codes and aliases.
    Search { query: String },

    /// Delete a link by its numeric id.
    Delete { id: u64 },

    /// Hard-delete links past their grace period and trim oversized
    /// visit histories.
    Sweep,

    /// Dump all records.
    Export {
        #[arg(long, value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,

        /// Write to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}
