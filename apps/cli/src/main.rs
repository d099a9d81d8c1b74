//! DataMeta command-line client.
//!
//! Stages files and metadata on a DataMeta instance and turns them into
//! submissions.

mod app;
mod backend;
mod config;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "datameta")]
#[command(version)]
#[command(about = "Upload files, import sample sheets and submit data to DataMeta")]
#[command(long_about = r#"
Stages data on a DataMeta instance and submits it.

Examples:
  datameta --server https://dm.example.org login --email me@example.org
  datameta upload ./run42                  Hash and upload every file in a directory
  datameta samplesheet sheet.xlsx          Import the records of a sample sheet
  datameta pending                         Show staged data and validation status
  datameta submit --label "run 42"         Submit everything staged
  datameta keys list                       Show the API keys of the account
"#)]
pub struct Cli {
    /// Base URL of the DataMeta instance
    #[arg(long, global = true, env = "DATAMETA_URL")]
    server: Option<String>,

    /// API key, overrides the stored one
    #[arg(long, global = true, env = "DATAMETA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Configuration file
    #[arg(long, global = true, env = "DATAMETA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an API key and store it in the configuration
    Login {
        /// Account email address
        #[arg(long)]
        email: String,

        /// Account password; read from stdin when omitted
        #[arg(long, env = "DATAMETA_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Label of the new API key
        #[arg(long)]
        label: Option<String>,
    },

    /// Revoke the stored API key and forget it
    Logout {
        /// Only forget the key locally, without revoking it
        #[arg(long)]
        local: bool,
    },

    /// List or revoke the API keys of the account
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },

    /// Change the account password
    Password {
        /// Current password; read from stdin when omitted
        #[arg(long, env = "DATAMETA_PASSWORD", hide_env_values = true)]
        current: Option<String>,

        /// New password; read from stdin when omitted
        #[arg(long, env = "DATAMETA_NEW_PASSWORD", hide_env_values = true)]
        new: Option<String>,
    },

    /// Hash, announce, upload and confirm files
    Upload {
        /// Files or directories (walked recursively)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// How many times failed files are queued again
        #[arg(long, default_value = "0")]
        retries: u32,
    },

    /// Convert sample sheets and store their records
    Samplesheet {
        /// Sample sheet files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Show staged files and records with their validation status
    Pending {
        /// Leave an entity out of the selection (UUID or site ID)
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Validate the staged selection without submitting it
    Validate {
        /// Leave an entity out of the selection (UUID or site ID)
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Submit the staged files and records
    Submit {
        /// Submission label
        #[arg(short, long)]
        label: Option<String>,

        /// Leave an entity out of the submission (UUID or site ID)
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Delete a staged file or record
    Delete {
        #[arg(value_enum)]
        kind: EntityArg,

        /// UUID or site ID
        id: String,
    },

    /// Browse submitted records
    View {
        /// Search terms (at most three)
        #[arg(short, long, default_value = "")]
        search: String,

        /// Index of the first row
        #[arg(long, default_value = "0")]
        start: u64,

        /// Number of rows
        #[arg(short = 'n', long, default_value = "25")]
        length: u64,

        /// Sort column: 0 label, 1 submission time, 2 user, 3 group,
        /// 4 site ID, 5 and up metadata
        #[arg(long, default_value = "1")]
        order: u32,

        /// Sort ascending
        #[arg(long)]
        asc: bool,
    },
}

#[derive(Subcommand)]
pub enum KeysAction {
    /// Show all API keys; the one in use is marked with `*`
    List,

    /// Revoke an API key
    Revoke {
        /// Key UUID
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum EntityArg {
    File,
    Record,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting datameta");

    let config = config::Config::load(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli, config))
}
