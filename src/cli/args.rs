//! CLI argument definitions using clap
//!
//! Commands:
//! - replwatch monitor      [--config <path>] [--no-input]
//! - replwatch status       [--config <path>] [--json]
//! - replwatch switchover   [--config <path>] [--json]
//! - replwatch healthcheck  [--config <path>] [--listen <addr>] [--target <host:port>]

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// replwatch - MariaDB replication monitor and planned switchover
#[derive(Parser, Debug)]
#[command(name = "replwatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Path to configuration file (default: ./replwatch.json when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Primary address, host[:port]
    #[arg(long)]
    pub primary: Option<String>,

    /// Comma-separated replica list; switches discovery to static
    #[arg(long, value_delimiter = ',')]
    pub replicas: Vec<String>,

    /// Login in user[:password] format
    #[arg(long)]
    pub user: Option<String>,

    /// Replication login in user[:password] format
    #[arg(long)]
    pub rpluser: Option<String>,

    /// Debug logging for this crate
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Refresh the topology periodically; read s/r/q from stdin
    Monitor {
        #[command(flatten)]
        common: CommonArgs,

        /// Do not read operator commands from stdin
        #[arg(long)]
        no_input: bool,
    },

    /// Probe the topology once and print it
    Status {
        #[command(flatten)]
        common: CommonArgs,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one planned switchover and print the report
    Switchover {
        #[command(flatten)]
        common: CommonArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the replication health verdict over HTTP
    Healthcheck {
        #[command(flatten)]
        common: CommonArgs,

        /// Listen address, overrides health.listen
        #[arg(long)]
        listen: Option<String>,

        /// Node to check, overrides health.target
        #[arg(long)]
        target: Option<String>,

        /// Highest acceptable delay in seconds, overrides health.max_delay_secs
        #[arg(long)]
        max_delay: Option<u64>,
    },
}

impl Command {
    /// Options shared by every command.
    pub fn common(&self) -> &CommonArgs {
        match self {
            Self::Monitor { common, .. }
            | Self::Status { common, .. }
            | Self::Switchover { common, .. }
            | Self::Healthcheck { common, .. } => common,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
