//! CLI module for replwatch
//!
//! Provides command-line interface for:
//! - monitor: periodic topology view with operator-triggered switchover
//! - status: one-shot topology snapshot
//! - switchover: one planned switchover
//! - healthcheck: HTTP replication health responder

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command, CommonArgs};
pub use commands::{build_gateway, check_report, healthcheck, monitor, status, switchover};
pub use config::{Config, HealthConfig, DEFAULT_CONFIG_PATH};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{spawn_operator_input, write_json, write_text, TerminalObserver};

use crate::observability::init_logging;

/// Parse arguments, load configuration and run the command.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

/// Run one parsed command.
pub fn run_command(command: Command) -> CliResult<()> {
    let common = command.common();
    let config = Config::resolve(common)?;
    init_logging(config.log_format, common.verbose).map_err(CliError::config_error)?;

    let gateway = build_gateway(&config)?;
    match &command {
        Command::Monitor { no_input, .. } => monitor(&config, gateway, !no_input),
        Command::Status { json, .. } => status(&config, gateway, *json),
        Command::Switchover { json, .. } => switchover(&config, gateway, *json),
        Command::Healthcheck {
            listen,
            target,
            max_delay,
            ..
        } => healthcheck(
            &config,
            gateway,
            listen.as_deref(),
            target.as_deref(),
            *max_delay,
        ),
    }
}
