//! CLI command implementations
//!
//! Each command resolves its configuration, builds the gateway and the
//! core components from it, and runs to completion on the calling thread.

use std::sync::Arc;

use tracing::info;

use super::config::Config;
use super::errors::{CliError, CliResult};
use super::io::{spawn_operator_input, write_json, write_text, TerminalObserver};
use crate::gateway::NodeGateway;
use crate::health::server::{HealthServer, HealthState};
use crate::monitor::{render_report, render_snapshot, Monitor};
use crate::switchover::{SwitchoverOrchestrator, SwitchoverReport, SwitchoverStatus};
use crate::topology::TopologyProber;

/// Build the live gateway.
#[cfg(feature = "mysql")]
pub fn build_gateway(config: &Config) -> CliResult<Arc<dyn NodeGateway>> {
    let gateway = crate::gateway::mysql::MySqlGateway::new(config.connect_timeout())?;
    Ok(Arc::new(gateway))
}

/// Build the live gateway.
#[cfg(not(feature = "mysql"))]
pub fn build_gateway(_config: &Config) -> CliResult<Arc<dyn NodeGateway>> {
    Err(CliError::new(
        super::errors::CliErrorCode::GatewayError,
        "built without the 'mysql' feature; no live gateway available",
    ))
}

fn prober(config: &Config, gateway: Arc<dyn NodeGateway>) -> CliResult<TopologyProber> {
    Ok(TopologyProber::new(
        gateway,
        config.credentials(),
        config.discovery_mode()?,
        config.default_port,
    ))
}

fn orchestrator(config: &Config, gateway: Arc<dyn NodeGateway>) -> SwitchoverOrchestrator {
    SwitchoverOrchestrator::new(gateway, config.credentials(), config.switchover_settings())
}

/// Interactive monitor loop.
pub fn monitor(config: &Config, gateway: Arc<dyn NodeGateway>, read_input: bool) -> CliResult<()> {
    let primary = config.primary_address()?;
    let mut monitor = Monitor::new(
        prober(config, Arc::clone(&gateway))?,
        orchestrator(config, gateway),
        primary,
        config.refresh_interval(),
    );

    let (tx, rx) = crossbeam_channel::unbounded();
    // Without input the sender is kept here so the loop runs until killed.
    let _idle_sender = if read_input {
        spawn_operator_input(tx)?;
        eprintln!("commands: s = switchover, r = refresh, q = quit");
        None
    } else {
        Some(tx)
    };

    info!(
        primary = %monitor.primary(),
        interval_secs = config.refresh_interval_secs,
        "monitor started"
    );
    monitor.run(rx, &mut TerminalObserver);
    Ok(())
}

/// One-shot topology probe.
pub fn status(config: &Config, gateway: Arc<dyn NodeGateway>, json: bool) -> CliResult<()> {
    let snapshot = prober(config, gateway)?.probe(&config.primary_address()?);
    if json {
        write_json(&snapshot)
    } else {
        write_text(&render_snapshot(&snapshot))
    }
}

/// One planned switchover.
pub fn switchover(config: &Config, gateway: Arc<dyn NodeGateway>, json: bool) -> CliResult<()> {
    let primary = config.primary_address()?;
    let snapshot = prober(config, Arc::clone(&gateway))?.probe(&primary);
    let report = orchestrator(config, gateway).run(&snapshot)?;

    if json {
        write_json(&report)?;
    } else {
        write_text(&render_report(&report))?;
    }
    check_report(&report)
}

/// Map a finished run to the process outcome.
pub fn check_report(report: &SwitchoverReport) -> CliResult<()> {
    match &report.status {
        SwitchoverStatus::Completed => Ok(()),
        status => Err(CliError::switchover_failed(status.to_string())),
    }
}

/// HTTP health responder.
pub fn healthcheck(
    config: &Config,
    gateway: Arc<dyn NodeGateway>,
    listen: Option<&str>,
    target: Option<&str>,
    max_delay: Option<u64>,
) -> CliResult<()> {
    let mut config = config.clone();
    if let Some(listen) = listen {
        config.health.listen = listen.to_string();
    }
    if let Some(target) = target {
        config.health.target = target.to_string();
    }
    if let Some(max_delay) = max_delay {
        config.health.max_delay_secs = max_delay;
    }

    let server = HealthServer::new(
        config.health_listen()?,
        HealthState {
            gateway,
            credentials: config.credentials(),
            target: config.health_target()?,
            max_delay: config.health.max_delay_secs,
        },
    );
    server.run_blocking().map_err(CliError::from)
}
