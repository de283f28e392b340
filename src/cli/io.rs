//! Terminal I/O for the CLI
//!
//! - Tables and reports go to stdout
//! - `--json` output is a single JSON document on stdout
//! - Operator commands are read line by line from stdin

use std::io::{self, BufRead, Write};
use std::thread;

use crossbeam_channel::Sender;
use serde::Serialize;
use tracing::{debug, warn};

use super::errors::CliResult;
use crate::monitor::{render_report, render_snapshot, MonitorObserver, OperatorCommand};
use crate::switchover::SwitchoverReport;
use crate::topology::TopologySnapshot;

/// Write a value as pretty JSON to stdout
pub fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Write text to stdout
pub fn write_text(text: &str) -> CliResult<()> {
    let mut stdout = io::stdout();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Forward operator commands typed on stdin. The sender is dropped at
/// end of input, which ends the monitor loop.
pub fn spawn_operator_input(commands: Sender<OperatorCommand>) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match OperatorCommand::parse(&line) {
                    Some(command) => {
                        let quit = command == OperatorCommand::Quit;
                        if commands.send(command).is_err() || quit {
                            break;
                        }
                    }
                    None => eprintln!("unknown command '{}': s = switchover, r = refresh, q = quit", line.trim()),
                }
            }
            debug!("operator input closed");
        })
}

/// Prints snapshots and reports to the terminal
pub struct TerminalObserver;

impl MonitorObserver for TerminalObserver {
    fn on_snapshot(&mut self, snapshot: &TopologySnapshot) {
        if let Err(e) = write_text(&format!("\n{}", render_snapshot(snapshot))) {
            warn!(error = %e, "cannot write snapshot");
        }
    }

    fn on_switchover(&mut self, report: &SwitchoverReport) {
        if let Err(e) = write_text(&format!("\n{}", render_report(report))) {
            warn!(error = %e, "cannot write switchover report");
        }
    }
}
