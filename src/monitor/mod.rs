//! Topology Monitor
//!
//! One control flow per process. A ticker drives periodic snapshot
//! refreshes while idle; operator commands arrive on a second channel.
//! Both are merged at a single `select!`, so a switchover and a refresh
//! never run at the same time. The ticker is paused for the duration of a
//! switchover and recreated afterwards.

mod display;

pub use display::{render_report, render_snapshot};

use std::time::Duration;

use crossbeam_channel::{select, tick, Receiver};
use tracing::{debug, error, info};

use crate::switchover::{SwitchoverError, SwitchoverOrchestrator, SwitchoverReport, SwitchoverResult};
use crate::topology::{NodeAddress, TopologyProber, TopologySnapshot};

/// Operator input to the monitor loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Refresh the snapshot now
    Refresh,
    /// Run a planned switchover
    Switchover,
    /// Leave the loop
    Quit,
}

impl OperatorCommand {
    /// Map an input line to a command (`s`, `r`, `q`).
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "s" | "switchover" => Some(Self::Switchover),
            "r" | "refresh" => Some(Self::Refresh),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Receives what the monitor produces.
pub trait MonitorObserver {
    /// A new snapshot was taken.
    fn on_snapshot(&mut self, snapshot: &TopologySnapshot);

    /// A switchover run finished.
    fn on_switchover(&mut self, report: &SwitchoverReport);

    /// A switchover request was refused.
    fn on_switchover_error(&mut self, err: &SwitchoverError) {
        error!(error = %err, "switchover request refused");
    }
}

/// Periodic prober plus switchover trigger for one primary
pub struct Monitor {
    prober: TopologyProber,
    orchestrator: SwitchoverOrchestrator,
    primary: NodeAddress,
    refresh_interval: Duration,
    current: Option<TopologySnapshot>,
}

impl Monitor {
    pub fn new(
        prober: TopologyProber,
        orchestrator: SwitchoverOrchestrator,
        primary: NodeAddress,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            prober,
            orchestrator,
            primary,
            refresh_interval,
            current: None,
        }
    }

    /// The primary currently monitored.
    pub fn primary(&self) -> &NodeAddress {
        &self.primary
    }

    /// Take a new snapshot and keep it as current.
    pub fn refresh(&mut self) -> &TopologySnapshot {
        let snapshot = self.prober.probe(&self.primary);
        debug!(
            primary = %self.primary,
            replicas = snapshot.replicas.len(),
            "snapshot refreshed"
        );
        self.current.insert(snapshot)
    }

    /// Last snapshot taken, if any.
    pub fn current_snapshot(&self) -> Option<&TopologySnapshot> {
        self.current.as_ref()
    }

    /// Run a switchover against a fresh snapshot.
    ///
    /// When the candidate was promoted the monitor follows the new primary,
    /// and the old primary is probed as a replica from then on.
    pub fn request_switchover(&mut self) -> SwitchoverResult<SwitchoverReport> {
        let snapshot = self.prober.probe(&self.primary);
        let report = self.orchestrator.run(&snapshot)?;
        if let Some(new_primary) = report.new_primary() {
            info!(old = %self.primary, new = %new_primary, "following new primary");
            self.prober.follow(&self.primary, new_primary);
            self.primary = new_primary.clone();
        }
        self.current = Some(snapshot);
        Ok(report)
    }

    /// Serve ticks and operator commands until `Quit` or the command
    /// channel closes.
    pub fn run(&mut self, commands: Receiver<OperatorCommand>, observer: &mut dyn MonitorObserver) {
        observer.on_snapshot(self.refresh());
        let mut ticker = tick(self.refresh_interval);

        loop {
            select! {
                recv(ticker) -> _ => observer.on_snapshot(self.refresh()),
                recv(commands) -> msg => match msg {
                    Ok(OperatorCommand::Refresh) => observer.on_snapshot(self.refresh()),
                    Ok(OperatorCommand::Switchover) => {
                        match self.request_switchover() {
                            Ok(report) => observer.on_switchover(&report),
                            Err(e) => observer.on_switchover_error(&e),
                        }
                        observer.on_snapshot(self.refresh());
                        ticker = tick(self.refresh_interval);
                    }
                    Ok(OperatorCommand::Quit) | Err(_) => break,
                },
            }
        }
        info!(primary = %self.primary, "monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crossbeam_channel::unbounded;

    use crate::gateway::memory::{MemoryGateway, SimNode};
    use crate::gateway::Credentials;
    use crate::switchover::{SwitchoverSettings, SwitchoverStatus};
    use crate::topology::DiscoveryMode;

    fn addr(host: &str) -> NodeAddress {
        NodeAddress::new(host, 3306)
    }

    fn monitor(gateway: &MemoryGateway) -> Monitor {
        let shared: Arc<MemoryGateway> = Arc::new(gateway.clone());
        let prober = TopologyProber::new(
            shared.clone(),
            Credentials::default(),
            DiscoveryMode::Static(vec![addr("a"), addr("b")]),
            3306,
        );
        let orchestrator =
            SwitchoverOrchestrator::new(shared, Credentials::default(), SwitchoverSettings::default());
        Monitor::new(prober, orchestrator, addr("p"), Duration::from_secs(3600))
    }

    fn cluster() -> MemoryGateway {
        let gateway = MemoryGateway::new();
        gateway.add_node(&addr("p"), SimNode::primary(7));
        gateway.add_node(&addr("a"), SimNode::replica_of(&addr("p"), 7));
        gateway.add_node(&addr("b"), SimNode::replica_of(&addr("p"), 7));
        gateway
    }

    #[derive(Default)]
    struct Recorder {
        snapshots: usize,
        reports: Vec<SwitchoverReport>,
    }

    impl MonitorObserver for Recorder {
        fn on_snapshot(&mut self, _snapshot: &TopologySnapshot) {
            self.snapshots += 1;
        }

        fn on_switchover(&mut self, report: &SwitchoverReport) {
            self.reports.push(report.clone());
        }
    }

    #[test]
    fn test_parse_operator_commands() {
        assert_eq!(OperatorCommand::parse("s\n"), Some(OperatorCommand::Switchover));
        assert_eq!(OperatorCommand::parse("R"), Some(OperatorCommand::Refresh));
        assert_eq!(OperatorCommand::parse("quit"), Some(OperatorCommand::Quit));
        assert_eq!(OperatorCommand::parse("x"), None);
    }

    #[test]
    fn test_refresh_replaces_snapshot() {
        let gateway = cluster();
        let mut monitor = monitor(&gateway);
        assert!(monitor.current_snapshot().is_none());
        let first = monitor.refresh().taken_at;
        assert_eq!(monitor.current_snapshot().unwrap().replicas.len(), 2);
        assert!(monitor.refresh().taken_at >= first);
    }

    #[test]
    fn test_run_dispatches_commands_in_order() {
        let gateway = cluster();
        let mut monitor = monitor(&gateway);
        let (tx, rx) = unbounded();
        tx.send(OperatorCommand::Refresh).unwrap();
        tx.send(OperatorCommand::Switchover).unwrap();
        tx.send(OperatorCommand::Quit).unwrap();

        let mut recorder = Recorder::default();
        monitor.run(rx, &mut recorder);

        // initial + refresh + after switchover
        assert_eq!(recorder.snapshots, 3);
        assert_eq!(recorder.reports.len(), 1);
        assert_eq!(recorder.reports[0].status, SwitchoverStatus::Completed);
        assert_eq!(monitor.primary(), &addr("a"));
    }

    /// With a fixed replica list, the demoted primary stays in the
    /// topology and is re-pointed by the next switchover.
    #[test]
    fn test_consecutive_switchovers_keep_old_primary() {
        let gateway = cluster();
        let mut monitor = monitor(&gateway);

        let first = monitor.request_switchover().unwrap();
        assert_eq!(first.status, SwitchoverStatus::Completed);
        assert_eq!(monitor.primary(), &addr("a"));

        let snapshot = monitor.refresh();
        assert_eq!(snapshot.replica_addresses(), vec![addr("p"), addr("b")]);
        assert!(snapshot.entry(&addr("p")).unwrap().warnings.is_empty());

        let second = monitor.request_switchover().unwrap();
        assert_eq!(second.status, SwitchoverStatus::Completed);
        assert_eq!(second.candidates.len(), 2);
        assert_eq!(monitor.primary(), &addr("p"));

        // a is demoted now and b was re-pointed at p
        let b = gateway.node(&addr("b")).unwrap();
        assert!(b.replication.unwrap().is_source(&addr("p")));
        let a = gateway.node(&addr("a")).unwrap();
        assert!(a.replication.unwrap().is_source(&addr("p")));
        assert_eq!(
            monitor.refresh().replica_addresses(),
            vec![addr("a"), addr("b")]
        );
    }

    #[test]
    fn test_run_stops_when_channel_closes() {
        let gateway = cluster();
        let mut monitor = monitor(&gateway);
        let (tx, rx) = unbounded::<OperatorCommand>();
        drop(tx);
        let mut recorder = Recorder::default();
        monitor.run(rx, &mut recorder);
        assert_eq!(recorder.snapshots, 1);
        assert_eq!(monitor.primary(), &addr("p"));
    }
}
