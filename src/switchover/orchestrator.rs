//! Switchover Orchestrator
//!
//! Drives one run through the stage machine against live nodes.
//!
//! The primary's read lock is the one shared resource of the protocol. It
//! is owned by a `ReadLock` guard from QUIESCE on: RESUME releases it
//! explicitly, and dropping the guard on any early return releases it if
//! RESUME never ran. The release statement is issued at most once.
//!
//! The protocol is forward-only. Failures after QUIESCE are recorded per
//! node and reported; nothing is rolled back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, warn};
use uuid::Uuid;

use super::elector::{Candidate, CandidateElector, TieBreak};
use super::errors::{SwitchoverError, SwitchoverResult};
use super::observability::SwitchoverEvent;
use super::plan::{ReplicationLogin, SwitchoverPlan};
use super::report::{NodeAction, NodeOutcome, SwitchoverReport, SwitchoverStatus};
use super::state::{AbortReason, SwitchoverStage};
use crate::gateway::{AdminCommand, Credentials, GatewayResult, NodeGateway, NodeSession};
use crate::topology::{NodeAddress, TopologySnapshot};

/// Tunables of a switchover run
#[derive(Debug, Clone)]
pub struct SwitchoverSettings {
    /// Minimum age of a running write statement that blocks the run
    pub long_write_threshold: Duration,
    /// How long the candidate may take to apply the primary's last position
    pub catchup_timeout: Duration,
    pub tie_break: TieBreak,
    /// Set the old primary read-only before it is re-pointed
    pub demote_read_only: bool,
    /// Login the rewired nodes replicate with
    pub replication: ReplicationLogin,
}

impl Default for SwitchoverSettings {
    fn default() -> Self {
        Self {
            long_write_threshold: Duration::from_secs(10),
            catchup_timeout: Duration::from_secs(30),
            tie_break: TieBreak::default(),
            demote_read_only: true,
            replication: ReplicationLogin::default(),
        }
    }
}

// =============================================================================
// READ LOCK GUARD
// =============================================================================

/// The primary session holding the global read lock.
struct ReadLock {
    session: Box<dyn NodeSession>,
    released: bool,
}

impl ReadLock {
    /// Issue the lock statement and arm the guard.
    ///
    /// The guard is armed even when the statement fails: the server may
    /// still have taken the lock, and an unlock on an unlocked session is
    /// harmless.
    fn acquire(mut session: Box<dyn NodeSession>) -> (Self, GatewayResult<()>) {
        let result = session.exec_admin(&AdminCommand::AcquireReadLock);
        (
            Self {
                session,
                released: false,
            },
            result,
        )
    }

    fn session(&mut self) -> &mut dyn NodeSession {
        self.session.as_mut()
    }

    fn release(&mut self) -> GatewayResult<()> {
        self.released = true;
        self.session.exec_admin(&AdminCommand::ReleaseReadLock)
    }
}

impl Drop for ReadLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let node = self.session.address().clone();
        match self.session.exec_admin(&AdminCommand::ReleaseReadLock) {
            Ok(()) => warn!(node = %node, "read lock released on early exit"),
            Err(e) => error!(node = %node, error = %e, "read lock release failed on early exit"),
        }
    }
}

/// Clears the in-progress flag when a run ends.
struct InProgress<'a>(&'a AtomicBool);

impl<'a> InProgress<'a> {
    fn enter(flag: &'a AtomicBool) -> SwitchoverResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SwitchoverError::already_in_progress())?;
        Ok(Self(flag))
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// RUN BOOKKEEPING
// =============================================================================

struct Run {
    id: Uuid,
    old_primary: NodeAddress,
    stage: SwitchoverStage,
    candidate: Option<NodeAddress>,
    candidates: Vec<Candidate>,
    outcomes: Vec<NodeOutcome>,
    started_at: DateTime<Utc>,
}

impl Run {
    fn start(old_primary: NodeAddress) -> Self {
        let run = Self {
            id: Uuid::new_v4(),
            old_primary,
            stage: SwitchoverStage::new(),
            candidate: None,
            candidates: Vec::new(),
            outcomes: Vec::new(),
            started_at: Utc::now(),
        };
        SwitchoverEvent::Requested {
            run_id: run.id,
            primary: run.old_primary.clone(),
        }
        .emit();
        run.emit_stage();
        run
    }

    fn emit_stage(&self) {
        SwitchoverEvent::StageEntered {
            run_id: self.id,
            stage: self.stage.clone(),
        }
        .emit();
    }

    fn advance(&mut self) -> SwitchoverResult<()> {
        let current = std::mem::take(&mut self.stage);
        self.stage = current.advance()?;
        self.emit_stage();
        Ok(())
    }

    fn skip_to_resume(&mut self) -> SwitchoverResult<()> {
        let current = std::mem::take(&mut self.stage);
        self.stage = current.skip_to_resume()?;
        self.emit_stage();
        Ok(())
    }

    fn abort(mut self, reason: AbortReason) -> SwitchoverResult<SwitchoverReport> {
        let current = std::mem::take(&mut self.stage);
        self.stage = current.abort(reason.clone())?;
        self.emit_stage();
        Ok(self.finish(SwitchoverStatus::Aborted { reason }))
    }

    fn succeeded(&mut self, node: &NodeAddress, action: NodeAction) {
        self.outcomes.push(NodeOutcome::ok(node.clone(), action));
    }

    fn failed(&mut self, node: &NodeAddress, action: NodeAction, error: impl ToString) {
        let error = error.to_string();
        SwitchoverEvent::NodeActionFailed {
            run_id: self.id,
            node: node.clone(),
            action: action.as_str(),
            error: error.clone(),
        }
        .emit();
        self.outcomes
            .push(NodeOutcome::failed(node.clone(), action, error));
    }

    fn finish(self, status: SwitchoverStatus) -> SwitchoverReport {
        SwitchoverEvent::Finished {
            run_id: self.id,
            status: status.clone(),
        }
        .emit();
        SwitchoverReport {
            run_id: self.id,
            old_primary: self.old_primary,
            stage_reached: self.stage,
            status,
            candidate: self.candidate,
            candidates: self.candidates,
            outcomes: self.outcomes,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// Runs planned switchovers, one at a time.
pub struct SwitchoverOrchestrator {
    gateway: Arc<dyn NodeGateway>,
    credentials: Credentials,
    settings: SwitchoverSettings,
    running: AtomicBool,
}

impl SwitchoverOrchestrator {
    /// Create an orchestrator.
    pub fn new(
        gateway: Arc<dyn NodeGateway>,
        credentials: Credentials,
        settings: SwitchoverSettings,
    ) -> Self {
        Self {
            gateway,
            credentials,
            settings,
            running: AtomicBool::new(false),
        }
    }

    /// Run settings.
    pub fn settings(&self) -> &SwitchoverSettings {
        &self.settings
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Hand the primary role of `topology`'s primary to the best replica.
    ///
    /// Operational failures end up in the report. An error is returned only
    /// when a run is already in progress or the stage machine was misused.
    pub fn run(&self, topology: &TopologySnapshot) -> SwitchoverResult<SwitchoverReport> {
        let _in_progress = InProgress::enter(&self.running)?;
        let mut run = Run::start(topology.primary_address().clone());
        let primary_addr = run.old_primary.clone();

        // PRECHECK
        let mut primary = match self.gateway.connect(&self.credentials, &primary_addr) {
            Ok(session) => session,
            Err(e) => {
                return run.abort(AbortReason::PrimaryUnreachable {
                    message: e.to_string(),
                })
            }
        };
        if topology.is_empty() {
            return run.abort(AbortReason::NoTopology);
        }
        match primary.exec_admin(&AdminCommand::FlushTablesNoLog) {
            Ok(()) => run.succeeded(&primary_addr, NodeAction::Flush),
            Err(e) => {
                warn!(node = %primary_addr, error = %e, "table flush failed, continuing");
                run.failed(&primary_addr, NodeAction::Flush, e);
            }
        }
        let threshold = self.settings.long_write_threshold;
        match primary.count_long_running_writes(threshold) {
            Ok(0) => {}
            Ok(count) => {
                return run.abort(AbortReason::LongRunningWrites {
                    count,
                    threshold_secs: threshold.as_secs(),
                })
            }
            Err(e) => {
                return run.abort(AbortReason::PrecheckFailed {
                    message: e.to_string(),
                })
            }
        }

        // ELECT
        run.advance()?;
        let elector = CandidateElector::new(
            Arc::clone(&self.gateway),
            self.credentials.clone(),
            self.settings.tie_break,
        );
        let election = match elector.elect(topology, primary.as_mut()) {
            Ok(election) => election,
            Err(e) => {
                return run.abort(AbortReason::PrimaryPositionUnknown {
                    message: e.to_string(),
                })
            }
        };
        let elected = election.elected().cloned();
        run.candidates = election.candidates;
        let Some(elected) = elected else {
            return run.abort(AbortReason::NoneEligible);
        };
        SwitchoverEvent::CandidateElected {
            run_id: run.id,
            candidate: elected.address.clone(),
            sequence: elected.sequence().unwrap_or_default(),
        }
        .emit();
        run.candidate = Some(elected.address.clone());
        let plan = SwitchoverPlan::freeze(topology, elected.address);

        // QUIESCE
        run.advance()?;
        let (mut lock, locked) = ReadLock::acquire(primary);
        let mut status = match locked {
            Err(e) => {
                run.failed(&primary_addr, NodeAction::Lock, &e);
                run.skip_to_resume()?;
                SwitchoverStatus::Halted {
                    stage: SwitchoverStage::Quiesce.stage_name().to_string(),
                    reason: e.to_string(),
                }
            }
            Ok(()) => {
                run.succeeded(&primary_addr, NodeAction::Lock);

                // PROMOTE
                run.advance()?;
                match self.promote(&mut run, &plan, &mut lock) {
                    Err(reason) => {
                        run.skip_to_resume()?;
                        SwitchoverStatus::Halted {
                            stage: SwitchoverStage::Promote.stage_name().to_string(),
                            reason,
                        }
                    }
                    Ok(()) => {
                        // REWIRE
                        run.advance()?;
                        let failed_nodes = self.rewire(&mut run, &plan, &mut lock);
                        run.advance()?;
                        if failed_nodes.is_empty() {
                            SwitchoverStatus::Completed
                        } else {
                            SwitchoverStatus::CompletedWithFailures { failed_nodes }
                        }
                    }
                }
            }
        };

        // RESUME
        match lock.release() {
            Ok(()) => run.succeeded(&primary_addr, NodeAction::Unlock),
            Err(e) => {
                run.failed(&primary_addr, NodeAction::Unlock, e);
                if let SwitchoverStatus::Completed = status {
                    status = SwitchoverStatus::CompletedWithFailures {
                        failed_nodes: vec![primary_addr.clone()],
                    };
                } else if let SwitchoverStatus::CompletedWithFailures { failed_nodes } = &mut status {
                    if !failed_nodes.contains(&primary_addr) {
                        failed_nodes.push(primary_addr.clone());
                    }
                }
            }
        }
        run.advance()?;
        Ok(run.finish(status))
    }

    /// Make the candidate a writable primary. Returns the failure reason.
    fn promote(
        &self,
        run: &mut Run,
        plan: &SwitchoverPlan,
        lock: &mut ReadLock,
    ) -> Result<(), String> {
        let candidate = &plan.candidate;

        // Writes are blocked, so this is the final position of the old primary.
        let target = match lock.session().read_variable("GTID_BINLOG_POS") {
            Ok(pos) => pos,
            Err(e) => {
                run.failed(&plan.old_primary, NodeAction::CatchUp, &e);
                return Err(e.to_string());
            }
        };

        let mut session = match self.gateway.connect(&self.credentials, candidate) {
            Ok(session) => session,
            Err(e) => {
                run.failed(candidate, NodeAction::Promote, &e);
                return Err(e.to_string());
            }
        };

        let timeout = self.settings.catchup_timeout;
        match session.wait_for_gtid(&target, timeout) {
            Ok(true) => run.succeeded(candidate, NodeAction::CatchUp),
            Ok(false) => {
                let reason = format!(
                    "did not reach {} within {} sec",
                    target,
                    timeout.as_secs()
                );
                run.failed(candidate, NodeAction::CatchUp, &reason);
                return Err(reason);
            }
            Err(e) => {
                run.failed(candidate, NodeAction::CatchUp, &e);
                return Err(e.to_string());
            }
        }

        let steps = [
            AdminCommand::StopReplica,
            AdminCommand::ResetReplicaAll,
            AdminCommand::SetReadOnly(false),
        ];
        if let Err(e) = exec_steps(session.as_mut(), &steps) {
            run.failed(candidate, NodeAction::Promote, &e);
            return Err(e.to_string());
        }
        run.succeeded(candidate, NodeAction::Promote);
        Ok(())
    }

    /// Point the old primary and every other replica at the candidate.
    /// Returns the nodes left mis-wired.
    fn rewire(
        &self,
        run: &mut Run,
        plan: &SwitchoverPlan,
        lock: &mut ReadLock,
    ) -> Vec<NodeAddress> {
        let change = plan.change_source(&self.settings.replication);
        let mut failed_nodes = Vec::new();

        // Old primary, through the session holding the lock.
        let old = &plan.old_primary;
        let mut demoted = true;
        if self.settings.demote_read_only {
            match lock.session().exec_admin(&AdminCommand::SetReadOnly(true)) {
                Ok(()) => run.succeeded(old, NodeAction::Demote),
                Err(e) => {
                    run.failed(old, NodeAction::Demote, e);
                    demoted = false;
                }
            }
        }
        match exec_steps(lock.session(), &[change.clone(), AdminCommand::StartReplica]) {
            Ok(()) => run.succeeded(old, NodeAction::Rewire),
            Err(e) => {
                run.failed(old, NodeAction::Rewire, e);
                demoted = false;
            }
        }
        if !demoted {
            failed_nodes.push(old.clone());
        }

        for node in plan.others() {
            let result = self
                .gateway
                .connect(&self.credentials, node)
                .and_then(|mut session| {
                    exec_steps(
                        session.as_mut(),
                        &[
                            AdminCommand::StopReplica,
                            change.clone(),
                            AdminCommand::StartReplica,
                        ],
                    )
                });
            match result {
                Ok(()) => run.succeeded(node, NodeAction::Rewire),
                Err(e) => {
                    run.failed(node, NodeAction::Rewire, e);
                    failed_nodes.push(node.clone());
                }
            }
        }
        failed_nodes
    }
}

fn exec_steps(session: &mut dyn NodeSession, steps: &[AdminCommand]) -> GatewayResult<()> {
    for step in steps {
        session.exec_admin(step)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::{MemoryGateway, SimNode};
    use crate::switchover::errors::SwitchoverErrorKind;
    use crate::topology::{DiscoveryMode, TopologyProber};

    fn addr(host: &str) -> NodeAddress {
        NodeAddress::new(host, 3306)
    }

    fn cluster() -> MemoryGateway {
        let gateway = MemoryGateway::new();
        let primary = addr("p");
        gateway.add_node(&primary, SimNode::primary(100));
        gateway.add_node(&addr("a"), SimNode::replica_of(&primary, 100));
        gateway.add_node(&addr("b"), SimNode::replica_of(&primary, 100));
        gateway
    }

    fn snapshot(gateway: &MemoryGateway) -> TopologySnapshot {
        TopologyProber::new(
            Arc::new(gateway.clone()),
            Credentials::default(),
            DiscoveryMode::Static(vec![addr("a"), addr("b")]),
            3306,
        )
        .probe(&addr("p"))
    }

    fn orchestrator(gateway: &MemoryGateway) -> SwitchoverOrchestrator {
        SwitchoverOrchestrator::new(
            Arc::new(gateway.clone()),
            Credentials::default(),
            SwitchoverSettings::default(),
        )
    }

    #[test]
    fn test_read_lock_released_on_drop() {
        let gateway = cluster();
        let session = gateway.connect(&Credentials::default(), &addr("p")).unwrap();
        {
            let (_lock, result) = ReadLock::acquire(session);
            assert!(result.is_ok());
            assert!(gateway.node(&addr("p")).unwrap().read_lock_held);
        }
        assert!(!gateway.node(&addr("p")).unwrap().read_lock_held);
        assert_eq!(gateway.count(&addr("p"), &AdminCommand::ReleaseReadLock), 1);
    }

    #[test]
    fn test_read_lock_explicit_release_not_repeated() {
        let gateway = cluster();
        let session = gateway.connect(&Credentials::default(), &addr("p")).unwrap();
        let (mut lock, _) = ReadLock::acquire(session);
        lock.release().unwrap();
        drop(lock);
        assert_eq!(gateway.count(&addr("p"), &AdminCommand::ReleaseReadLock), 1);
    }

    #[test]
    fn test_completed_run() {
        let gateway = cluster();
        let report = orchestrator(&gateway).run(&snapshot(&gateway)).unwrap();

        assert_eq!(report.status, SwitchoverStatus::Completed);
        assert_eq!(report.stage_reached, SwitchoverStage::Complete);
        assert_eq!(report.new_primary(), Some(&addr("a")));
        assert_eq!(report.candidates.len(), 2);
        assert_eq!(report.follow_ups().count(), 0);

        let a = gateway.node(&addr("a")).unwrap();
        assert!(a.is_writable());
        assert!(a.replication.is_none());
        let p = gateway.node(&addr("p")).unwrap();
        assert!(!p.is_writable());
        assert!(!p.read_lock_held);
        assert!(p.replication.unwrap().is_source(&addr("a")));
        let b = gateway.node(&addr("b")).unwrap();
        assert!(b.replication.unwrap().is_source(&addr("a")));
    }

    #[test]
    fn test_no_demotion_when_disabled() {
        let gateway = cluster();
        let mut settings = SwitchoverSettings::default();
        settings.demote_read_only = false;
        let orchestrator =
            SwitchoverOrchestrator::new(Arc::new(gateway.clone()), Credentials::default(), settings);
        let report = orchestrator.run(&snapshot(&gateway)).unwrap();

        assert_eq!(report.status, SwitchoverStatus::Completed);
        assert_eq!(
            gateway.count(&addr("p"), &AdminCommand::SetReadOnly(true)),
            0
        );
    }

    #[test]
    fn test_unreachable_primary_aborts() {
        let gateway = cluster();
        let topology = snapshot(&gateway);
        gateway.set_reachable(&addr("p"), false);
        let report = orchestrator(&gateway).run(&topology).unwrap();
        assert!(matches!(
            report.status,
            SwitchoverStatus::Aborted {
                reason: AbortReason::PrimaryUnreachable { .. }
            }
        ));
        assert_eq!(gateway.mutation_count(), 0);
    }

    #[test]
    fn test_long_write_check_failure_aborts() {
        let gateway = cluster();
        gateway.update_node(&addr("p"), |n| *n = n.clone().failing_long_write_count());
        let report = orchestrator(&gateway).run(&snapshot(&gateway)).unwrap();
        assert!(matches!(
            report.status,
            SwitchoverStatus::Aborted {
                reason: AbortReason::PrecheckFailed { .. }
            }
        ));
        assert_eq!(gateway.mutation_count(), 0);
    }

    #[test]
    fn test_flush_failure_is_a_warning() {
        let gateway = cluster();
        gateway.update_node(&addr("p"), |n| {
            *n = n.clone().failing("FLUSH NO_WRITE_TO_BINLOG TABLES")
        });
        let report = orchestrator(&gateway).run(&snapshot(&gateway)).unwrap();
        assert_eq!(report.status, SwitchoverStatus::Completed);
        assert!(report
            .outcomes
            .iter()
            .any(|o| o.action == NodeAction::Flush && !o.succeeded));
    }

    #[test]
    fn test_lock_failure_halts_before_promotion() {
        let gateway = cluster();
        gateway.update_node(&addr("p"), |n| {
            *n = n.clone().failing("FLUSH TABLES WITH READ LOCK")
        });
        let report = orchestrator(&gateway).run(&snapshot(&gateway)).unwrap();

        assert!(matches!(report.status, SwitchoverStatus::Halted { ref stage, .. } if stage == "QUIESCE"));
        assert_eq!(gateway.count(&addr("p"), &AdminCommand::ReleaseReadLock), 1);
        assert!(gateway.commands_for(&addr("a")).is_empty());
    }

    #[test]
    fn test_catch_up_timeout_halts() {
        let gateway = cluster();
        gateway.update_node(&addr("a"), |n| *n = n.clone().lagging());
        let report = orchestrator(&gateway).run(&snapshot(&gateway)).unwrap();

        assert!(matches!(report.status, SwitchoverStatus::Halted { ref stage, .. } if stage == "PROMOTE"));
        assert!(gateway.commands_for(&addr("a")).is_empty());
        assert!(gateway.node(&addr("p")).unwrap().is_writable());
        assert_eq!(gateway.count(&addr("p"), &AdminCommand::ReleaseReadLock), 1);
    }

    #[test]
    fn test_already_in_progress() {
        let gateway = cluster();
        let orchestrator = orchestrator(&gateway);
        orchestrator.running.store(true, Ordering::Release);
        let err = orchestrator.run(&snapshot(&gateway)).unwrap_err();
        assert_eq!(err.kind, SwitchoverErrorKind::AlreadyInProgress);
        assert_eq!(gateway.mutation_count(), 0);
    }

    #[test]
    fn test_flag_cleared_after_run() {
        let gateway = cluster();
        let orchestrator = orchestrator(&gateway);
        orchestrator.run(&snapshot(&gateway)).unwrap();
        assert!(!orchestrator.is_running());
    }
}
