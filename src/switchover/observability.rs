//! Switchover Observability
//!
//! Every run emits a start event, one event per stage entered and a final
//! event carrying the outcome. Events describe what happened; nothing in
//! the protocol reads them back.

use tracing::{error, info, warn};
use uuid::Uuid;

use super::report::SwitchoverStatus;
use super::state::SwitchoverStage;
use crate::topology::NodeAddress;

/// Switchover lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchoverEvent {
    /// switchover.requested
    Requested { run_id: Uuid, primary: NodeAddress },

    /// switchover.<stage>.started
    StageEntered { run_id: Uuid, stage: SwitchoverStage },

    /// switchover.candidate.elected
    CandidateElected {
        run_id: Uuid,
        candidate: NodeAddress,
        sequence: u64,
    },

    /// switchover.node.failed
    NodeActionFailed {
        run_id: Uuid,
        node: NodeAddress,
        action: &'static str,
        error: String,
    },

    /// switchover.finished
    Finished {
        run_id: Uuid,
        status: SwitchoverStatus,
    },
}

impl SwitchoverEvent {
    /// Get the event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Requested { .. } => "switchover.requested",
            Self::StageEntered { stage, .. } => match stage {
                SwitchoverStage::Precheck => "switchover.precheck.started",
                SwitchoverStage::Elect => "switchover.elect.started",
                SwitchoverStage::Quiesce => "switchover.quiesce.started",
                SwitchoverStage::Promote => "switchover.promote.started",
                SwitchoverStage::Rewire => "switchover.rewire.started",
                SwitchoverStage::Resume => "switchover.resume.started",
                SwitchoverStage::Complete => "switchover.complete",
                SwitchoverStage::Aborted(_) => "switchover.aborted",
            },
            Self::CandidateElected { .. } => "switchover.candidate.elected",
            Self::NodeActionFailed { .. } => "switchover.node.failed",
            Self::Finished { .. } => "switchover.finished",
        }
    }

    /// Emit the event through `tracing`.
    pub fn emit(&self) {
        let event = self.event_name();
        match self {
            Self::Requested { run_id, primary } => {
                info!(event, %run_id, primary = %primary, "switchover requested")
            }
            Self::StageEntered { run_id, stage } => match stage {
                SwitchoverStage::Aborted(reason) => {
                    warn!(event, %run_id, reason = %reason, "switchover aborted")
                }
                _ => info!(event, %run_id, stage = stage.stage_name(), "stage entered"),
            },
            Self::CandidateElected {
                run_id,
                candidate,
                sequence,
            } => info!(event, %run_id, candidate = %candidate, sequence, "candidate elected"),
            Self::NodeActionFailed {
                run_id,
                node,
                action,
                error,
            } => error!(event, %run_id, node = %node, action, error = %error, "node action failed"),
            Self::Finished { run_id, status } => {
                if status.needs_attention() {
                    error!(event, %run_id, status = %status, "switchover finished, operator follow-up required")
                } else {
                    info!(event, %run_id, status = %status, "switchover finished")
                }
            }
        }
    }
}
