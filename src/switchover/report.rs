//! Switchover report
//!
//! What the operator gets back from a run: the stage reached, the
//! candidates considered and one outcome per node action taken.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::elector::Candidate;
use super::state::{AbortReason, SwitchoverStage};
use crate::topology::NodeAddress;

/// A node-level step of the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAction {
    Flush,
    Lock,
    CatchUp,
    Promote,
    Demote,
    Rewire,
    Unlock,
}

impl NodeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flush => "flush",
            Self::Lock => "lock",
            Self::CatchUp => "catch_up",
            Self::Promote => "promote",
            Self::Demote => "demote",
            Self::Rewire => "rewire",
            Self::Unlock => "unlock",
        }
    }
}

/// Result of one node action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutcome {
    pub node: NodeAddress,
    pub action: NodeAction,
    pub succeeded: bool,
    /// Error text when the action failed
    pub error: Option<String>,
    /// Whether an operator must look at this node
    pub needs_follow_up: bool,
}

impl NodeOutcome {
    pub fn ok(node: NodeAddress, action: NodeAction) -> Self {
        Self {
            node,
            action,
            succeeded: true,
            error: None,
            needs_follow_up: false,
        }
    }

    pub fn failed(node: NodeAddress, action: NodeAction, error: impl Into<String>) -> Self {
        // A failed flush is only a warning; every other failure leaves a node
        // in a state the protocol does not repair.
        let needs_follow_up = action != NodeAction::Flush;
        Self {
            node,
            action,
            succeeded: false,
            error: Some(error.into()),
            needs_follow_up,
        }
    }
}

/// Final status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SwitchoverStatus {
    /// Every step succeeded
    Completed,
    /// The candidate was promoted but some node could not be rewired
    CompletedWithFailures { failed_nodes: Vec<NodeAddress> },
    /// Stopped before any mutation
    Aborted { reason: AbortReason },
    /// A mutation stage failed; the lock was released and nothing was rolled back
    Halted { stage: String, reason: String },
}

impl SwitchoverStatus {
    /// Whether the candidate is now the primary.
    pub fn promoted(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithFailures { .. })
    }

    /// Whether the cluster may need manual repair.
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::CompletedWithFailures { .. } | Self::Halted { .. })
    }
}

impl fmt::Display for SwitchoverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithFailures { failed_nodes } => {
                let nodes: Vec<String> = failed_nodes.iter().map(|n| n.to_string()).collect();
                write!(f, "completed, follow-up needed on {}", nodes.join(", "))
            }
            Self::Aborted { reason } => write!(f, "aborted: {}", reason),
            Self::Halted { stage, reason } => write!(f, "halted in {}: {}", stage, reason),
        }
    }
}

/// Record of one switchover run
#[derive(Debug, Clone, Serialize)]
pub struct SwitchoverReport {
    pub run_id: Uuid,
    pub old_primary: NodeAddress,
    /// Last stage entered; `COMPLETE` for every run that took the lock
    pub stage_reached: SwitchoverStage,
    pub status: SwitchoverStatus,
    /// Elected candidate, when the election ran and succeeded
    pub candidate: Option<NodeAddress>,
    /// Every replica the election considered
    pub candidates: Vec<Candidate>,
    pub outcomes: Vec<NodeOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SwitchoverReport {
    /// The node now accepting writes, when the promotion went through.
    pub fn new_primary(&self) -> Option<&NodeAddress> {
        if self.status.promoted() {
            self.candidate.as_ref()
        } else {
            None
        }
    }

    /// Outcomes that need an operator.
    pub fn follow_ups(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.outcomes.iter().filter(|o| o.needs_follow_up)
    }

    /// Duration of the run in milliseconds.
    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_failure_is_not_follow_up() {
        let node = NodeAddress::new("db1", 3306);
        assert!(!NodeOutcome::failed(node.clone(), NodeAction::Flush, "x").needs_follow_up);
        assert!(NodeOutcome::failed(node, NodeAction::Rewire, "x").needs_follow_up);
    }

    #[test]
    fn test_status_flags() {
        assert!(SwitchoverStatus::Completed.promoted());
        assert!(!SwitchoverStatus::Completed.needs_attention());
        let halted = SwitchoverStatus::Halted {
            stage: "PROMOTE".to_string(),
            reason: "boom".to_string(),
        };
        assert!(!halted.promoted());
        assert!(halted.needs_attention());
        assert_eq!(halted.to_string(), "halted in PROMOTE: boom");
    }

    #[test]
    fn test_status_serializes_tagged() {
        let status = SwitchoverStatus::Aborted {
            reason: AbortReason::NoneEligible,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "aborted");
        assert_eq!(json["reason"]["reason"], "none_eligible");
    }
}
