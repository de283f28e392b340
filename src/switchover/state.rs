//! Switchover Stage Machine
//!
//! Stages are linear and never move backwards:
//!
//! PRECHECK -> ELECT -> QUIESCE -> PROMOTE -> REWIRE -> RESUME -> COMPLETE
//!
//! ABORTED is reachable from PRECHECK and ELECT only, before anything has
//! been mutated. Once QUIESCE is entered every path goes through RESUME,
//! which is where the primary's read lock is released. A failure in
//! QUIESCE, PROMOTE or REWIRE may skip ahead to RESUME but never back.

use std::fmt;

use serde::Serialize;

use super::errors::{SwitchoverError, SwitchoverResult};

/// Why a switchover was aborted before any mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    /// The declared primary could not be reached
    PrimaryUnreachable { message: String },

    /// No replica is known for the primary
    NoTopology,

    /// Write statements older than the threshold are running
    LongRunningWrites { count: u64, threshold_secs: u64 },

    /// The long-running write check itself failed
    PrecheckFailed { message: String },

    /// The primary's binlog position could not be read
    PrimaryPositionUnknown { message: String },

    /// No replica passed every eligibility gate
    NoneEligible,
}

impl AbortReason {
    /// Human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::PrimaryUnreachable { message } => {
                format!("primary unreachable: {}", message)
            }
            Self::NoTopology => "no replicas known for the primary".to_string(),
            Self::LongRunningWrites {
                count,
                threshold_secs,
            } => format!(
                "{} write statement(s) running for at least {} sec on the primary",
                count, threshold_secs
            ),
            Self::PrecheckFailed { message } => {
                format!("cannot check for long-running writes: {}", message)
            }
            Self::PrimaryPositionUnknown { message } => {
                format!("cannot read the primary binlog position: {}", message)
            }
            Self::NoneEligible => "no eligible candidate".to_string(),
        }
    }

    /// Whether retrying later can succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LongRunningWrites { .. } | Self::NoneEligible | Self::PrecheckFailed { .. }
        )
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Stage of a switchover run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwitchoverStage {
    /// Flush, long-running write check
    Precheck,
    /// Candidate election
    Elect,
    /// Primary read lock
    Quiesce,
    /// Candidate made a writable primary
    Promote,
    /// Old primary and other replicas re-pointed
    Rewire,
    /// Primary read lock released
    Resume,
    /// Terminal: the run went through RESUME
    Complete,
    /// Terminal: safe abort, nothing mutated
    Aborted(AbortReason),
}

impl Default for SwitchoverStage {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchoverStage {
    /// A fresh run starts at PRECHECK.
    pub fn new() -> Self {
        Self::Precheck
    }

    /// Stage name for observability.
    pub fn stage_name(&self) -> &'static str {
        match self {
            Self::Precheck => "PRECHECK",
            Self::Elect => "ELECT",
            Self::Quiesce => "QUIESCE",
            Self::Promote => "PROMOTE",
            Self::Rewire => "REWIRE",
            Self::Resume => "RESUME",
            Self::Complete => "COMPLETE",
            Self::Aborted(_) => "ABORTED",
        }
    }

    /// Whether the run has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Aborted(_))
    }

    /// Whether the primary may be holding the read lock at this stage.
    pub fn holds_lock(&self) -> bool {
        matches!(self, Self::Quiesce | Self::Promote | Self::Rewire | Self::Resume)
    }

    /// Whether a node may have been mutated.
    pub fn has_mutated(&self) -> bool {
        !matches!(self, Self::Precheck | Self::Elect | Self::Aborted(_))
    }

    // =========================================================================
    // ALLOWED TRANSITIONS
    // =========================================================================

    /// Move to the next stage in the linear order.
    pub fn advance(self) -> SwitchoverResult<Self> {
        let next = match &self {
            Self::Precheck => Self::Elect,
            Self::Elect => Self::Quiesce,
            Self::Quiesce => Self::Promote,
            Self::Promote => Self::Rewire,
            Self::Rewire => Self::Resume,
            Self::Resume => Self::Complete,
            Self::Complete | Self::Aborted(_) => {
                return Err(SwitchoverError::forbidden_transition(
                    self.stage_name(),
                    "next",
                ))
            }
        };
        Ok(next)
    }

    /// PRECHECK | ELECT -> ABORTED
    pub fn abort(self, reason: AbortReason) -> SwitchoverResult<Self> {
        match self {
            Self::Precheck | Self::Elect => Ok(Self::Aborted(reason)),
            other => Err(SwitchoverError::forbidden_transition(
                other.stage_name(),
                "ABORTED",
            )),
        }
    }

    /// QUIESCE | PROMOTE | REWIRE -> RESUME
    ///
    /// Used when a mutation stage fails: the remaining mutation stages are
    /// skipped but the lock release still happens.
    pub fn skip_to_resume(self) -> SwitchoverResult<Self> {
        match self {
            Self::Quiesce | Self::Promote | Self::Rewire => Ok(Self::Resume),
            other => Err(SwitchoverError::forbidden_transition(
                other.stage_name(),
                "RESUME",
            )),
        }
    }
}

impl fmt::Display for SwitchoverStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stage_name())
    }
}
