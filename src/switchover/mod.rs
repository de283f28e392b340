//! Planned Switchover
//!
//! Hands the primary role to the most advanced in-sync replica:
//!
//! PRECHECK -> ELECT -> QUIESCE -> PROMOTE -> REWIRE -> RESUME -> COMPLETE
//!
//! A run aborts without touching any node while it is in PRECHECK or
//! ELECT. From QUIESCE on it runs to completion, releasing the primary's
//! read lock on every path, and reports per-node outcomes instead of
//! rolling anything back.

mod elector;
mod errors;
mod observability;
mod orchestrator;
mod plan;
mod report;
mod state;

pub use elector::{
    select, Candidate, CandidateElector, Election, Eligibility, IneligibleReason, TieBreak,
};
pub use errors::{SwitchoverError, SwitchoverErrorKind, SwitchoverResult};
pub use observability::SwitchoverEvent;
pub use orchestrator::{SwitchoverOrchestrator, SwitchoverSettings};
pub use plan::{ReplicationLogin, SwitchoverPlan};
pub use report::{NodeAction, NodeOutcome, SwitchoverReport, SwitchoverStatus};
pub use state::{AbortReason, SwitchoverStage};
