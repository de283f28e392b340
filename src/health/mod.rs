//! Replication Health
//!
//! Pure classification of replica facts, the binary verdict used by load
//! balancer checks, and the HTTP responder serving that verdict.

mod check;
mod classify;
pub mod server;

pub use check::{check_node, evaluate, DownReason, HealthVerdict};
pub use classify::{classify, HealthClass};
