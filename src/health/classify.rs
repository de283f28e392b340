//! Replication health classification
//!
//! `classify` is deterministic and side-effect free: the same
//! `ReplicationState` always yields the same `HealthClass`.

use std::fmt;

use serde::Serialize;

use crate::topology::ReplicationState;

/// Health of a replica's replication link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "class", content = "delay", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthClass {
    /// Both threads running, no delay
    Ok,
    /// Both threads running, behind by the given number of seconds
    Late(u64),
    /// Log receiver stopped
    IoStopped,
    /// Log applier stopped
    SqlStopped,
    /// Neither thread running
    AllStopped,
}

impl HealthClass {
    /// Whether replication is flowing (possibly delayed).
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Ok | Self::Late(_))
    }

    /// Operator-facing label.
    pub fn label(&self) -> String {
        match self {
            Self::Ok => "Running OK".to_string(),
            Self::Late(delay) => format!("Running LATE: {} sec", delay),
            Self::IoStopped => "NOT OK, IO Stopped".to_string(),
            Self::SqlStopped => "NOT OK, SQL Stopped".to_string(),
            Self::AllStopped => "NOT OK, ALL Stopped".to_string(),
        }
    }
}

impl fmt::Display for HealthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Classify a replica's replication state.
///
/// A null delay means at least one thread is stopped. The thread flags then
/// decide which one; if the node reports a null delay with both threads
/// running, nothing can be said about progress and it counts as stopped.
pub fn classify(state: &ReplicationState) -> HealthClass {
    match state.seconds_behind {
        None => match (state.sql_running, state.io_running) {
            (true, false) => HealthClass::IoStopped,
            (false, true) => HealthClass::SqlStopped,
            _ => HealthClass::AllStopped,
        },
        Some(delay) if delay > 0 => HealthClass::Late(delay),
        Some(_) => HealthClass::Ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::NodeAddress;

    fn state(io: bool, sql: bool, delay: Option<u64>) -> ReplicationState {
        ReplicationState::replicating_from(&NodeAddress::new("primary", 3306))
            .with_threads(io, sql)
            .with_delay(delay)
    }

    #[test]
    fn test_zero_delay_is_ok() {
        assert_eq!(classify(&state(true, true, Some(0))), HealthClass::Ok);
    }

    #[test]
    fn test_positive_delay_is_late() {
        for k in [1, 2, 3600, u64::MAX] {
            assert_eq!(classify(&state(true, true, Some(k))), HealthClass::Late(k));
        }
    }

    #[test]
    fn test_null_delay_sql_running_io_stopped() {
        let class = classify(&state(false, true, None));
        assert_eq!(class, HealthClass::IoStopped);
        assert_eq!(class.label(), "NOT OK, IO Stopped");
    }

    #[test]
    fn test_null_delay_io_running_sql_stopped() {
        let class = classify(&state(true, false, None));
        assert_eq!(class, HealthClass::SqlStopped);
        assert_eq!(class.label(), "NOT OK, SQL Stopped");
    }

    #[test]
    fn test_null_delay_both_stopped() {
        let class = classify(&state(false, false, None));
        assert_eq!(class, HealthClass::AllStopped);
        assert_eq!(class.label(), "NOT OK, ALL Stopped");
    }

    #[test]
    fn test_null_delay_both_running_counts_as_stopped() {
        assert_eq!(classify(&state(true, true, None)), HealthClass::AllStopped);
    }

    #[test]
    fn test_late_label() {
        assert_eq!(HealthClass::Late(2).label(), "Running LATE: 2 sec");
        assert_eq!(HealthClass::Ok.to_string(), "Running OK");
    }

    #[test]
    fn test_delay_wins_over_thread_flags() {
        // A reported delay is taken at face value.
        assert_eq!(classify(&state(false, false, Some(0))), HealthClass::Ok);
    }
}
