//! Single-node health verdict for load balancers
//!
//! A pure consumer of the gateway and the replication facts: every call
//! opens a fresh session, reads the replica status once and compares the
//! delay with a threshold. Nothing is cached between calls.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::gateway::{Credentials, NodeGateway};
use crate::topology::{NodeAddress, ReplicationState};

/// Why a node is reported down
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DownReason {
    /// Could not open a session
    NoConnection,
    /// Node reports no replication configuration, or the status query failed
    NoReplication,
    /// Delay is null: a replica thread is stopped
    BrokenReplication,
    /// Delay above the threshold
    Delayed(u64),
}

/// Binary up/down verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HealthVerdict {
    Up,
    Down(DownReason),
}

impl HealthVerdict {
    /// Whether the node should stay in rotation.
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }

    /// HTTP status for the verdict.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Up => 200,
            Self::Down(_) => 503,
        }
    }

    /// Response body for the verdict.
    pub fn message(&self) -> String {
        match self {
            Self::Up => "200 Health OK".to_string(),
            Self::Down(DownReason::NoConnection) => "503 No connection".to_string(),
            Self::Down(DownReason::NoReplication) => "503 No Replication".to_string(),
            Self::Down(DownReason::BrokenReplication) => "503 Broken Replication".to_string(),
            Self::Down(DownReason::Delayed(delay)) => {
                format!("503 Delayed Replication ({})", delay)
            }
        }
    }
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Judge a replica's status against `max_delay` seconds.
pub fn evaluate(state: Option<&ReplicationState>, max_delay: u64) -> HealthVerdict {
    let Some(state) = state else {
        return HealthVerdict::Down(DownReason::NoReplication);
    };
    match state.seconds_behind {
        None => HealthVerdict::Down(DownReason::BrokenReplication),
        Some(delay) if delay > max_delay => HealthVerdict::Down(DownReason::Delayed(delay)),
        Some(_) => HealthVerdict::Up,
    }
}

/// Connect to `address` and evaluate its replication delay.
pub fn check_node(
    gateway: &dyn NodeGateway,
    credentials: &Credentials,
    address: &NodeAddress,
    max_delay: u64,
) -> HealthVerdict {
    let mut session = match gateway.connect(credentials, address) {
        Ok(session) => session,
        Err(e) => {
            warn!(node = %address, error = %e, "health check cannot connect");
            return HealthVerdict::Down(DownReason::NoConnection);
        }
    };

    let verdict = match session.read_replication_state() {
        Ok(state) => evaluate(state.as_ref(), max_delay),
        Err(e) => {
            warn!(node = %address, error = %e, "health check cannot read replica status");
            HealthVerdict::Down(DownReason::NoReplication)
        }
    };
    debug!(node = %address, verdict = %verdict, "health check");
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::{MemoryGateway, SimNode};

    fn replica(delay: Option<u64>) -> ReplicationState {
        ReplicationState::replicating_from(&NodeAddress::new("primary", 3306)).with_delay(delay)
    }

    #[test]
    fn test_evaluate_thresholds() {
        assert_eq!(evaluate(Some(&replica(Some(0))), 5), HealthVerdict::Up);
        assert_eq!(evaluate(Some(&replica(Some(5))), 5), HealthVerdict::Up);
        assert_eq!(
            evaluate(Some(&replica(Some(6))), 5),
            HealthVerdict::Down(DownReason::Delayed(6))
        );
        assert_eq!(
            evaluate(Some(&replica(None)), 5),
            HealthVerdict::Down(DownReason::BrokenReplication)
        );
        assert_eq!(
            evaluate(None, 5),
            HealthVerdict::Down(DownReason::NoReplication)
        );
    }

    #[test]
    fn test_messages_and_codes() {
        assert_eq!(HealthVerdict::Up.status_code(), 200);
        assert_eq!(HealthVerdict::Up.message(), "200 Health OK");
        let delayed = HealthVerdict::Down(DownReason::Delayed(12));
        assert_eq!(delayed.status_code(), 503);
        assert_eq!(delayed.message(), "503 Delayed Replication (12)");
        assert_eq!(
            HealthVerdict::Down(DownReason::NoConnection).message(),
            "503 No connection"
        );
    }

    #[test]
    fn test_check_node_unreachable() {
        let gateway = MemoryGateway::new();
        let addr = NodeAddress::new("10.0.0.5", 3306);
        gateway.add_node(&addr, SimNode::replica_of(&NodeAddress::new("10.0.0.1", 3306), 10));
        gateway.set_reachable(&addr, false);

        let verdict = check_node(&gateway, &Credentials::default(), &addr, 5);
        assert_eq!(verdict, HealthVerdict::Down(DownReason::NoConnection));
    }

    #[test]
    fn test_check_node_reads_delay() {
        let gateway = MemoryGateway::new();
        let primary = NodeAddress::new("10.0.0.1", 3306);
        let addr = NodeAddress::new("10.0.0.5", 3306);
        gateway.add_node(&addr, SimNode::replica_of(&primary, 10).with_delay(Some(9)));

        let verdict = check_node(&gateway, &Credentials::default(), &addr, 5);
        assert_eq!(verdict, HealthVerdict::Down(DownReason::Delayed(9)));

        let verdict = check_node(&gateway, &Credentials::default(), &addr, 10);
        assert!(verdict.is_up());
    }

    #[test]
    fn test_check_node_not_a_replica() {
        let gateway = MemoryGateway::new();
        let addr = NodeAddress::new("10.0.0.1", 3306);
        gateway.add_node(&addr, SimNode::primary(10));

        let verdict = check_node(&gateway, &Credentials::default(), &addr, 5);
        assert_eq!(verdict, HealthVerdict::Down(DownReason::NoReplication));
    }
}
