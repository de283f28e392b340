//! Switchover plan
//!
//! The set of nodes a run acts on, frozen once the candidate is elected.
//! REWIRE walks this list, never a fresh discovery, so a replica that
//! appears or disappears mid-run does not change what gets rewired.

use serde::Serialize;

use crate::gateway::{AdminCommand, GtidMode, Secret};
use crate::topology::{NodeAddress, TopologySnapshot};

/// Replication login the rewired nodes use against the new primary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationLogin {
    pub user: String,
    pub password: Secret,
}

/// Frozen plan for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchoverPlan {
    pub old_primary: NodeAddress,
    pub candidate: NodeAddress,
    /// Replicas as seen by the snapshot the election ran on
    pub replicas: Vec<NodeAddress>,
}

impl SwitchoverPlan {
    /// Freeze the plan from the snapshot used for the election.
    pub fn freeze(topology: &TopologySnapshot, candidate: NodeAddress) -> Self {
        Self {
            old_primary: topology.primary_address().clone(),
            candidate,
            replicas: topology.replica_addresses(),
        }
    }

    /// Replicas other than the candidate, in snapshot order.
    pub fn others(&self) -> impl Iterator<Item = &NodeAddress> {
        self.replicas.iter().filter(move |a| **a != self.candidate)
    }

    /// Statement pointing a node at the candidate with GTID resume.
    pub fn change_source(&self, login: &ReplicationLogin) -> AdminCommand {
        AdminCommand::ChangeSource {
            host: self.candidate.host.clone(),
            port: self.candidate.port,
            user: login.user.clone(),
            password: login.password.clone(),
            gtid_mode: GtidMode::CurrentPos,
        }
    }
}
