//! Topology snapshot
//!
//! A snapshot is an immutable value built wholesale by one probe cycle.
//! Nothing patches it afterwards; the next cycle builds a new one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::node::{NodeAddress, NodeRole};
use super::state::ReplicationState;
use crate::health::{classify, HealthClass};

/// Facts read from a node's global variables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeFacts {
    /// Binary logging enabled
    pub log_bin: bool,
    /// `gtid_current_pos`
    pub gtid_current_pos: Option<String>,
    /// `gtid_binlog_pos`
    pub gtid_binlog_pos: Option<String>,
    /// `gtid_strict_mode`
    pub gtid_strict_mode: Option<String>,
    /// Global read_only flag
    pub read_only: bool,
}

impl NodeFacts {
    /// Extract the facts from an upper-cased variable map.
    pub fn from_variables(vars: &BTreeMap<String, String>) -> Self {
        let flag = |name: &str| vars.get(name).is_some_and(|v| is_on(v));
        let text = |name: &str| vars.get(name).filter(|v| !v.is_empty()).cloned();
        Self {
            log_bin: flag("LOG_BIN"),
            gtid_current_pos: text("GTID_CURRENT_POS"),
            gtid_binlog_pos: text("GTID_BINLOG_POS"),
            gtid_strict_mode: text("GTID_STRICT_MODE"),
            read_only: flag("READ_ONLY"),
        }
    }
}

fn is_on(value: &str) -> bool {
    matches!(value.trim().to_ascii_uppercase().as_str(), "ON" | "1" | "YES" | "TRUE")
}

/// Outcome of probing one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeProbe {
    /// Node answered both status queries
    Reachable {
        facts: NodeFacts,
        /// `None` when the node has no replication configured
        replication: Option<ReplicationState>,
    },
    /// Connection or query failure
    Unreachable { reason: String },
}

/// One replica line of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeEntry {
    pub address: NodeAddress,
    pub probe: NodeProbe,
    /// Derived from the replication state, absent when there is none
    pub health: Option<HealthClass>,
    /// Non-fatal conditions found while probing
    pub warnings: Vec<String>,
}

impl NodeEntry {
    /// Build an entry, deriving health from the probe.
    pub fn new(address: NodeAddress, probe: NodeProbe, warnings: Vec<String>) -> Self {
        let health = match &probe {
            NodeProbe::Reachable {
                replication: Some(state),
                ..
            } => Some(classify(state)),
            _ => None,
        };
        Self {
            address,
            probe,
            health,
            warnings,
        }
    }

    /// Role derived from the probe.
    pub fn role(&self) -> NodeRole {
        match &self.probe {
            NodeProbe::Unreachable { .. } => NodeRole::Unreachable,
            NodeProbe::Reachable {
                replication: Some(_),
                ..
            } => NodeRole::Replica,
            NodeProbe::Reachable {
                replication: None, ..
            } => NodeRole::Detached,
        }
    }

    /// Replication state, when reachable and replicating.
    pub fn replication(&self) -> Option<&ReplicationState> {
        match &self.probe {
            NodeProbe::Reachable { replication, .. } => replication.as_ref(),
            NodeProbe::Unreachable { .. } => None,
        }
    }

    /// Variable facts, when reachable.
    pub fn facts(&self) -> Option<&NodeFacts> {
        match &self.probe {
            NodeProbe::Reachable { facts, .. } => Some(facts),
            NodeProbe::Unreachable { .. } => None,
        }
    }
}

/// What the probe saw on the declared primary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryStatus {
    pub address: NodeAddress,
    /// `None` when the primary could not be reached
    pub facts: Option<NodeFacts>,
    pub warnings: Vec<String>,
}

impl PrimaryStatus {
    /// Whether the primary answered.
    pub fn is_reachable(&self) -> bool {
        self.facts.is_some()
    }
}

/// Immutable view of the topology at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologySnapshot {
    pub primary: PrimaryStatus,
    /// Replicas in discovery order
    pub replicas: Vec<NodeEntry>,
    pub taken_at: DateTime<Utc>,
}

impl TopologySnapshot {
    /// Assemble a snapshot.
    pub fn new(primary: PrimaryStatus, replicas: Vec<NodeEntry>) -> Self {
        Self {
            primary,
            replicas,
            taken_at: Utc::now(),
        }
    }

    /// Declared primary address.
    pub fn primary_address(&self) -> &NodeAddress {
        &self.primary.address
    }

    /// Replica addresses in snapshot order.
    pub fn replica_addresses(&self) -> Vec<NodeAddress> {
        self.replicas.iter().map(|e| e.address.clone()).collect()
    }

    /// Whether no replica is known. Blocks any switchover.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Look up a replica entry.
    pub fn entry(&self, address: &NodeAddress) -> Option<&NodeEntry> {
        self.replicas.iter().find(|e| &e.address == address)
    }
}
