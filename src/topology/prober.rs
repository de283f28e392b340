//! Topology Prober
//!
//! Discovers the replicas attached to a primary and probes every node
//! sequentially. A node that cannot be reached or queried is recorded as
//! Unreachable and probing carries on with the rest of the topology.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::node::NodeAddress;
use super::snapshot::{NodeEntry, NodeFacts, NodeProbe, PrimaryStatus, TopologySnapshot};
use super::state::ReplicationState;
use crate::gateway::{Credentials, GatewayResult, NodeGateway, NodeSession};

/// How the replica set is found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Ask the primary which connections stream its binary log
    Auto,
    /// Use a fixed replica list
    Static(Vec<NodeAddress>),
}

/// Builds topology snapshots through a gateway
pub struct TopologyProber {
    gateway: Arc<dyn NodeGateway>,
    credentials: Credentials,
    discovery: DiscoveryMode,
    /// Port assumed for discovered replicas
    replica_port: u16,
}

impl TopologyProber {
    /// Create a prober.
    pub fn new(
        gateway: Arc<dyn NodeGateway>,
        credentials: Credentials,
        discovery: DiscoveryMode,
        replica_port: u16,
    ) -> Self {
        Self {
            gateway,
            credentials,
            discovery,
            replica_port,
        }
    }

    /// Current discovery mode.
    pub fn discovery(&self) -> &DiscoveryMode {
        &self.discovery
    }

    /// Adjust a fixed replica list after the primary role moved from
    /// `old` to `new`: the new primary leaves the list and the old one
    /// joins it in its place. Auto discovery needs no adjustment.
    pub fn follow(&mut self, old: &NodeAddress, new: &NodeAddress) {
        if let DiscoveryMode::Static(list) = &mut self.discovery {
            match list.iter().position(|addr| addr == new) {
                Some(slot) => list[slot] = old.clone(),
                None => list.push(old.clone()),
            }
            let mut seen = BTreeSet::new();
            list.retain(|addr| addr != new && seen.insert(addr.clone()));
        }
    }

    /// Replica addresses attached to `primary`.
    ///
    /// Never fails: any problem is logged and yields an empty list, which
    /// callers treat as "no topology known".
    pub fn discover(&self, primary: &NodeAddress) -> Vec<NodeAddress> {
        match &self.discovery {
            DiscoveryMode::Static(list) => list.clone(),
            DiscoveryMode::Auto => {
                let hosts = self
                    .gateway
                    .connect(&self.credentials, primary)
                    .and_then(|mut session| session.list_replication_consumers());
                match hosts {
                    Ok(hosts) => self.consumers_to_addresses(&hosts),
                    Err(e) => {
                        warn!(primary = %primary, error = %e, "replica discovery failed");
                        Vec::new()
                    }
                }
            }
        }
    }

    /// Processlist hosts carry the client's ephemeral port; the replica's
    /// server port is not visible there, so the configured one is used.
    fn consumers_to_addresses(&self, hosts: &[String]) -> Vec<NodeAddress> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for raw in hosts {
            let host = match NodeAddress::parse(strip_client_port(raw), self.replica_port) {
                Ok(addr) => addr.host,
                Err(e) => {
                    warn!(host = %raw, error = %e, "ignoring unparsable consumer host");
                    continue;
                }
            };
            let addr = NodeAddress::new(host, self.replica_port);
            if seen.insert(addr.clone()) {
                out.push(addr);
            }
        }
        out
    }

    /// Probe one node: replica status plus global variables.
    pub fn snapshot(&self, node: &NodeAddress) -> NodeProbe {
        let mut session = match self.gateway.connect(&self.credentials, node) {
            Ok(session) => session,
            Err(e) => {
                warn!(node = %node, error = %e, "node unreachable");
                return NodeProbe::Unreachable {
                    reason: e.to_string(),
                };
            }
        };
        match read_node(session.as_mut()) {
            Ok((facts, replication)) => NodeProbe::Reachable { facts, replication },
            Err(e) => {
                warn!(node = %node, error = %e, "node status query failed");
                NodeProbe::Unreachable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Probe the primary and every replica and assemble a snapshot.
    pub fn probe(&self, primary: &NodeAddress) -> TopologySnapshot {
        let primary_status = self.probe_primary(primary);
        let replicas = if primary_status.is_reachable()
            || matches!(self.discovery, DiscoveryMode::Static(_))
        {
            self.discover(primary)
        } else {
            Vec::new()
        };

        let entries = replicas
            .into_iter()
            .filter(|addr| addr != primary)
            .map(|addr| {
                let probe = self.snapshot(&addr);
                let warnings = replica_warnings(&probe, primary);
                for w in &warnings {
                    debug!(node = %addr, warning = %w, "replica warning");
                }
                NodeEntry::new(addr, probe, warnings)
            })
            .collect();

        TopologySnapshot::new(primary_status, entries)
    }

    fn probe_primary(&self, primary: &NodeAddress) -> PrimaryStatus {
        let mut warnings = Vec::new();
        let facts = match self.snapshot(primary) {
            NodeProbe::Reachable { facts, replication } => {
                if let Some(state) = replication {
                    warnings.push(format!(
                        "declared primary replicates from {}",
                        state.source_host
                    ));
                }
                if facts.read_only {
                    warnings.push("declared primary is read-only".to_string());
                }
                Some(facts)
            }
            NodeProbe::Unreachable { reason } => {
                warnings.push(format!("primary unreachable: {}", reason));
                None
            }
        };
        PrimaryStatus {
            address: primary.clone(),
            facts,
            warnings,
        }
    }
}

/// Drop the trailing `:port` of a processlist host. IPv6 clients show up
/// as `::1:54321`, which address parsing alone would keep whole.
fn strip_client_port(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.rsplit_once(':') {
        Some((host, port))
            if !host.is_empty() && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => raw,
    }
}

fn read_node(
    session: &mut dyn NodeSession,
) -> GatewayResult<(NodeFacts, Option<ReplicationState>)> {
    let replication = session.read_replication_state()?;
    let variables = session.read_all_variables()?;
    Ok((NodeFacts::from_variables(&variables), replication))
}

fn replica_warnings(probe: &NodeProbe, primary: &NodeAddress) -> Vec<String> {
    let mut warnings = Vec::new();
    match probe {
        NodeProbe::Unreachable { reason } => warnings.push(format!("unreachable: {}", reason)),
        NodeProbe::Reachable { facts, replication } => {
            match replication {
                None => warnings.push("not a replica".to_string()),
                Some(state) if !state.is_source(primary) => warnings.push(format!(
                    "replicates from {} instead of {}",
                    state.source_host, primary
                )),
                Some(state) => {
                    if !state.last_io_error.is_empty() {
                        warnings.push(format!("IO error: {}", state.last_io_error));
                    }
                    if !state.last_sql_error.is_empty() {
                        warnings.push(format!("SQL error: {}", state.last_sql_error));
                    }
                }
            }
            if !facts.log_bin {
                warnings.push("binary log disabled".to_string());
            }
        }
    }
    warnings
}
