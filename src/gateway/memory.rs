//! In-memory simulated cluster
//!
//! A `NodeGateway` over a set of simulated nodes. Every admin command is
//! journaled (including failed ones) so callers can assert exactly which
//! statements reached which node. Failures are injected per node and per
//! command name.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{AdminCommand, Credentials, GatewayError, GatewayResult, NodeGateway, NodeSession};
use crate::topology::{NodeAddress, ReplicationState};

/// State of one simulated node
#[derive(Debug, Clone)]
pub struct SimNode {
    pub reachable: bool,
    /// Global variables, upper-case names
    pub variables: BTreeMap<String, String>,
    pub replication: Option<ReplicationState>,
    /// Hosts streaming the binlog from this node, as a processlist reports them
    pub consumers: Vec<String>,
    pub long_running_writes: u64,
    pub read_lock_held: bool,
    /// Whether `wait_for_gtid` succeeds
    pub catches_up: bool,
    failing_commands: BTreeSet<&'static str>,
    failing_long_write_count: bool,
}

impl SimNode {
    fn base(gtid_pos: &str) -> Self {
        let mut variables = BTreeMap::new();
        variables.insert("LOG_BIN".to_string(), "ON".to_string());
        variables.insert("GTID_CURRENT_POS".to_string(), gtid_pos.to_string());
        variables.insert("GTID_BINLOG_POS".to_string(), gtid_pos.to_string());
        variables.insert("GTID_STRICT_MODE".to_string(), "ON".to_string());
        Self {
            reachable: true,
            variables,
            replication: None,
            consumers: Vec::new(),
            long_running_writes: 0,
            read_lock_held: false,
            catches_up: true,
            failing_commands: BTreeSet::new(),
            failing_long_write_count: false,
        }
    }

    /// A writable primary whose binlog is at `0-1-<sequence>`.
    pub fn primary(sequence: u64) -> Self {
        let mut node = Self::base(&format!("0-1-{}", sequence));
        node.variables
            .insert("READ_ONLY".to_string(), "OFF".to_string());
        node
    }

    /// A read-only replica of `source` that has applied `0-1-<sequence>`.
    pub fn replica_of(source: &NodeAddress, sequence: u64) -> Self {
        let pos = format!("0-1-{}", sequence);
        let mut node = Self::base(&pos);
        node.variables
            .insert("READ_ONLY".to_string(), "ON".to_string());
        node.replication = Some(ReplicationState::replicating_from(source).with_gtid_io_pos(pos));
        node
    }

    /// Set the replica's reported delay.
    pub fn with_delay(mut self, delay: Option<u64>) -> Self {
        if let Some(state) = self.replication.as_mut() {
            state.seconds_behind = delay;
        }
        self
    }

    /// Set the replica's thread flags.
    pub fn with_threads(mut self, io_running: bool, sql_running: bool) -> Self {
        if let Some(state) = self.replication.as_mut() {
            state.io_running = io_running;
            state.sql_running = sql_running;
        }
        self
    }

    /// Set a global variable.
    pub fn with_variable(mut self, name: &str, value: &str) -> Self {
        self.variables
            .insert(name.to_ascii_uppercase(), value.to_string());
        self
    }

    /// Set the processlist hosts of replication consumers.
    pub fn with_consumers(mut self, hosts: &[&str]) -> Self {
        self.consumers = hosts.iter().map(|h| h.to_string()).collect();
        self
    }

    /// Set the number of long-running writes.
    pub fn with_long_running_writes(mut self, count: u64) -> Self {
        self.long_running_writes = count;
        self
    }

    /// Make every execution of the named command fail.
    pub fn failing(mut self, command: &'static str) -> Self {
        self.failing_commands.insert(command);
        self
    }

    /// Make the long-running-write query fail.
    pub fn failing_long_write_count(mut self) -> Self {
        self.failing_long_write_count = true;
        self
    }

    /// Make `wait_for_gtid` time out.
    pub fn lagging(mut self) -> Self {
        self.catches_up = false;
        self
    }

    /// Whether the node accepts writes.
    pub fn is_writable(&self) -> bool {
        self.variables.get("READ_ONLY").map(String::as_str) != Some("ON")
    }

    fn apply(&mut self, command: &AdminCommand) -> Result<(), String> {
        match command {
            AdminCommand::FlushTablesNoLog => {}
            AdminCommand::AcquireReadLock => self.read_lock_held = true,
            AdminCommand::ReleaseReadLock => self.read_lock_held = false,
            AdminCommand::StopReplica => {
                if let Some(state) = self.replication.as_mut() {
                    state.io_running = false;
                    state.sql_running = false;
                    state.seconds_behind = None;
                }
            }
            AdminCommand::StartReplica => match self.replication.as_mut() {
                Some(state) => {
                    state.io_running = true;
                    state.sql_running = true;
                    state.seconds_behind = Some(0);
                }
                None => return Err("replication is not configured".to_string()),
            },
            AdminCommand::ResetReplicaAll => {
                if self
                    .replication
                    .as_ref()
                    .is_some_and(|s| s.io_running || s.sql_running)
                {
                    return Err("replica threads are running".to_string());
                }
                self.replication = None;
            }
            AdminCommand::SetReadOnly(on) => {
                self.variables.insert(
                    "READ_ONLY".to_string(),
                    if *on { "ON" } else { "OFF" }.to_string(),
                );
            }
            AdminCommand::ChangeSource {
                host,
                port,
                gtid_mode,
                ..
            } => {
                if self
                    .replication
                    .as_ref()
                    .is_some_and(|s| s.io_running || s.sql_running)
                {
                    return Err("replica threads are running".to_string());
                }
                let source = NodeAddress::new(host.clone(), *port);
                let mut state = ReplicationState::replicating_from(&source)
                    .with_threads(false, false)
                    .with_delay(None);
                state.using_gtid = format!("{:?}", gtid_mode);
                self.replication = Some(state);
            }
        }
        Ok(())
    }
}

/// One journaled admin command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub node: NodeAddress,
    pub command: AdminCommand,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct Cluster {
    nodes: BTreeMap<NodeAddress, SimNode>,
    journal: Vec<JournalEntry>,
}

impl Cluster {
    fn reachable_node(&mut self, address: &NodeAddress) -> GatewayResult<&mut SimNode> {
        match self.nodes.get_mut(address) {
            Some(node) if node.reachable => Ok(node),
            Some(_) => Err(GatewayError::connection(address, "host unreachable")),
            None => Err(GatewayError::connection(address, "unknown host")),
        }
    }
}

/// Gateway over a simulated cluster. Clones share the same cluster.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    cluster: Arc<Mutex<Cluster>>,
}

impl MemoryGateway {
    /// Create an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node.
    pub fn add_node(&self, address: &NodeAddress, node: SimNode) {
        self.cluster.lock().nodes.insert(address.clone(), node);
    }

    /// Mark a node reachable or not.
    pub fn set_reachable(&self, address: &NodeAddress, reachable: bool) {
        if let Some(node) = self.cluster.lock().nodes.get_mut(address) {
            node.reachable = reachable;
        }
    }

    /// Mutate a node in place.
    pub fn update_node(&self, address: &NodeAddress, f: impl FnOnce(&mut SimNode)) {
        if let Some(node) = self.cluster.lock().nodes.get_mut(address) {
            f(node);
        }
    }

    /// Current state of a node.
    pub fn node(&self, address: &NodeAddress) -> Option<SimNode> {
        self.cluster.lock().nodes.get(address).cloned()
    }

    /// Every admin command issued so far, in order.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.cluster.lock().journal.clone()
    }

    /// Commands issued to one node, in order.
    pub fn commands_for(&self, address: &NodeAddress) -> Vec<AdminCommand> {
        self.cluster
            .lock()
            .journal
            .iter()
            .filter(|e| &e.node == address)
            .map(|e| e.command.clone())
            .collect()
    }

    /// How many times `command` was issued to `address`.
    pub fn count(&self, address: &NodeAddress, command: &AdminCommand) -> usize {
        self.cluster
            .lock()
            .journal
            .iter()
            .filter(|e| &e.node == address && &e.command == command)
            .count()
    }

    /// Number of mutating commands issued to any node.
    pub fn mutation_count(&self) -> usize {
        self.cluster
            .lock()
            .journal
            .iter()
            .filter(|e| e.command.is_mutation())
            .count()
    }
}

impl NodeGateway for MemoryGateway {
    fn connect(
        &self,
        _credentials: &Credentials,
        address: &NodeAddress,
    ) -> GatewayResult<Box<dyn NodeSession>> {
        self.cluster.lock().reachable_node(address)?;
        Ok(Box::new(MemorySession {
            address: address.clone(),
            cluster: Arc::clone(&self.cluster),
        }))
    }
}

struct MemorySession {
    address: NodeAddress,
    cluster: Arc<Mutex<Cluster>>,
}

impl NodeSession for MemorySession {
    fn address(&self) -> &NodeAddress {
        &self.address
    }

    fn ping(&mut self) -> bool {
        self.cluster.lock().reachable_node(&self.address).is_ok()
    }

    fn read_replication_state(&mut self) -> GatewayResult<Option<ReplicationState>> {
        let mut cluster = self.cluster.lock();
        Ok(cluster.reachable_node(&self.address)?.replication.clone())
    }

    fn read_all_variables(&mut self) -> GatewayResult<BTreeMap<String, String>> {
        let mut cluster = self.cluster.lock();
        Ok(cluster.reachable_node(&self.address)?.variables.clone())
    }

    fn list_replication_consumers(&mut self) -> GatewayResult<Vec<String>> {
        let mut cluster = self.cluster.lock();
        Ok(cluster.reachable_node(&self.address)?.consumers.clone())
    }

    fn count_long_running_writes(&mut self, _age: Duration) -> GatewayResult<u64> {
        let mut cluster = self.cluster.lock();
        let node = cluster.reachable_node(&self.address)?;
        if node.failing_long_write_count {
            return Err(GatewayError::query(&self.address, "processlist unavailable"));
        }
        Ok(node.long_running_writes)
    }

    fn wait_for_gtid(&mut self, position: &str, _timeout: Duration) -> GatewayResult<bool> {
        let mut cluster = self.cluster.lock();
        let node = cluster.reachable_node(&self.address)?;
        if !node.catches_up {
            return Ok(false);
        }
        node.variables
            .insert("GTID_CURRENT_POS".to_string(), position.to_string());
        Ok(true)
    }

    fn exec_admin(&mut self, command: &AdminCommand) -> GatewayResult<()> {
        let mut cluster = self.cluster.lock();
        let result = match cluster.reachable_node(&self.address) {
            Ok(node) if node.failing_commands.contains(command.name()) => Err(
                GatewayError::exec(&self.address, command.name(), "injected failure"),
            ),
            Ok(node) => node
                .apply(command)
                .map_err(|msg| GatewayError::exec(&self.address, command.name(), msg)),
            Err(e) => Err(e),
        };
        cluster.journal.push(JournalEntry {
            node: self.address.clone(),
            command: command.clone(),
            succeeded: result.is_ok(),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GtidMode, Secret};

    fn addr(host: &str) -> NodeAddress {
        NodeAddress::new(host, 3306)
    }

    #[test]
    fn test_connect_unknown_or_unreachable() {
        let gateway = MemoryGateway::new();
        let creds = Credentials::default();
        assert!(gateway.connect(&creds, &addr("nowhere")).is_err());

        gateway.add_node(&addr("db1"), SimNode::primary(1));
        gateway.set_reachable(&addr("db1"), false);
        let err = gateway.connect(&creds, &addr("db1")).err().unwrap();
        assert!(err.is_connectivity());
    }

    #[test]
    fn test_journal_records_failures() {
        let gateway = MemoryGateway::new();
        gateway.add_node(&addr("db1"), SimNode::primary(1).failing("UNLOCK TABLES"));
        let mut session = gateway.connect(&Credentials::default(), &addr("db1")).unwrap();

        session.exec_admin(&AdminCommand::AcquireReadLock).unwrap();
        assert!(session.exec_admin(&AdminCommand::ReleaseReadLock).is_err());

        let journal = gateway.journal();
        assert_eq!(journal.len(), 2);
        assert!(journal[0].succeeded);
        assert!(!journal[1].succeeded);
        assert!(gateway.node(&addr("db1")).unwrap().read_lock_held);
    }

    #[test]
    fn test_change_source_requires_stopped_threads() {
        let gateway = MemoryGateway::new();
        gateway.add_node(&addr("db2"), SimNode::replica_of(&addr("db1"), 5));
        let mut session = gateway.connect(&Credentials::default(), &addr("db2")).unwrap();
        let change = AdminCommand::ChangeSource {
            host: "db3".to_string(),
            port: 3306,
            user: "repl".to_string(),
            password: Secret::new("x"),
            gtid_mode: GtidMode::CurrentPos,
        };

        assert!(session.exec_admin(&change).is_err());
        session.exec_admin(&AdminCommand::StopReplica).unwrap();
        session.exec_admin(&change).unwrap();
        session.exec_admin(&AdminCommand::StartReplica).unwrap();

        let state = session.read_replication_state().unwrap().unwrap();
        assert_eq!(state.source_host, "db3");
        assert!(state.io_running && state.sql_running);
    }

    #[test]
    fn test_read_variable_is_case_insensitive() {
        let gateway = MemoryGateway::new();
        gateway.add_node(&addr("db1"), SimNode::primary(42));
        let mut session = gateway.connect(&Credentials::default(), &addr("db1")).unwrap();
        assert_eq!(session.read_variable("gtid_binlog_pos").unwrap(), "0-1-42");
        assert!(session.read_variable("no_such_var").is_err());
    }
}
