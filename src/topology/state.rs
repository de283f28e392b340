//! Per-replica replication facts
//!
//! Raw facts as reported by the node. Health classification is derived
//! from these in `crate::health` and never stored alongside them.

use serde::Serialize;

use super::node::NodeAddress;

/// Replication status of one replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationState {
    /// IO thread (log receiver) running
    pub io_running: bool,

    /// SQL thread (log applier) running
    pub sql_running: bool,

    /// Seconds behind the source; `None` when the node cannot tell,
    /// which happens whenever a replica thread is stopped
    pub seconds_behind: Option<u64>,

    /// Last GTID position received from the source
    pub gtid_io_pos: String,

    /// Host the node is configured to replicate from
    pub source_host: String,

    /// Port the node is configured to replicate from, when reported
    pub source_port: Option<u16>,

    /// GTID mode of the replication link (`No`, `Current_Pos`, `Slave_Pos`)
    pub using_gtid: String,

    /// Last IO thread error text, empty when none
    pub last_io_error: String,

    /// Last SQL thread error text, empty when none
    pub last_sql_error: String,
}

impl ReplicationState {
    /// A healthy, caught-up replica of `source`.
    pub fn replicating_from(source: &NodeAddress) -> Self {
        Self {
            io_running: true,
            sql_running: true,
            seconds_behind: Some(0),
            gtid_io_pos: String::new(),
            source_host: source.host.clone(),
            source_port: Some(source.port),
            using_gtid: "Current_Pos".to_string(),
            last_io_error: String::new(),
            last_sql_error: String::new(),
        }
    }

    /// Set the thread states.
    pub fn with_threads(mut self, io_running: bool, sql_running: bool) -> Self {
        self.io_running = io_running;
        self.sql_running = sql_running;
        self
    }

    /// Set the reported delay.
    pub fn with_delay(mut self, seconds_behind: Option<u64>) -> Self {
        self.seconds_behind = seconds_behind;
        self
    }

    /// Set the received GTID position.
    pub fn with_gtid_io_pos(mut self, pos: impl Into<String>) -> Self {
        self.gtid_io_pos = pos.into();
        self
    }

    /// Whether the configured source is `primary`.
    ///
    /// Hosts compare case-insensitively; ports compare only when the node
    /// reports one.
    pub fn is_source(&self, primary: &NodeAddress) -> bool {
        primary.same_host(&self.source_host)
            && self.source_port.map_or(true, |p| p == primary.port)
    }
}
