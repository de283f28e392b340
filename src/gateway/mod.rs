//! Node Gateway
//!
//! The capability the core uses to reach a database node. The core never
//! owns a connection pool or driver; it asks a `NodeGateway` for a session
//! bound to one node and issues reads and typed admin commands through it.
//!
//! Sessions matter: the global read lock belongs to the session that took
//! it, so the orchestrator keeps one primary session from QUIESCE to RESUME.

mod command;
mod errors;
pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;

pub use command::{AdminCommand, GtidMode};
pub use errors::{GatewayError, GatewayResult};

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::topology::{NodeAddress, ReplicationState};

/// A string that never appears in Debug or log output.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the underlying value. Only the wire layer should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Login used to open a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: Secret,
}

impl Credentials {
    /// Create credentials.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: Secret::new(password),
        }
    }

    /// Split a `user:password` pair. A missing password is empty.
    pub fn from_pair(pair: &str) -> Self {
        match pair.split_once(':') {
            Some((user, password)) => Self::new(user, password),
            None => Self::new(pair, ""),
        }
    }
}

/// Opens sessions to database nodes.
pub trait NodeGateway: Send + Sync {
    /// Connect to one node.
    fn connect(
        &self,
        credentials: &Credentials,
        address: &NodeAddress,
    ) -> GatewayResult<Box<dyn NodeSession>>;
}

/// An open connection to a single node.
pub trait NodeSession: Send {
    /// The node this session is bound to.
    fn address(&self) -> &NodeAddress;

    /// Liveness probe.
    fn ping(&mut self) -> bool;

    /// Replication status, or `None` when the node is not a replica.
    fn read_replication_state(&mut self) -> GatewayResult<Option<ReplicationState>>;

    /// All global variables, keyed by upper-case name.
    fn read_all_variables(&mut self) -> GatewayResult<BTreeMap<String, String>>;

    /// One global variable by name (case-insensitive).
    fn read_variable(&mut self, name: &str) -> GatewayResult<String> {
        let key = name.to_ascii_uppercase();
        self.read_all_variables()?
            .remove(&key)
            .ok_or_else(|| GatewayError::MissingVariable {
                address: self.address().to_string(),
                name: key,
            })
    }

    /// Hosts of live connections streaming the replication log from this node.
    fn list_replication_consumers(&mut self) -> GatewayResult<Vec<String>>;

    /// Number of running non-SELECT statements at least `age` old.
    fn count_long_running_writes(&mut self, age: Duration) -> GatewayResult<u64>;

    /// Block until this node has applied `position`, up to `timeout`.
    ///
    /// Returns `false` on timeout.
    fn wait_for_gtid(&mut self, position: &str, timeout: Duration) -> GatewayResult<bool>;

    /// Execute an administrative command.
    fn exec_admin(&mut self, command: &AdminCommand) -> GatewayResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_from_pair() {
        let creds = Credentials::from_pair("repl:pa:ss");
        assert_eq!(creds.user, "repl");
        assert_eq!(creds.password.expose(), "pa:ss");

        let creds = Credentials::from_pair("monitor");
        assert_eq!(creds.user, "monitor");
        assert!(creds.password.is_empty());
    }

    #[test]
    fn test_secret_redacted_in_debug() {
        let creds = Credentials::new("admin", "topsecret");
        let text = format!("{:?}", creds);
        assert!(text.contains("admin"));
        assert!(!text.contains("topsecret"));
    }
}
