//! Topology Subsystem
//!
//! Node identity, per-replica replication facts, GTID ordering and the
//! immutable snapshot a probe cycle produces.
//!
//! Exactly one node is treated as primary per snapshot: the one the
//! operator declared. Roles of the other nodes are derived from what they
//! report, never configured.

mod errors;
mod gtid;
mod node;
mod prober;
mod snapshot;
mod state;

pub use errors::{TopologyError, TopologyResult};
pub use gtid::{parse_sequence, Gtid};
pub use node::{NodeAddress, NodeRole, DEFAULT_PORT};
pub use prober::{DiscoveryMode, TopologyProber};
pub use snapshot::{NodeEntry, NodeFacts, NodeProbe, PrimaryStatus, TopologySnapshot};
pub use state::ReplicationState;
