//! Topology Error Types

use thiserror::Error;

/// Result type for topology parsing
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors from parsing node addresses and GTIDs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// Address string was empty
    #[error("empty node address")]
    EmptyAddress,

    /// Port component was not a valid TCP port
    #[error("invalid port in node address '{0}'")]
    InvalidPort(String),

    /// GTID did not have exactly three numeric components
    #[error("malformed GTID '{0}': expected domain-server-sequence")]
    MalformedGtid(String),

    /// GTID position carries more than one replication domain
    #[error("GTID position '{0}' spans several replication domains")]
    MultiDomainGtid(String),
}
