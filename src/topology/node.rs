//! Node identity and derived role
//!
//! A node is identified by host and port only. Its role is never
//! configured or stored; it is derived from what a probe observed.

use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;

use serde::{Serialize, Serializer};

use super::errors::{TopologyError, TopologyResult};

/// Port assumed when an address carries none
pub const DEFAULT_PORT: u16 = 3306;

/// Network identity of a database node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    /// Create an address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host[:port]`, using `default_port` when the port is omitted.
    ///
    /// A bare IPv6 literal (more than one colon, no brackets) is taken as a
    /// host without port; `[v6]:port` is accepted.
    pub fn parse(s: &str, default_port: u16) -> TopologyResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TopologyError::EmptyAddress);
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| TopologyError::InvalidPort(s.to_string()))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => parse_port(p, s)?,
                None if tail.is_empty() => default_port,
                None => return Err(TopologyError::InvalidPort(s.to_string())),
            };
            return Ok(Self::new(host, port));
        }

        match s.matches(':').count() {
            0 => Ok(Self::new(s, default_port)),
            1 => {
                let (host, port) = s.split_once(':').unwrap_or((s, ""));
                if host.is_empty() {
                    return Err(TopologyError::EmptyAddress);
                }
                Ok(Self::new(host, parse_port(port, s)?))
            }
            _ => Ok(Self::new(s, default_port)),
        }
    }

    /// Whether `host` names this node's host.
    pub fn same_host(&self, host: &str) -> bool {
        self.host.eq_ignore_ascii_case(host.trim())
    }

    /// Address order for operators: IP literals compare numerically
    /// (`10.0.0.9` before `10.0.0.10`), anything else by host name, then
    /// by port.
    pub fn cmp_natural(&self, other: &Self) -> Ordering {
        let hosts = match (self.host.parse::<IpAddr>(), other.host.parse::<IpAddr>()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => self.host.cmp(&other.host),
        };
        hosts.then(self.port.cmp(&other.port))
    }
}

fn parse_port(port: &str, whole: &str) -> TopologyResult<u16> {
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(TopologyError::InvalidPort(whole.to_string())),
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl Serialize for NodeAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Role of a node as observed by the last probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeRole {
    /// The declared write source of the topology
    Primary,
    /// Reports a replication configuration
    Replica,
    /// Reachable but not replicating from anywhere
    Detached,
    /// Could not be reached or queried
    Unreachable,
}

impl NodeRole {
    /// Role name for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Replica => "replica",
            Self::Detached => "detached",
            Self::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
