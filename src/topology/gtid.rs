//! GTID parsing
//!
//! A GTID is `domain-server_id-sequence`. Only the sequence orders
//! transactions, and only within one domain: comparing sequences from
//! different domains is meaningless, so callers must check
//! [`Gtid::same_domain`] before comparing.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::errors::{TopologyError, TopologyResult};

/// A single-domain global transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Gtid {
    pub domain: u32,
    pub server_id: u32,
    pub sequence: u64,
}

impl Gtid {
    /// Parse a single GTID.
    ///
    /// Exactly three dash-separated unsigned integers are required. A
    /// comma-separated multi-domain position is rejected.
    pub fn parse(s: &str) -> TopologyResult<Self> {
        let s = s.trim();
        if s.contains(',') {
            return Err(TopologyError::MultiDomainGtid(s.to_string()));
        }

        let mut fields = s.split('-');
        let (domain, server_id, sequence) =
            match (fields.next(), fields.next(), fields.next(), fields.next()) {
                (Some(d), Some(srv), Some(seq), None) => (d, srv, seq),
                _ => return Err(TopologyError::MalformedGtid(s.to_string())),
            };

        let malformed = |_| TopologyError::MalformedGtid(s.to_string());
        Ok(Self {
            domain: domain.parse().map_err(malformed)?,
            server_id: server_id.parse().map_err(malformed)?,
            sequence: sequence.parse().map_err(malformed)?,
        })
    }

    /// Whether both GTIDs belong to the same replication domain.
    pub fn same_domain(&self, other: &Gtid) -> bool {
        self.domain == other.domain
    }
}

impl FromStr for Gtid {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Gtid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.domain, self.server_id, self.sequence)
    }
}

/// Parse only the sequence component of a GTID.
pub fn parse_sequence(s: &str) -> TopologyResult<u64> {
    Gtid::parse(s).map(|g| g.sequence)
}
