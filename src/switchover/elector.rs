//! Candidate Elector
//!
//! Filters the replicas of a snapshot through the eligibility gates and
//! picks the switchover target. Gates run in a fixed order and stop at
//! the first failure, which is recorded on the candidate:
//!
//! 1. the node answers a ping
//! 2. binary logging is enabled (it must be able to serve as a source)
//! 3. it replicates from the declared primary
//! 4. its applied GTID position equals the primary's binlog position
//!
//! This is a local decision by whichever process runs the switchover, not
//! an election among the replicas.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::gateway::{Credentials, GatewayResult, NodeGateway, NodeSession};
use crate::topology::{Gtid, NodeAddress, NodeFacts, TopologySnapshot};

/// Policy applied when several eligible candidates share the highest sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Earliest in snapshot order wins
    #[default]
    FirstSeen,
    /// Lowest address wins, independent of discovery order. IP hosts
    /// compare numerically, host names lexicographically, then ports.
    LowestAddress,
}

/// Why a replica cannot be the switchover target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IneligibleReason {
    /// Connection or ping failed
    Unreachable { message: String },
    /// Reading the node's status failed after connecting
    QueryFailed { message: String },
    /// Binary logging is off
    BinlogDisabled,
    /// The node reports no replication configuration
    NotAReplica,
    /// The node replicates from another source
    SourceMismatch { source_host: String },
    /// Applied position differs from the primary's binlog position
    NotInSync {
        replica_pos: String,
        primary_pos: String,
    },
    /// The node's GTID position cannot be parsed
    MalformedGtid { value: String },
    /// The node's GTID belongs to a different replication domain
    DomainMismatch { replica_domain: u32, primary_domain: u32 },
}

impl IneligibleReason {
    /// Human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Unreachable { message } => format!("offline: {}", message),
            Self::QueryFailed { message } => format!("status query failed: {}", message),
            Self::BinlogDisabled => "binary log off, cannot act as a source".to_string(),
            Self::NotAReplica => "not a replica".to_string(),
            Self::SourceMismatch { source_host } => {
                format!("replicates from {}, not the current primary", source_host)
            }
            Self::NotInSync {
                replica_pos,
                primary_pos,
            } => format!(
                "not in sync: applied {} but primary is at {}",
                replica_pos, primary_pos
            ),
            Self::MalformedGtid { value } => format!("malformed GTID position '{}'", value),
            Self::DomainMismatch {
                replica_domain,
                primary_domain,
            } => format!(
                "GTID domain {} differs from primary domain {}",
                replica_domain, primary_domain
            ),
        }
    }
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Verdict of the eligibility gates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibleReason),
}

/// A replica considered for promotion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub address: NodeAddress,
    /// Parsed GTID, present once the node passed the sync gate
    pub gtid: Option<Gtid>,
    pub eligibility: Eligibility,
}

impl Candidate {
    /// An eligible candidate at `gtid`.
    pub fn eligible(address: NodeAddress, gtid: Gtid) -> Self {
        Self {
            address,
            gtid: Some(gtid),
            eligibility: Eligibility::Eligible,
        }
    }

    /// An excluded candidate.
    pub fn ineligible(address: NodeAddress, reason: IneligibleReason) -> Self {
        Self {
            address,
            gtid: None,
            eligibility: Eligibility::Ineligible(reason),
        }
    }

    /// Whether every gate passed.
    pub fn is_eligible(&self) -> bool {
        matches!(self.eligibility, Eligibility::Eligible)
    }

    /// Parsed GTID sequence number.
    pub fn sequence(&self) -> Option<u64> {
        self.gtid.map(|g| g.sequence)
    }

    /// Reason for exclusion, if any.
    pub fn reason(&self) -> Option<&IneligibleReason> {
        match &self.eligibility {
            Eligibility::Ineligible(reason) => Some(reason),
            Eligibility::Eligible => None,
        }
    }
}

/// Result of one election
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Election {
    /// Every replica of the snapshot, in snapshot order
    pub candidates: Vec<Candidate>,
    /// Index of the elected candidate
    pub elected: Option<usize>,
}

impl Election {
    /// The elected candidate, or `None` when no replica is eligible.
    pub fn elected(&self) -> Option<&Candidate> {
        self.elected.and_then(|i| self.candidates.get(i))
    }
}

/// Pick the candidate with the highest sequence among the eligible ones.
///
/// Sequences are compared only within the primary's GTID domain; an
/// eligible candidate outside that domain is never compared.
pub fn select(candidates: &[Candidate], domain: Option<u32>, tie_break: TieBreak) -> Option<usize> {
    let mut best: Option<(usize, Gtid)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        if !candidate.is_eligible() {
            continue;
        }
        let Some(gtid) = candidate.gtid else {
            continue;
        };
        if domain.is_some_and(|d| d != gtid.domain) {
            continue;
        }
        best = match best {
            None => Some((i, gtid)),
            Some((j, current)) => match gtid.sequence.cmp(&current.sequence) {
                Ordering::Greater => Some((i, gtid)),
                Ordering::Equal
                    if tie_break == TieBreak::LowestAddress
                        && candidate.address.cmp_natural(&candidates[j].address)
                            == Ordering::Less =>
                {
                    Some((i, gtid))
                }
                _ => Some((j, current)),
            },
        };
    }
    best.map(|(i, _)| i)
}

/// Runs the eligibility gates against live nodes
pub struct CandidateElector {
    gateway: Arc<dyn NodeGateway>,
    credentials: Credentials,
    tie_break: TieBreak,
}

impl CandidateElector {
    /// Create an elector.
    pub fn new(gateway: Arc<dyn NodeGateway>, credentials: Credentials, tie_break: TieBreak) -> Self {
        Self {
            gateway,
            credentials,
            tie_break,
        }
    }

    /// Evaluate every replica of `topology` against the primary behind
    /// `primary` and elect a target.
    ///
    /// Fails only when the primary's binlog position cannot be read, since
    /// the sync gate cannot be evaluated without it.
    pub fn elect(
        &self,
        topology: &TopologySnapshot,
        primary: &mut dyn NodeSession,
    ) -> GatewayResult<Election> {
        let primary_pos = primary.read_variable("GTID_BINLOG_POS")?;
        let primary_domain = Gtid::parse(&primary_pos).ok().map(|g| g.domain);
        let primary_addr = topology.primary_address();

        let candidates: Vec<Candidate> = topology
            .replicas
            .iter()
            .map(|entry| {
                let candidate = self.evaluate(&entry.address, primary_addr, &primary_pos, primary_domain);
                match candidate.reason() {
                    Some(reason @ IneligibleReason::NotInSync { .. }) => {
                        warn!(node = %candidate.address, reason = %reason, "replica not in sync, skipping")
                    }
                    Some(reason) => {
                        warn!(node = %candidate.address, reason = %reason, "replica not eligible")
                    }
                    None => debug!(
                        node = %candidate.address,
                        sequence = candidate.sequence().unwrap_or_default(),
                        "replica eligible"
                    ),
                }
                candidate
            })
            .collect();

        let elected = select(&candidates, primary_domain, self.tie_break);
        if let Some(i) = elected {
            info!(node = %candidates[i].address, tie_break = ?self.tie_break, "candidate elected");
        }
        Ok(Election {
            candidates,
            elected,
        })
    }

    fn evaluate(
        &self,
        address: &NodeAddress,
        primary: &NodeAddress,
        primary_pos: &str,
        primary_domain: Option<u32>,
    ) -> Candidate {
        let reject = |reason| Candidate::ineligible(address.clone(), reason);

        // Gate 1: reachable
        let mut session = match self.gateway.connect(&self.credentials, address) {
            Ok(session) => session,
            Err(e) => {
                return reject(IneligibleReason::Unreachable {
                    message: e.to_string(),
                })
            }
        };
        if !session.ping() {
            return reject(IneligibleReason::Unreachable {
                message: "ping failed".to_string(),
            });
        }

        // Gate 2: binary log on
        let facts = match session.read_all_variables() {
            Ok(vars) => NodeFacts::from_variables(&vars),
            Err(e) => {
                return reject(IneligibleReason::QueryFailed {
                    message: e.to_string(),
                })
            }
        };
        if !facts.log_bin {
            return reject(IneligibleReason::BinlogDisabled);
        }

        // Gate 3: replicating from the declared primary
        match session.read_replication_state() {
            Ok(Some(state)) if state.is_source(primary) => {}
            Ok(Some(state)) => {
                return reject(IneligibleReason::SourceMismatch {
                    source_host: state.source_host,
                })
            }
            Ok(None) => return reject(IneligibleReason::NotAReplica),
            Err(e) => {
                return reject(IneligibleReason::QueryFailed {
                    message: e.to_string(),
                })
            }
        }

        // Gate 4: in sync with the primary
        let replica_pos = facts.gtid_current_pos.unwrap_or_default();
        if replica_pos != primary_pos {
            return reject(IneligibleReason::NotInSync {
                replica_pos,
                primary_pos: primary_pos.to_string(),
            });
        }

        let gtid = match Gtid::parse(&replica_pos) {
            Ok(gtid) => gtid,
            Err(_) => return reject(IneligibleReason::MalformedGtid { value: replica_pos }),
        };
        if let Some(domain) = primary_domain.filter(|d| *d != gtid.domain) {
            return reject(IneligibleReason::DomainMismatch {
                replica_domain: gtid.domain,
                primary_domain: domain,
            });
        }
        Candidate::eligible(address.clone(), gtid)
    }
}
