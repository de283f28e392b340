//! Typed Administrative Commands
//!
//! The core never builds SQL text. It hands an `AdminCommand` to a session
//! and the gateway renders the statement at the wire boundary.

use std::fmt;

use super::Secret;

/// Which position a re-pointed replica resumes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GtidMode {
    /// Resume from the node's own last applied GTID
    CurrentPos,
}

impl GtidMode {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::CurrentPos => "current_pos",
        }
    }
}

/// An administrative action against a single node.
#[derive(Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Flush tables without writing the flush to the binary log
    FlushTablesNoLog,
    /// Take the global read lock, blocking new writes
    AcquireReadLock,
    /// Release the global read lock held by this session
    ReleaseReadLock,
    /// Stop both replica threads
    StopReplica,
    /// Start both replica threads
    StartReplica,
    /// Forget all replication configuration
    ResetReplicaAll,
    /// Set the global read_only flag
    SetReadOnly(bool),
    /// Point the node's replication at a new source
    ChangeSource {
        host: String,
        port: u16,
        user: String,
        password: Secret,
        gtid_mode: GtidMode,
    },
}

impl AdminCommand {
    /// Short stable name, used in logs, errors and journals.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FlushTablesNoLog => "FLUSH NO_WRITE_TO_BINLOG TABLES",
            Self::AcquireReadLock => "FLUSH TABLES WITH READ LOCK",
            Self::ReleaseReadLock => "UNLOCK TABLES",
            Self::StopReplica => "STOP SLAVE",
            Self::StartReplica => "START SLAVE",
            Self::ResetReplicaAll => "RESET SLAVE ALL",
            Self::SetReadOnly(_) => "SET GLOBAL read_only",
            Self::ChangeSource { .. } => "CHANGE MASTER TO",
        }
    }

    /// Whether the command changes topology or write state.
    ///
    /// A table flush without logging leaves replication wiring and
    /// writability untouched, every other command does not.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::FlushTablesNoLog)
    }

    /// Render the wire statement.
    pub fn to_statement(&self) -> String {
        match self {
            Self::SetReadOnly(on) => {
                format!("SET GLOBAL read_only={}", if *on { 1 } else { 0 })
            }
            Self::ChangeSource {
                host,
                port,
                user,
                password,
                gtid_mode,
            } => format!(
                "CHANGE MASTER TO master_host='{}', master_port={}, master_user='{}', master_password='{}', master_use_gtid={}",
                quote_literal(host),
                port,
                quote_literal(user),
                quote_literal(password.expose()),
                gtid_mode.as_sql()
            ),
            other => other.name().to_string(),
        }
    }
}

impl fmt::Debug for AdminCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetReadOnly(on) => write!(f, "SetReadOnly({})", on),
            Self::ChangeSource {
                host,
                port,
                user,
                gtid_mode,
                ..
            } => f
                .debug_struct("ChangeSource")
                .field("host", host)
                .field("port", port)
                .field("user", user)
                .field("gtid_mode", gtid_mode)
                .finish_non_exhaustive(),
            other => f.write_str(other.name()),
        }
    }
}

impl fmt::Display for AdminCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChangeSource { host, port, .. } => {
                write!(f, "CHANGE MASTER TO {}:{}", host, port)
            }
            Self::SetReadOnly(on) => write!(f, "SET GLOBAL read_only={}", u8::from(*on)),
            other => f.write_str(other.name()),
        }
    }
}

/// Escape a value for use inside a single-quoted SQL string literal.
fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out
}
