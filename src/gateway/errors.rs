//! Gateway Error Types
//!
//! Connectivity failures are distinguished from statement failures so that
//! the prober can degrade a node to Unreachable while the orchestrator
//! records a per-node mutation failure.

use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors raised by a node gateway
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Could not open a session to the node
    #[error("cannot connect to {address}: {message}")]
    Connection { address: String, message: String },

    /// A read query failed
    #[error("query failed on {address}: {message}")]
    Query { address: String, message: String },

    /// An administrative statement failed
    #[error("{command} failed on {address}: {message}")]
    Exec {
        address: String,
        command: &'static str,
        message: String,
    },

    /// A required variable is absent from the node's global variables
    #[error("variable {name} not found on {address}")]
    MissingVariable { address: String, name: String },
}

impl GatewayError {
    /// Create a connection error.
    pub fn connection(address: impl ToString, message: impl Into<String>) -> Self {
        Self::Connection {
            address: address.to_string(),
            message: message.into(),
        }
    }

    /// Create a query error.
    pub fn query(address: impl ToString, message: impl Into<String>) -> Self {
        Self::Query {
            address: address.to_string(),
            message: message.into(),
        }
    }

    /// Create an exec error for the named admin command.
    pub fn exec(address: impl ToString, command: &'static str, message: impl Into<String>) -> Self {
        Self::Exec {
            address: address.to_string(),
            command,
            message: message.into(),
        }
    }

    /// Whether the node itself could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}
