//! Crate-wide error type.
//!
//! Transport and decode faults keep their own enums; everything above the
//! endpoint layer surfaces as a [`HapError`].

use std::fmt;

use crate::aggregate::ResultSet;
use crate::transport::TransportError;
use crate::wire::WireError;

/// What kind of daemon object a lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Frontend,
    Backend,
    Server,
    /// A key of the `show info` block.
    InfoKey,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Server => "server",
            Self::InfoKey => "info key",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by endpoints, handles, the aggregator and the facade.
#[derive(Debug, thiserror::Error)]
pub enum HapError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wire(#[from] WireError),

    /// The socket answered, but not as HAProxy.
    #[error("{endpoint} is not a HAProxy stats socket (Name: {found:?})")]
    ApplicationMismatch {
        endpoint: String,
        found: Option<String>,
    },

    /// The object is gone from the running configuration.
    #[error("{kind} {name:?} not found on {endpoint}")]
    NotFound {
        kind: EntityKind,
        name: String,
        endpoint: String,
    },

    /// Processes disagree on a value that should be identical.
    #[error("received different data per HAProxy process: {}", render(.results))]
    Inconsistent { results: ResultSet<String> },

    /// Processes answered a command differently.
    #[error("received different result per HAProxy process: {}", render(.results))]
    MultipleResults { results: ResultSet<String> },

    /// HAProxy rejected the command.
    #[error("command failed: {message}")]
    CommandFailed { message: String },

    #[error("unknown metric {name:?}")]
    UnknownMetric { name: String },

    /// Folding a counter left the representable range.
    #[error("metric {name:?} overflowed while folding across processes")]
    Overflow { name: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no HAProxy process to run against")]
    NoEndpoints,

    #[error("endpoint discovery failed: {0}")]
    Discovery(String),
}

impl HapError {
    /// Per-process results carried by the inconsistency faults.
    pub fn results(&self) -> Option<&ResultSet<String>> {
        match self {
            Self::Inconsistent { results } | Self::MultipleResults { results } => Some(results),
            _ => None,
        }
    }
}

fn render(results: &ResultSet<String>) -> String {
    results
        .iter()
        .map(|(process, value)| format!("#{process}={value:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inconsistent_display_lists_processes() {
        let err = HapError::Inconsistent {
            results: vec![(1, "UP".to_string()), (2, "DOWN".to_string())],
        };
        assert_eq!(
            err.to_string(),
            "received different data per HAProxy process: #1=\"UP\", #2=\"DOWN\""
        );
        assert_eq!(err.results().map(Vec::len), Some(2));
    }

    #[test]
    fn test_not_found_display() {
        let err = HapError::NotFound {
            kind: EntityKind::Backend,
            name: "app".to_string(),
            endpoint: "/run/haproxy.sock".to_string(),
        };
        assert_eq!(err.to_string(), "backend \"app\" not found on /run/haproxy.sock");
        assert!(err.results().is_none());
    }
}
