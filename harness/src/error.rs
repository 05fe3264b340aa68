//! Harness error types

use shared::{NodeState, SharedError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("{what} has already been created")]
    AlreadyExists { what: String },

    #[error("A monitor must be created before {what}")]
    MonitorMissing { what: String },

    #[error("{name} failed\n{command_line}\n{stdout}\n{stderr}")]
    CommandFailed {
        name: String,
        command_line: String,
        stdout: String,
        stderr: String,
        returncode: i32,
    },

    #[error("{name} timed out after {} seconds.\n{command_line}", .timeout.as_secs_f64())]
    CommandTimedOut {
        name: String,
        command_line: String,
        timeout: Duration,
    },

    #[error(
        "{member} failed to reach {target} after {} seconds (last observed: {})",
        .deadline.as_secs_f64(),
        .last_observed.as_ref().map(NodeState::as_str).unwrap_or("none")
    )]
    ConvergenceTimeout {
        member: String,
        target: NodeState,
        last_observed: Option<NodeState>,
        deadline: Duration,
    },

    #[error("Query failed on {member}: {query}: {source}")]
    QueryError {
        member: String,
        query: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{name} could not be stopped after {attempts} attempts")]
    StopFailed { name: String, attempts: u32 },

    #[error("Node {node_id} in group {group_id} not found on the monitor")]
    NodeNotFound { node_id: u32, group_id: u32 },

    #[error("Unexpected {what} value: {value:?}")]
    UnexpectedValue { what: String, value: String },

    #[error("Failed to spawn {command_line}: {source}")]
    Spawn {
        command_line: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn config(field: impl Into<String>) -> Self {
        HarnessError::ConfigurationError { field: field.into() }
    }

    pub fn unexpected(what: impl Into<String>, value: impl Into<String>) -> Self {
        HarnessError::UnexpectedValue {
            what: what.into(),
            value: value.into(),
        }
    }

    /// Return code carried by a failed command, if this is one
    pub fn returncode(&self) -> Option<i32> {
        match self {
            HarnessError::CommandFailed { returncode, .. } => Some(*returncode),
            _ => None,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_message_carries_streams() {
        let err = HarnessError::CommandFailed {
            name: "show uri".to_string(),
            command_line: "pg_autoctl show uri --pgdata /tmp/node1".to_string(),
            stdout: "partial".to_string(),
            stderr: "FATAL boom".to_string(),
            returncode: 1,
        };
        let message = err.to_string();
        assert!(message.starts_with("show uri failed"));
        assert!(message.contains("pg_autoctl show uri --pgdata /tmp/node1"));
        assert!(message.contains("partial"));
        assert!(message.contains("FATAL boom"));
        assert_eq!(err.returncode(), Some(1));
    }

    #[test]
    fn test_convergence_timeout_message() {
        let err = HarnessError::ConvergenceTimeout {
            member: "node2".to_string(),
            target: NodeState::Secondary,
            last_observed: Some(NodeState::CatchingUp),
            deadline: Duration::from_secs(90),
        };
        assert_eq!(
            err.to_string(),
            "node2 failed to reach secondary after 90 seconds (last observed: catchingup)"
        );

        let never_seen = HarnessError::ConvergenceTimeout {
            member: "node1".to_string(),
            target: NodeState::Single,
            last_observed: None,
            deadline: Duration::from_millis(1500),
        };
        assert!(never_seen.to_string().contains("after 1.5 seconds (last observed: none)"));
        assert_eq!(never_seen.returncode(), None);
    }
}
