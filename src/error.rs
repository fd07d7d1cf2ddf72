use thiserror::Error;

use crate::state_machine::{Actor, EventKind, ExecutionId, ExecutionStateType};

/// Errors returned by the execution core. All are recoverable by the caller.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("illegal transition for {id}: {event} is not allowed from {from}")]
    IllegalTransition {
        id: ExecutionId,
        from: ExecutionStateType,
        event: EventKind,
    },

    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: ExecutionId,
        expected: u64,
        actual: u64,
    },

    #[error("{actor} may not {event} on {id}")]
    Unauthorized {
        id: ExecutionId,
        actor: Actor,
        event: EventKind,
    },

    #[error("verification of {id} has not completed")]
    IncompleteVerification { id: ExecutionId },

    #[error("node {node_id} already has a live execution: {active}")]
    ActiveExecutionExists { node_id: String, active: ExecutionId },

    #[error("{id} cannot be created in state {state} at version {version}; only fresh New records are accepted")]
    InvalidCreate {
        id: ExecutionId,
        state: ExecutionStateType,
        version: u64,
    },

    #[error("execution already exists: {0}")]
    DuplicateExecution(ExecutionId),

    #[error("execution {id} does not belong to job {job_id}")]
    ForeignExecution { job_id: String, id: ExecutionId },

    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("unknown execution state: {0}")]
    UnknownState(String),

    #[error("timed out after {waited_ms}ms waiting on job {job_id}")]
    Timeout { job_id: String, waited_ms: u64 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ExecutionError {
    /// A stale write lost an optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ExecutionError::VersionConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ExecutionError::ExecutionNotFound(_) | ExecutionError::JobNotFound(_)
        )
    }
}

pub type Result<T, E = ExecutionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_and_not_found_are_distinct() {
        let id = ExecutionId::new("job", "node", "e1");
        let conflict = ExecutionError::VersionConflict {
            id: id.clone(),
            expected: 1,
            actual: 2,
        };
        let missing = ExecutionError::ExecutionNotFound(id);

        assert!(conflict.is_conflict());
        assert!(!conflict.is_not_found());
        assert!(missing.is_not_found());
        assert!(!missing.is_conflict());
        assert!(ExecutionError::JobNotFound("job".into()).is_not_found());
    }

    #[test]
    fn messages_name_the_execution() {
        let err = ExecutionError::IllegalTransition {
            id: ExecutionId::new("job", "node-123456789", "e1"),
            from: ExecutionStateType::New,
            event: EventKind::AcceptBid,
        };
        assert_eq!(
            err.to_string(),
            "illegal transition for job:node-123:e1: AcceptBid is not allowed from New"
        );
    }
}
