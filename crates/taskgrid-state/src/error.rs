//! Error types for the TaskGrid registry.

use thiserror::Error;

use crate::types::{NodeId, TaskId};

/// Result type alias for registry operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("invalid node id: {0}")]
    InvalidNodeId(NodeId),

    #[error("node already registered: {0}")]
    NodeAlreadyRegistered(NodeId),

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("invalid task id: {0}")]
    InvalidTaskId(TaskId),

    #[error("task already exists: {0}")]
    TaskAlreadyExists(TaskId),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("invalid assignment: {0}")]
    InvalidAssignment(String),

    #[error("registry invariant violated: {0}")]
    InvariantViolation(String),
}
