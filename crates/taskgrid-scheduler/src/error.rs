//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("invalid threshold: {0}")]
    InvalidThreshold(i64),

    #[error("no default threshold configured")]
    ThresholdNotConfigured,

    #[error("registry error: {0}")]
    State(#[from] taskgrid_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
