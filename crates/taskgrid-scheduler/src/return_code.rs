//! Numeric return codes for every scheduler outcome.
//!
//! Callers that expose the scheduler over their own transport report
//! results as `E0xx` codes; this module is the single mapping from typed
//! results to that table.

use std::fmt;

use serde::{Deserialize, Serialize};

use taskgrid_state::StateError;

use crate::error::SchedulerError;
use crate::scheduler::ScheduleOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnCode {
    Initialized,
    InvalidThreshold,
    NodeRegistered,
    InvalidNodeId,
    NodeAlreadyRegistered,
    NodeUnregistered,
    NodeNotFound,
    TaskAdded,
    InvalidTaskId,
    TaskAlreadyExists,
    TaskDeleted,
    TaskNotFound,
    ScheduleSucceeded,
    NoSuitablePlan,
    QuerySucceeded,
}

impl ReturnCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Initialized => "E001",
            Self::InvalidThreshold => "E002",
            Self::NodeRegistered => "E003",
            Self::InvalidNodeId => "E004",
            Self::NodeAlreadyRegistered => "E005",
            Self::NodeUnregistered => "E006",
            Self::NodeNotFound => "E007",
            Self::TaskAdded => "E008",
            Self::InvalidTaskId => "E009",
            Self::TaskAlreadyExists => "E010",
            Self::TaskDeleted => "E011",
            Self::TaskNotFound => "E012",
            Self::ScheduleSucceeded => "E013",
            Self::NoSuitablePlan => "E014",
            Self::QuerySucceeded => "E015",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Initialized => "initialization succeeded",
            Self::InvalidThreshold => "invalid scheduling threshold",
            Self::NodeRegistered => "node registered",
            Self::InvalidNodeId => "invalid node id",
            Self::NodeAlreadyRegistered => "node already registered",
            Self::NodeUnregistered => "node unregistered",
            Self::NodeNotFound => "node does not exist",
            Self::TaskAdded => "task added",
            Self::InvalidTaskId => "invalid task id",
            Self::TaskAlreadyExists => "task already added",
            Self::TaskDeleted => "task deleted",
            Self::TaskNotFound => "task does not exist",
            Self::ScheduleSucceeded => "task scheduling succeeded",
            Self::NoSuitablePlan => "no suitable migration plan",
            Self::QuerySucceeded => "task status query succeeded",
        }
    }

    /// False only for validation and not-found failures. `NoSuitablePlan`
    /// is a normal outcome.
    pub fn is_success(&self) -> bool {
        !matches!(
            self,
            Self::InvalidThreshold
                | Self::InvalidNodeId
                | Self::NodeAlreadyRegistered
                | Self::NodeNotFound
                | Self::InvalidTaskId
                | Self::TaskAlreadyExists
                | Self::TaskNotFound
        )
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

impl From<ScheduleOutcome> for ReturnCode {
    fn from(outcome: ScheduleOutcome) -> Self {
        match outcome {
            ScheduleOutcome::Succeeded { .. } => Self::ScheduleSucceeded,
            ScheduleOutcome::NoSuitablePlan { .. } => Self::NoSuitablePlan,
        }
    }
}

impl From<&SchedulerError> for ReturnCode {
    fn from(err: &SchedulerError) -> Self {
        match err {
            SchedulerError::InvalidThreshold(_) | SchedulerError::ThresholdNotConfigured => {
                Self::InvalidThreshold
            }
            SchedulerError::State(state) => state.into(),
        }
    }
}

impl From<&StateError> for ReturnCode {
    fn from(err: &StateError) -> Self {
        match err {
            StateError::InvalidNodeId(_) => Self::InvalidNodeId,
            StateError::NodeAlreadyRegistered(_) => Self::NodeAlreadyRegistered,
            StateError::NodeNotFound(_) => Self::NodeNotFound,
            StateError::InvalidTaskId(_) => Self::InvalidTaskId,
            StateError::TaskAlreadyExists(_) => Self::TaskAlreadyExists,
            StateError::TaskNotFound(_) => Self::TaskNotFound,
            // A plan the registry refused was never committed.
            StateError::InvalidAssignment(_) | StateError::InvariantViolation(_) => {
                Self::NoSuitablePlan
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_table() {
        assert_eq!(ReturnCode::Initialized.code(), "E001");
        assert_eq!(ReturnCode::InvalidThreshold.code(), "E002");
        assert_eq!(ReturnCode::TaskNotFound.code(), "E012");
        assert_eq!(ReturnCode::NoSuitablePlan.code(), "E014");
        assert_eq!(ReturnCode::QuerySucceeded.code(), "E015");
    }

    #[test]
    fn display_includes_code_and_description() {
        assert_eq!(
            ReturnCode::NodeAlreadyRegistered.to_string(),
            "E005: node already registered"
        );
    }

    #[test]
    fn errors_map_to_failure_codes() {
        let cases = [
            (SchedulerError::InvalidThreshold(0), ReturnCode::InvalidThreshold),
            (SchedulerError::State(StateError::InvalidNodeId(-1)), ReturnCode::InvalidNodeId),
            (SchedulerError::State(StateError::NodeNotFound(4)), ReturnCode::NodeNotFound),
            (
                SchedulerError::State(StateError::TaskAlreadyExists(2)),
                ReturnCode::TaskAlreadyExists,
            ),
        ];
        for (err, expected) in cases {
            let code = ReturnCode::from(&err);
            assert_eq!(code, expected);
            assert!(!code.is_success());
        }
    }

    #[test]
    fn outcomes_are_successes() {
        let ok = ReturnCode::from(ScheduleOutcome::Succeeded { migrated: 3 });
        let none = ReturnCode::from(ScheduleOutcome::NoSuitablePlan { load_spread: 9 });
        assert_eq!(ok, ReturnCode::ScheduleSucceeded);
        assert_eq!(none, ReturnCode::NoSuitablePlan);
        assert!(ok.is_success() && none.is_success());
    }
}
