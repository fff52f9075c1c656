use thiserror::Error;

use crate::gateway::GatewayError;

use super::state::{Phase, MAX_TASK_LEN};

/// Input rejected locally, before anything reaches the network.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a task name")]
    EmptyTask,
    #[error("Task name is too long ({actual} characters, max {max})")]
    TaskTooLong { max: usize, actual: usize },
    #[error("Unsupported session length: {0} minutes (choose 25, 45 or 60)")]
    InvalidDuration(u32),
    #[error("Please describe the distraction")]
    EmptyDistraction,
}

impl ValidationError {
    pub(crate) fn task_too_long(actual: usize) -> Self {
        ValidationError::TaskTooLong {
            max: MAX_TASK_LEN,
            actual,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("cannot {action} while {phase}")]
    InvalidTransition { phase: Phase, action: &'static str },
    #[error("failed to start session: {0}")]
    StartFailed(GatewayError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("session was started offline and is not known to the server")]
    Offline,
    #[error("session was reset before the server responded")]
    Superseded,
}

pub type SessionResult<T> = Result<T, SessionError>;
