use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{clock::SessionClock, error::ValidationError};

pub const MAX_TASK_LEN: usize = 60;
pub const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Setup,
    Starting,
    Active,
    Completing,
    Completed,
    Ending,
    Error(String),
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Idle
    }
}

impl Phase {
    /// A gateway call is in flight and new submissions must be ignored.
    pub fn is_busy(&self) -> bool {
        matches!(self, Phase::Starting | Phase::Completing | Phase::Ending)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::Setup => f.write_str("setting up"),
            Phase::Starting => f.write_str("starting"),
            Phase::Active => f.write_str("active"),
            Phase::Completing => f.write_str("completing"),
            Phase::Completed => f.write_str("completed"),
            Phase::Ending => f.write_str("ending"),
            Phase::Error(_) => f.write_str("in error"),
        }
    }
}

/// Session lengths offered by the setup form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum FocusDuration {
    Short,
    Medium,
    Long,
}

impl Default for FocusDuration {
    fn default() -> Self {
        FocusDuration::Short
    }
}

impl FocusDuration {
    pub const ALL: [FocusDuration; 3] =
        [FocusDuration::Short, FocusDuration::Medium, FocusDuration::Long];

    pub fn minutes(self) -> u32 {
        match self {
            FocusDuration::Short => 25,
            FocusDuration::Medium => 45,
            FocusDuration::Long => 60,
        }
    }

    pub fn seconds(self) -> u64 {
        u64::from(self.minutes()) * 60
    }
}

impl TryFrom<u32> for FocusDuration {
    type Error = ValidationError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        match minutes {
            25 => Ok(FocusDuration::Short),
            45 => Ok(FocusDuration::Medium),
            60 => Ok(FocusDuration::Long),
            other => Err(ValidationError::InvalidDuration(other)),
        }
    }
}

impl From<FocusDuration> for u32 {
    fn from(duration: FocusDuration) -> Self {
        duration.minutes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    task: String,
    duration: FocusDuration,
}

impl SessionConfig {
    /// Trims the task and checks it against the form's limits.
    pub fn new(task: &str, duration_minutes: u32) -> Result<Self, ValidationError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(ValidationError::EmptyTask);
        }
        let len = task.chars().count();
        if len > MAX_TASK_LEN {
            return Err(ValidationError::task_too_long(len));
        }
        let duration = FocusDuration::try_from(duration_minutes)?;

        Ok(Self {
            task: task.to_string(),
            duration,
        })
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn duration(&self) -> FocusDuration {
        self.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HandleOrigin {
    Server,
    /// Started without server confirmation; never reconciled with the backend.
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub id: String,
    pub task: String,
    pub planned_duration_minutes: u32,
    pub origin: HandleOrigin,
}

impl SessionHandle {
    pub fn server(id: String, task: String, planned_duration_minutes: u32) -> Self {
        Self {
            id,
            task,
            planned_duration_minutes,
            origin: HandleOrigin::Server,
        }
    }

    pub fn local(config: &SessionConfig) -> Self {
        Self {
            id: format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()),
            task: config.task().to_string(),
            planned_duration_minutes: config.duration().minutes(),
            origin: HandleOrigin::Local,
        }
    }

    pub fn is_local(&self) -> bool {
        self.origin == HandleOrigin::Local
    }
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub task: Option<String>,
    pub duration_minutes: Option<u32>,
    pub session_id: Option<String>,
    pub remaining_seconds: u64,
    pub error: Option<String>,
    pub offline: bool,
}

#[derive(Debug, Default)]
pub(crate) struct MachineState {
    pub phase: Phase,
    pub config: Option<SessionConfig>,
    pub handle: Option<SessionHandle>,
    pub remaining_seconds: u64,
    pub error: Option<String>,
    /// Bumped whenever the current session is discarded; async results
    /// carrying an older epoch are dropped.
    pub epoch: u64,
    pub clock: SessionClock,
    pub auto_acknowledge: Option<JoinHandle<()>>,
}

impl MachineState {
    pub fn snapshot(&self) -> SessionSnapshot {
        let (task, duration_minutes) = match (&self.handle, &self.config) {
            (Some(handle), _) => (
                Some(handle.task.clone()),
                Some(handle.planned_duration_minutes),
            ),
            (None, Some(config)) => (
                Some(config.task().to_string()),
                Some(config.duration().minutes()),
            ),
            (None, None) => (None, None),
        };

        SessionSnapshot {
            phase: self.phase.clone(),
            task,
            duration_minutes,
            session_id: self.handle.as_ref().map(|handle| handle.id.clone()),
            remaining_seconds: self.remaining_seconds,
            error: self.error.clone(),
            offline: self.handle.as_ref().is_some_and(SessionHandle::is_local),
        }
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// Stores the handle and arms the countdown; the caller starts the clock.
    pub fn activate(&mut self, handle: SessionHandle, remaining_seconds: u64) {
        self.handle = Some(handle);
        self.remaining_seconds = remaining_seconds;
        self.phase = Phase::Active;
    }

    /// Drops everything about the current session and returns to Idle.
    pub fn clear(&mut self) {
        self.clock.stop();
        if let Some(handle) = self.auto_acknowledge.take() {
            handle.abort();
        }
        self.phase = Phase::Idle;
        self.config = None;
        self.handle = None;
        self.remaining_seconds = 0;
        self.error = None;
        self.epoch = self.epoch.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_trims_and_validates_task() {
        let config = SessionConfig::new("  Write report  ", 45).expect("valid");
        assert_eq!(config.task(), "Write report");
        assert_eq!(config.duration(), FocusDuration::Medium);

        assert_eq!(
            SessionConfig::new("   ", 25),
            Err(ValidationError::EmptyTask)
        );
        assert_eq!(
            SessionConfig::new(&"x".repeat(61), 25),
            Err(ValidationError::TaskTooLong {
                max: 60,
                actual: 61
            })
        );
        assert!(SessionConfig::new(&"x".repeat(60), 25).is_ok());
    }

    #[test]
    fn only_offered_durations_are_accepted() {
        for duration in FocusDuration::ALL {
            assert_eq!(FocusDuration::try_from(duration.minutes()), Ok(duration));
        }
        assert_eq!(
            SessionConfig::new("Read", 30),
            Err(ValidationError::InvalidDuration(30))
        );
        assert_eq!(FocusDuration::Long.seconds(), 3600);
    }

    #[test]
    fn local_handles_are_marked() {
        let config = SessionConfig::new("Offline work", 25).unwrap();
        let handle = SessionHandle::local(&config);
        assert!(handle.id.starts_with(LOCAL_ID_PREFIX));
        assert!(handle.is_local());
        assert!(!SessionHandle::server("srv-1".into(), "t".into(), 25).is_local());
    }

    #[test]
    fn clear_resets_everything_and_bumps_epoch() {
        let mut state = MachineState::default();
        state.config = SessionConfig::new("Task", 25).ok();
        state.error = Some("boom".into());
        state.activate(SessionHandle::server("srv-1".into(), "Task".into(), 25), 1500);
        let epoch = state.epoch;

        state.clear();

        assert_eq!(state.phase, Phase::Idle);
        assert!(state.config.is_none());
        assert!(state.handle.is_none());
        assert!(state.error.is_none());
        assert!(!state.is_current(epoch));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.session_id, None);
        assert_eq!(snapshot.task, None);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let mut state = MachineState::default();
        state.activate(SessionHandle::server("srv-1".into(), "Task".into(), 25), 1500);
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["phase"], "active");
        assert_eq!(json["remainingSeconds"], 1500);
        assert_eq!(json["sessionId"], "srv-1");
        assert_eq!(json["offline"], false);
    }
}
