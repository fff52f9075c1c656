//! The remote session API as seen by the session machine.
//!
//! The concrete REST client lives outside this crate; anything that can start,
//! end and look up sessions on the FocusBuddy backend implements
//! [`SessionGateway`].

#[cfg(test)]
pub(crate) mod stub;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal status reported when a session ends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndStatus {
    Completed,
    Aborted,
}

impl EndStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndStatus::Completed => "COMPLETED",
            EndStatus::Aborted => "ABORTED",
        }
    }
}

/// A session as returned by `startSession` and `getCurrent`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    #[serde(alias = "taskDescription")]
    pub task: String,
    /// Planned duration in minutes.
    pub planned_duration: u32,
    pub status: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Only `ACTIVE` sessions are live; `COMPLETED` and `ABANDONED` are closed.
    pub fn is_active(&self) -> bool {
        self.status == "ACTIVE"
    }
}

/// Result of `endSession`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndedSession {
    pub id: String,
    pub status: EndStatus,
    /// Minutes actually spent, as computed by the backend.
    #[serde(default)]
    pub actual_duration: Option<u32>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl GatewayError {
    /// Message suitable for showing next to the session form.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Network(_) => {
                "Failed to start session. Check network connection.".to_string()
            }
            GatewayError::Rejected(message) | GatewayError::Server { message, .. } => {
                message.clone()
            }
        }
    }
}

#[async_trait]
pub trait SessionGateway: Send + Sync {
    async fn start_session(
        &self,
        task: &str,
        duration_minutes: u32,
    ) -> Result<SessionRecord, GatewayError>;

    async fn end_session(
        &self,
        id: &str,
        reflection: Option<&str>,
        status: EndStatus,
    ) -> Result<EndedSession, GatewayError>;

    /// The caller's active session, if the backend has one.
    async fn current_session(&self) -> Result<Option<SessionRecord>, GatewayError>;

    async fn add_distraction(&self, id: &str, description: &str) -> Result<(), GatewayError>;
}
