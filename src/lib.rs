//! Client-side focus session core for FocusBuddy.
//!
//! [`FocusSessionMachine`] owns one session's lifecycle: the setup form, the
//! server-confirmed start, the per-second countdown and the end call. The
//! backend is reached through the [`SessionGateway`] trait.

pub mod gateway;
pub mod session;
pub mod settings;
mod utils;

pub use gateway::{EndStatus, EndedSession, GatewayError, SessionGateway, SessionRecord};
pub use session::{
    FocusDuration, FocusSessionMachine, Phase, SessionClock, SessionConfig, SessionError,
    SessionEvent, SessionHandle, SessionSnapshot, ValidationError,
};
pub use settings::{SessionSettings, SettingsStore};
pub use utils::logging::init_logging;
