pub mod clock;
pub mod error;
pub mod machine;
pub mod state;

pub use clock::SessionClock;
pub use error::{SessionError, SessionResult, ValidationError};
pub use machine::{FocusSessionMachine, SessionEvent};
pub use state::{
    FocusDuration, HandleOrigin, Phase, SessionConfig, SessionHandle, SessionSnapshot,
    LOCAL_ID_PREFIX, MAX_TASK_LEN,
};
