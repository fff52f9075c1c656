use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Utc;
use serde::Serialize;
use tokio::{sync::broadcast, time};

use crate::{
    gateway::{EndStatus, GatewayError, SessionGateway, SessionRecord},
    log_debug, log_error, log_info, log_warn,
    settings::SessionSettings,
};

use super::{
    clock::SessionClock,
    error::{SessionError, SessionResult, ValidationError},
    state::{MachineState, Phase, SessionConfig, SessionHandle, SessionSnapshot},
};

const ENABLE_LOGS: bool = true;
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum SessionEvent {
    StateChanged(SessionSnapshot),
    #[serde(rename_all = "camelCase")]
    Completed { session_id: String },
    #[serde(rename_all = "camelCase")]
    Ended { session_id: String },
}

struct Shared {
    state: Mutex<MachineState>,
    gateway: Arc<dyn SessionGateway>,
    settings: SessionSettings,
    events: broadcast::Sender<SessionEvent>,
}

/// Drives one focus session at a time: setup, the server-confirmed start, the
/// countdown, and the end call.
///
/// Cloning yields another handle onto the same session. When the last handle
/// is dropped the countdown stops and late gateway results are discarded.
#[derive(Clone)]
pub struct FocusSessionMachine {
    shared: Arc<Shared>,
}

impl FocusSessionMachine {
    pub fn new(gateway: Arc<dyn SessionGateway>, settings: SessionSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = MachineState {
            clock: SessionClock::new(settings.tick_interval()),
            ..MachineState::default()
        };

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                gateway,
                settings,
                events,
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        lock(&self.shared).snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    /// Opens the setup form.
    pub fn request_start(&self) -> SessionResult<SessionSnapshot> {
        let snapshot = {
            let mut state = lock(&self.shared);
            match state.phase.clone() {
                Phase::Idle | Phase::Error(_) => {
                    state.config = None;
                    state.error = None;
                    state.phase = Phase::Setup;
                }
                Phase::Setup => return Ok(state.snapshot()),
                phase => return Err(invalid(&phase, "open session setup")),
            }
            state.snapshot()
        };
        publish(&self.shared, SessionEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    /// Asks the server for a session and arms the countdown once it confirms.
    ///
    /// Input is validated before anything goes over the network. A second call
    /// while the first is in flight is a no-op.
    pub async fn begin_session(
        &self,
        task: &str,
        duration_minutes: u32,
    ) -> SessionResult<SessionSnapshot> {
        let (config, epoch, snapshot) = {
            let mut state = lock(&self.shared);
            match state.phase.clone() {
                Phase::Setup => {}
                Phase::Starting => {
                    log_debug!("Ignoring duplicate start while a start is in flight");
                    return Ok(state.snapshot());
                }
                phase => return Err(invalid(&phase, "begin a session")),
            }

            match SessionConfig::new(task, duration_minutes) {
                Ok(config) => {
                    state.config = Some(config.clone());
                    state.error = None;
                    state.phase = Phase::Starting;
                    (config, state.epoch, state.snapshot())
                }
                Err(err) => {
                    state.error = Some(err.to_string());
                    let snapshot = state.snapshot();
                    drop(state);
                    publish(&self.shared, SessionEvent::StateChanged(snapshot));
                    return Err(err.into());
                }
            }
        };
        publish(&self.shared, SessionEvent::StateChanged(snapshot));

        log_info!(
            "Starting session '{}' ({} min)",
            config.task(),
            config.duration().minutes()
        );

        // The start runs on its own task so the outcome is applied even if the
        // caller stops waiting.
        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            let result = shared
                .gateway
                .start_session(config.task(), config.duration().minutes())
                .await;
            apply_start_result(&shared, epoch, &config, result)
        });

        task.await.unwrap_or_else(|err| {
            log_error!("Session start task failed: {err}");
            Err(SessionError::Superseded)
        })
    }

    /// Leaves setup without starting anything.
    pub fn cancel(&self) -> SessionResult<SessionSnapshot> {
        let snapshot = {
            let mut state = lock(&self.shared);
            match state.phase.clone() {
                Phase::Setup | Phase::Error(_) => state.clear(),
                phase => return Err(invalid(&phase, "cancel setup")),
            }
            state.snapshot()
        };
        publish(&self.shared, SessionEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    /// Abandons the running session.
    ///
    /// The countdown is stopped before the server is told. A failed end call is
    /// logged and the machine still returns to Idle.
    pub async fn request_end(&self) -> SessionResult<SessionSnapshot> {
        let (handle, epoch, snapshot) = {
            let mut state = lock(&self.shared);
            match state.phase.clone() {
                Phase::Active => {}
                Phase::Ending => {
                    log_debug!("Ignoring duplicate end request");
                    return Ok(state.snapshot());
                }
                phase => return Err(invalid(&phase, "end the session")),
            }
            state.clock.stop();
            state.phase = Phase::Ending;
            (state.handle.clone(), state.epoch, state.snapshot())
        };
        publish(&self.shared, SessionEvent::StateChanged(snapshot));

        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            if let Some(handle) = &handle {
                if handle.is_local() {
                    log_info!("Discarding local-only session {}", handle.id);
                } else {
                    match shared
                        .gateway
                        .end_session(&handle.id, None, EndStatus::Aborted)
                        .await
                    {
                        Ok(_) => log_info!("Session {} aborted", handle.id),
                        Err(err) => log_warn!("Failed to abort session {}: {err}", handle.id),
                    }
                }
            }
            finish_ending(&shared, epoch, handle)
        });

        task.await.map_err(|err| {
            log_error!("Session end task failed: {err}");
            SessionError::Superseded
        })
    }

    /// Dismisses the completion screen before the automatic reset.
    pub fn acknowledge(&self) -> SessionResult<SessionSnapshot> {
        let snapshot = {
            let mut state = lock(&self.shared);
            match state.phase.clone() {
                Phase::Completed => state.clear(),
                Phase::Idle => return Ok(state.snapshot()),
                phase => return Err(invalid(&phase, "acknowledge completion")),
            }
            state.snapshot()
        };
        publish(&self.shared, SessionEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    /// Returns to Idle from any phase. Results of calls still in flight are
    /// ignored when they land.
    pub fn reset(&self) -> SessionSnapshot {
        let snapshot = {
            let mut state = lock(&self.shared);
            state.clear();
            state.snapshot()
        };
        publish(&self.shared, SessionEvent::StateChanged(snapshot.clone()));
        snapshot
    }

    /// Called when the owning view goes away.
    pub fn teardown(&self) {
        log_debug!("Tearing down session machine");
        self.reset();
    }

    /// Picks up a session the server still considers active, e.g. after an
    /// app restart, and arms the countdown with the time it has left.
    pub async fn resume(&self) -> SessionResult<SessionSnapshot> {
        let (epoch, snapshot) = {
            let mut state = lock(&self.shared);
            match state.phase.clone() {
                Phase::Idle => {}
                Phase::Starting => return Ok(state.snapshot()),
                phase => return Err(invalid(&phase, "resume a session")),
            }
            state.phase = Phase::Starting;
            (state.epoch, state.snapshot())
        };
        publish(&self.shared, SessionEvent::StateChanged(snapshot));

        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            let result = shared.gateway.current_session().await;
            apply_resume_result(&shared, epoch, result)
        });

        task.await.unwrap_or_else(|err| {
            log_error!("Session resume task failed: {err}");
            Err(SessionError::Superseded)
        })
    }

    /// Records a distraction against the running session.
    pub async fn log_distraction(&self, description: &str) -> SessionResult<()> {
        let id = {
            let state = lock(&self.shared);
            if state.phase != Phase::Active {
                return Err(invalid(&state.phase, "log a distraction"));
            }
            match &state.handle {
                Some(handle) if handle.is_local() => return Err(SessionError::Offline),
                Some(handle) => handle.id.clone(),
                None => return Err(invalid(&state.phase, "log a distraction")),
            }
        };

        let description = description.trim();
        if description.is_empty() {
            return Err(ValidationError::EmptyDistraction.into());
        }

        self.shared
            .gateway
            .add_distraction(&id, description)
            .await
            .map_err(|err| {
                log_warn!("Failed to log distraction for session {id}: {err}");
                SessionError::Gateway(err)
            })
    }
}

fn lock(shared: &Shared) -> MutexGuard<'_, MachineState> {
    match shared.state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn publish(shared: &Shared, event: SessionEvent) {
    // No subscribers is fine.
    let _ = shared.events.send(event);
}

fn invalid(phase: &Phase, action: &'static str) -> SessionError {
    SessionError::InvalidTransition {
        phase: phase.clone(),
        action,
    }
}

fn apply_start_result(
    shared: &Arc<Shared>,
    epoch: u64,
    config: &SessionConfig,
    result: Result<SessionRecord, GatewayError>,
) -> SessionResult<SessionSnapshot> {
    let result = result.and_then(|record| {
        if record.id.trim().is_empty() {
            Err(GatewayError::Rejected(
                "Server returned a session without an id".into(),
            ))
        } else {
            Ok(record)
        }
    });

    let mut state = lock(shared);
    if !state.is_current(epoch) || state.phase != Phase::Starting {
        match &result {
            Ok(record) => log_warn!(
                "Session {} confirmed after the machine was reset; ignoring",
                record.id
            ),
            Err(err) => log_debug!("Dropping stale start failure: {err}"),
        }
        return Err(SessionError::Superseded);
    }

    match result {
        Ok(record) => {
            log_info!("Session {} started", record.id);
            let handle = SessionHandle::server(
                record.id,
                config.task().to_string(),
                config.duration().minutes(),
            );
            arm(shared, &mut state, handle, config.duration().seconds());
            let snapshot = state.snapshot();
            drop(state);
            publish(shared, SessionEvent::StateChanged(snapshot.clone()));
            Ok(snapshot)
        }
        Err(err) if shared.settings.allow_offline_start => {
            let handle = SessionHandle::local(config);
            log_warn!(
                "Failed to start session on server ({err}); running offline as {}",
                handle.id
            );
            state.error = Some(err.user_message());
            arm(shared, &mut state, handle, config.duration().seconds());
            let snapshot = state.snapshot();
            drop(state);
            publish(shared, SessionEvent::StateChanged(snapshot.clone()));
            Ok(snapshot)
        }
        Err(err) => {
            log_error!("Failed to start session: {err}");
            state.phase = Phase::Setup;
            state.error = Some(err.user_message());
            let snapshot = state.snapshot();
            drop(state);
            publish(shared, SessionEvent::StateChanged(snapshot));
            Err(SessionError::StartFailed(err))
        }
    }
}

fn apply_resume_result(
    shared: &Arc<Shared>,
    epoch: u64,
    result: Result<Option<SessionRecord>, GatewayError>,
) -> SessionResult<SessionSnapshot> {
    let mut state = lock(shared);
    if !state.is_current(epoch) || state.phase != Phase::Starting {
        return Err(SessionError::Superseded);
    }

    let mut overdue = None;
    let outcome = match result {
        Ok(Some(record)) if record.is_active() && !record.id.trim().is_empty() => {
            let planned = u64::from(record.planned_duration) * 60;
            let elapsed = record
                .started_at
                .map(|started| (Utc::now() - started).num_seconds().max(0) as u64)
                .unwrap_or(0);
            let remaining = planned.saturating_sub(elapsed);
            log_info!(
                "Resuming session {} with {}s remaining",
                record.id,
                remaining
            );

            state.config = SessionConfig::new(&record.task, record.planned_duration).ok();
            let handle = SessionHandle::server(record.id, record.task, record.planned_duration);
            if remaining == 0 {
                // Already overdue: no countdown, straight to completion.
                state.activate(handle.clone(), 0);
                state.phase = Phase::Completing;
                overdue = Some(handle);
            } else {
                arm(shared, &mut state, handle, remaining);
            }
            Ok(())
        }
        Ok(_) => {
            log_debug!("No active session on server");
            state.phase = Phase::Idle;
            Ok(())
        }
        Err(err) => {
            log_warn!("Failed to look up active session: {err}");
            let message = err.to_string();
            state.error = Some(message.clone());
            state.phase = Phase::Error(message);
            Err(SessionError::Gateway(err))
        }
    };

    let snapshot = state.snapshot();
    drop(state);
    publish(shared, SessionEvent::StateChanged(snapshot.clone()));

    if let Some(handle) = overdue {
        complete_session(shared, epoch, handle);
        return outcome.map(|()| lock(shared).snapshot());
    }
    outcome.map(|()| snapshot)
}

/// Stores the handle and starts the countdown. Only reached once a handle
/// exists, so the clock never runs without one.
fn arm(shared: &Arc<Shared>, state: &mut MachineState, handle: SessionHandle, seconds: u64) {
    let epoch = state.epoch;
    state.activate(handle, seconds);

    let on_tick_ref = Arc::downgrade(shared);
    let on_expire_ref = on_tick_ref.clone();
    state.clock.start(
        seconds,
        move |remaining| {
            if let Some(shared) = on_tick_ref.upgrade() {
                on_tick(&shared, epoch, remaining);
            }
        },
        move || {
            if let Some(shared) = on_expire_ref.upgrade() {
                on_expire(&shared, epoch);
            }
        },
    );
}

fn on_tick(shared: &Shared, epoch: u64, remaining: u64) {
    let snapshot = {
        let mut state = lock(shared);
        if !state.is_current(epoch) || state.phase != Phase::Active {
            return;
        }
        state.remaining_seconds = remaining;
        state.snapshot()
    };
    publish(shared, SessionEvent::StateChanged(snapshot));
}

fn on_expire(shared: &Arc<Shared>, epoch: u64) {
    let (handle, snapshot) = {
        let mut state = lock(shared);
        if !state.is_current(epoch) || state.phase != Phase::Active {
            return;
        }
        state.remaining_seconds = 0;
        state.phase = Phase::Completing;
        (state.handle.clone(), state.snapshot())
    };
    publish(shared, SessionEvent::StateChanged(snapshot));

    if let Some(handle) = handle {
        complete_session(shared, epoch, handle);
    }
}

/// Runs from Completing: reports the completion without waiting for the
/// server, then moves to Completed and schedules the auto-reset.
fn complete_session(shared: &Arc<Shared>, epoch: u64, handle: SessionHandle) {
    // Fire-and-forget: the session is over locally whatever the server says.
    if handle.is_local() {
        log_info!("Local-only session {} completed; nothing to sync", handle.id);
    } else {
        let gateway = shared.gateway.clone();
        let reflection = shared.settings.completion_reflection.clone();
        let id = handle.id.clone();
        tokio::spawn(async move {
            match gateway
                .end_session(&id, Some(&reflection), EndStatus::Completed)
                .await
            {
                Ok(_) => log_info!("Session {id} completed"),
                Err(err) => log_warn!("Failed to record completion of session {id}: {err}"),
            }
        });
    }

    let snapshot = {
        let mut state = lock(shared);
        if !state.is_current(epoch) || state.phase != Phase::Completing {
            return;
        }
        state.phase = Phase::Completed;

        let delay = shared.settings.completion_reset_delay();
        let weak: Weak<Shared> = Arc::downgrade(shared);
        state.auto_acknowledge = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                finish_completed(&shared, epoch);
            }
        }));
        state.snapshot()
    };
    publish(shared, SessionEvent::StateChanged(snapshot));
    publish(
        shared,
        SessionEvent::Completed {
            session_id: handle.id,
        },
    );
}

fn finish_completed(shared: &Shared, epoch: u64) {
    let snapshot = {
        let mut state = lock(shared);
        if !state.is_current(epoch) || state.phase != Phase::Completed {
            return;
        }
        // Detach first so clear() doesn't abort the task running this.
        state.auto_acknowledge = None;
        state.clear();
        state.snapshot()
    };
    publish(shared, SessionEvent::StateChanged(snapshot));
}

fn finish_ending(shared: &Shared, epoch: u64, handle: Option<SessionHandle>) -> SessionSnapshot {
    let snapshot = {
        let mut state = lock(shared);
        if !state.is_current(epoch) || state.phase != Phase::Ending {
            return state.snapshot();
        }
        state.clear();
        state.snapshot()
    };
    publish(shared, SessionEvent::StateChanged(snapshot.clone()));
    if let Some(handle) = handle {
        publish(
            shared,
            SessionEvent::Ended {
                session_id: handle.id,
            },
        );
    }
    snapshot
}
