use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use super::{EndStatus, EndedSession, GatewayError, SessionGateway, SessionRecord};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GatewayCall {
    Start { task: String, duration_minutes: u32 },
    End {
        id: String,
        reflection: Option<String>,
        status: EndStatus,
    },
    Current,
    Distraction { id: String, description: String },
}

#[derive(Default)]
struct StubInner {
    calls: Vec<GatewayCall>,
    start_error: Option<GatewayError>,
    end_error: Option<GatewayError>,
    current: Option<Result<Option<SessionRecord>, GatewayError>>,
    next_id: Option<String>,
    latency: Duration,
}

/// Scriptable in-memory gateway that records every call it receives.
#[derive(Clone, Default)]
pub(crate) struct StubGateway {
    inner: Arc<Mutex<StubInner>>,
}

impl StubGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_id(self, id: &str) -> Self {
        self.inner.lock().unwrap().next_id = Some(id.to_string());
        self
    }

    pub(crate) fn failing_start(self, err: GatewayError) -> Self {
        self.inner.lock().unwrap().start_error = Some(err);
        self
    }

    pub(crate) fn failing_end(self, err: GatewayError) -> Self {
        self.inner.lock().unwrap().end_error = Some(err);
        self
    }

    pub(crate) fn with_current(self, current: Result<Option<SessionRecord>, GatewayError>) -> Self {
        self.inner.lock().unwrap().current = Some(current);
        self
    }

    /// Every call sleeps this long before answering.
    pub(crate) fn with_latency(self, latency: Duration) -> Self {
        self.inner.lock().unwrap().latency = latency;
        self
    }

    pub(crate) fn calls(&self) -> Vec<GatewayCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub(crate) fn start_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, GatewayCall::Start { .. }))
            .count()
    }

    pub(crate) fn end_calls(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, GatewayCall::End { .. }))
            .collect()
    }

    fn record(&self, call: GatewayCall) -> Duration {
        let mut guard = self.inner.lock().unwrap();
        guard.calls.push(call);
        guard.latency
    }

    async fn wait(latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SessionGateway for StubGateway {
    async fn start_session(
        &self,
        task: &str,
        duration_minutes: u32,
    ) -> Result<SessionRecord, GatewayError> {
        let latency = self.record(GatewayCall::Start {
            task: task.to_string(),
            duration_minutes,
        });
        Self::wait(latency).await;

        let guard = self.inner.lock().unwrap();
        if let Some(err) = guard.start_error.clone() {
            return Err(err);
        }
        Ok(SessionRecord {
            id: guard.next_id.clone().unwrap_or_else(|| "srv-1".to_string()),
            task: task.to_string(),
            planned_duration: duration_minutes,
            status: "ACTIVE".to_string(),
            started_at: None,
        })
    }

    async fn end_session(
        &self,
        id: &str,
        reflection: Option<&str>,
        status: EndStatus,
    ) -> Result<EndedSession, GatewayError> {
        let latency = self.record(GatewayCall::End {
            id: id.to_string(),
            reflection: reflection.map(str::to_string),
            status,
        });
        Self::wait(latency).await;

        if let Some(err) = self.inner.lock().unwrap().end_error.clone() {
            return Err(err);
        }
        Ok(EndedSession {
            id: id.to_string(),
            status,
            actual_duration: None,
        })
    }

    async fn current_session(&self) -> Result<Option<SessionRecord>, GatewayError> {
        let latency = self.record(GatewayCall::Current);
        Self::wait(latency).await;
        self.inner.lock().unwrap().current.clone().unwrap_or(Ok(None))
    }

    async fn add_distraction(&self, id: &str, description: &str) -> Result<(), GatewayError> {
        let latency = self.record(GatewayCall::Distraction {
            id: id.to_string(),
            description: description.to_string(),
        });
        Self::wait(latency).await;
        Ok(())
    }
}
