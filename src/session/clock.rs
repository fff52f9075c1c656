use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Cancellable countdown that ticks once per interval while armed.
///
/// Each tick decrements the remaining seconds. A non-zero value is handed to
/// `on_tick`; reaching zero calls `on_expire` once and the ticker exits on its
/// own. Dropping the clock stops it.
#[derive(Debug)]
pub struct SessionClock {
    tick_interval: Duration,
    cancel: Option<CancellationToken>,
    ticker: Option<JoinHandle<()>>,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL)
    }
}

impl SessionClock {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            cancel: None,
            ticker: None,
        }
    }

    /// Starts a countdown from `initial_seconds`, replacing any running one.
    /// Must be called from within a tokio runtime.
    pub fn start<T, E>(&mut self, initial_seconds: u64, mut on_tick: T, on_expire: E)
    where
        T: FnMut(u64) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        self.stop();

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let period = self.tick_interval;

        let handle = tokio::spawn(async move {
            // First tick lands one full period after start.
            let mut interval = time::interval_at(Instant::now() + period, period);
            let mut remaining = initial_seconds;
            let mut on_expire = Some(on_expire);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {}
                }

                remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    if let Some(expire) = on_expire.take() {
                        expire();
                    }
                    break;
                }
                on_tick(remaining);
            }
        });

        self.cancel = Some(token);
        self.ticker = Some(handle);
    }

    /// Idempotent. No callback starts after this returns.
    pub fn stop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        self.stop();
    }
}
