//! Series state polling.
//!
//! One session at a time: `start` cancels whatever was running, fetches
//! immediately and then on every interval. Outcomes per tick:
//!
//! | outcome            | state        | session          |
//! |--------------------|--------------|------------------|
//! | success            | replaced     | continues        |
//! | success, finished  | replaced     | stops (Finished) |
//! | permission denied  | kept         | stops (Denied)   |
//! | transport/protocol | kept (stale) | continues        |

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::db::models::SeriesState;
use crate::db::{Cache, CacheKey};
use crate::error::{require_id, SyncError};
use crate::gateway::DataGateway;
use crate::scheduler::{schedule, TaskHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    /// No series has been started
    Idle,
    Polling,
    /// Stopped on request
    Stopped,
    /// The series reported `finished`
    Finished,
    /// The remote refused access; not retried
    Denied,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SeriesEvent {
    Updated { series_id: String, finished: bool },
    Finished { series_id: String },
    Failed { series_id: String, error: SyncError },
    Stopped { series_id: String },
}

/// Everything the poller knows, as one serializable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesView {
    pub series_id: Option<String>,
    pub status: PollStatus,
    pub state: Option<SeriesState>,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<SyncError>,
    pub last_tick_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct SeriesPoller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    gateway: Arc<dyn DataGateway>,
    cache: Cache,
    interval: Duration,
    state: Mutex<PollerState>,
    events: broadcast::Sender<SeriesEvent>,
}

struct PollerState {
    series_id: Option<String>,
    series_state: Option<SeriesState>,
    last_update: Option<DateTime<Utc>>,
    last_error: Option<SyncError>,
    status: PollStatus,
    session: Option<TaskHandle>,
    /// Bumped on every start/stop; completions from an older generation are dropped
    generation: u64,
    last_tick_at: Option<DateTime<Utc>>,
}

impl SeriesPoller {
    pub fn new(gateway: Arc<dyn DataGateway>, cache: Cache, interval: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        SeriesPoller {
            inner: Arc::new(PollerInner {
                gateway,
                cache,
                interval,
                state: Mutex::new(PollerState {
                    series_id: None,
                    series_state: None,
                    last_update: None,
                    last_error: None,
                    status: PollStatus::Idle,
                    session: None,
                    generation: 0,
                    last_tick_at: None,
                }),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SeriesEvent> {
        self.inner.events.subscribe()
    }

    /// Begin polling `series_id`, replacing any running session.
    pub fn start(&self, series_id: &str) -> Result<(), SyncError> {
        let series_id = require_id("series_id", series_id)?;
        let mut st = self.inner.lock();

        if let Some(previous) = st.session.take() {
            previous.cancel();
        }
        st.generation += 1;
        let generation = st.generation;

        if st.series_id.as_deref() != Some(series_id.as_str()) {
            st.series_state = None;
            st.last_update = None;
        }
        st.series_id = Some(series_id.clone());
        st.last_error = None;
        st.status = PollStatus::Polling;
        self.inner.cache.set(CacheKey::SeriesTargetId, &series_id);

        let weak = Arc::downgrade(&self.inner);
        st.session = Some(schedule("series-poll", self.inner.interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.tick(generation).await;
                }
            }
        }));
        info!(
            "Polling series {} every {:?}",
            series_id, self.inner.interval
        );
        Ok(())
    }

    /// Restart polling the persisted target, if any. Returns the id resumed.
    pub fn resume(&self) -> Option<String> {
        let target: String = self.inner.cache.get(CacheKey::SeriesTargetId)?;
        match self.start(&target) {
            Ok(()) => Some(target),
            Err(e) => {
                warn!("Persisted series target ignored: {}", e);
                None
            }
        }
    }

    /// Cancel the running session. Idempotent.
    pub fn stop(&self) {
        let mut st = self.inner.lock();
        let Some(session) = st.session.take() else {
            return;
        };
        session.cancel();
        st.generation += 1;
        st.status = PollStatus::Stopped;
        let series_id = st.series_id.clone().unwrap_or_default();
        info!("Stopped polling series {}", series_id);
        self.inner.emit(SeriesEvent::Stopped { series_id });
    }

    /// Stop and forget the target and its state.
    pub fn reset(&self) {
        self.stop();
        let mut st = self.inner.lock();
        st.series_id = None;
        st.series_state = None;
        st.last_update = None;
        st.last_error = None;
        st.last_tick_at = None;
        st.status = PollStatus::Idle;
        self.inner.cache.clear(CacheKey::SeriesTargetId);
    }

    #[cfg(test)]
    pub fn status(&self) -> PollStatus {
        self.inner.lock().status
    }

    #[cfg(test)]
    pub fn state(&self) -> Option<SeriesState> {
        self.inner.lock().series_state.clone()
    }

    #[cfg(test)]
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_update
    }

    #[cfg(test)]
    pub fn last_error(&self) -> Option<SyncError> {
        self.inner.lock().last_error.clone()
    }

    #[cfg(test)]
    pub fn target(&self) -> Option<String> {
        self.inner.lock().series_id.clone()
    }

    pub fn view(&self) -> SeriesView {
        let st = self.inner.lock();
        SeriesView {
            series_id: st.series_id.clone(),
            status: st.status,
            state: st.series_state.clone(),
            last_update: st.last_update,
            last_error: st.last_error.clone(),
            last_tick_at: st.last_tick_at,
        }
    }
}

impl PollerInner {
    fn lock(&self) -> MutexGuard<'_, PollerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SeriesEvent) {
        let _ = self.events.send(event);
    }

    async fn tick(&self, generation: u64) {
        let series_id = {
            let mut st = self.lock();
            if st.generation != generation {
                return;
            }
            st.last_tick_at = Some(Utc::now());
            match st.series_id.clone() {
                Some(id) => id,
                None => return,
            }
        };

        let result = self.gateway.fetch_series_state(&series_id).await;

        let mut st = self.lock();
        if st.generation != generation {
            debug!("Discarding stale series state for {}", series_id);
            return;
        }

        match result {
            Ok(state) => {
                let finished = state.finished;
                st.series_state = Some(state);
                st.last_update = Some(Utc::now());
                st.last_error = None;
                self.emit(SeriesEvent::Updated {
                    series_id: series_id.clone(),
                    finished,
                });
                if finished {
                    self.end_session(&mut st, PollStatus::Finished);
                    info!("Series {} finished, polling stopped", series_id);
                    self.emit(SeriesEvent::Finished { series_id });
                }
            }
            Err(error @ SyncError::PermissionDenied(_)) => {
                warn!(
                    "Access to series {} denied, polling stopped: {}",
                    series_id, error
                );
                st.last_error = Some(error.clone());
                self.end_session(&mut st, PollStatus::Denied);
                self.emit(SeriesEvent::Failed { series_id, error });
            }
            Err(error) => {
                warn!("Series {} poll failed, keeping last state: {}", series_id, error);
                st.last_error = Some(error.clone());
                self.emit(SeriesEvent::Failed { series_id, error });
            }
        }
    }

    // Runs inside the session's own task: cancelling it takes effect once
    // this tick returns.
    fn end_session(&self, st: &mut PollerState, status: PollStatus) {
        st.generation += 1;
        st.status = status;
        if let Some(session) = st.session.take() {
            session.cancel();
        }
    }
}
