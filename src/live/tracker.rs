//! Tracks the match currently being watched.
//!
//! ```text
//!            activate()              set_live_target(id)
//!  Inactive ───────────▶ ActiveSimulated ───────────────▶ ActiveLive(id)
//!     ▲                        │                               │
//!     └──── deactivate() ──────┴───────────────────────────────┘
//! ```
//!
//! While active, a fixed-period tick either merges a fresh live snapshot
//! (at most once per live poll interval) or advances the local simulator.
//! A failed or empty live fetch never changes the mode; that tick is
//! simulated instead and a [`TrackerEvent::LiveFallback`] is emitted.
//!
//! A separate, slower auto-detect loop binds the first running game of the
//! tracked team when nothing is bound yet.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::simulation;
use crate::db::models::{DataSource, LiveMatchState, OngoingGame, OngoingSeries, RosterSnapshot};
use crate::db::{Cache, CacheKey};
use crate::error::{require_id, SyncError};
use crate::gateway::DataGateway;
use crate::scheduler::{schedule, TaskHandle};

/// Game-clock seconds credited for each merged live snapshot
const LIVE_SNAPSHOT_SECONDS: u32 = 5;

const SIMULATED_MATCH_ID: &str = "simulated";
const UNKNOWN_OPPONENT: &str = "TBD";

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub tick_interval: Duration,
    /// Minimum spacing between live snapshot fetches
    pub live_poll_interval: Duration,
    pub auto_detect_interval: Duration,
    /// Team whose games auto-detect looks for
    pub team_id: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            tick_interval: Duration::from_millis(1000),
            live_poll_interval: Duration::from_millis(5000),
            auto_detect_interval: Duration::from_millis(30_000),
            team_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerMode {
    Inactive,
    ActiveSimulated,
    ActiveLive(String),
}

impl TrackerMode {
    pub fn label(&self) -> &'static str {
        match self {
            TrackerMode::Inactive => "inactive",
            TrackerMode::ActiveSimulated => "active_simulated",
            TrackerMode::ActiveLive(_) => "active_live",
        }
    }

    pub fn game_id(&self) -> Option<&str> {
        match self {
            TrackerMode::ActiveLive(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    Activated,
    Deactivated,
    Reset,
    LiveBound {
        game_id: String,
        opponent: String,
    },
    MatchFound {
        series_id: String,
        game_id: String,
        opponent: String,
    },
    /// Live data was unavailable; the tick was simulated instead
    LiveFallback {
        game_id: String,
        reason: String,
    },
    /// Ongoing games could not be listed; the next detection pass retries
    DetectFailed {
        error: SyncError,
    },
}

#[derive(Clone)]
pub struct LiveMatchTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    gateway: Arc<dyn DataGateway>,
    cache: Cache,
    config: TrackerConfig,
    state: Mutex<TrackerState>,
    events: broadcast::Sender<TrackerEvent>,
}

struct TrackerState {
    mode: TrackerMode,
    current: LiveMatchState,
    last_live_fetch: Option<Instant>,
    tick_loop: Option<TaskHandle>,
    detect_loop: Option<TaskHandle>,
    auto_detect: bool,
    /// Bumped whenever the tick loop starts or stops; in-flight ticks from an
    /// older session are discarded.
    session: u64,
}

impl LiveMatchTracker {
    pub fn new(gateway: Arc<dyn DataGateway>, cache: Cache, config: TrackerConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        LiveMatchTracker {
            inner: Arc::new(TrackerInner {
                gateway,
                cache,
                config,
                state: Mutex::new(TrackerState {
                    mode: TrackerMode::Inactive,
                    current: LiveMatchState::default(),
                    last_live_fetch: None,
                    tick_loop: None,
                    detect_loop: None,
                    auto_detect: false,
                    session: 0,
                }),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.inner.events.subscribe()
    }

    /// Process-start initialisation: publish the default inactive state and
    /// re-arm auto-detect if it was left enabled.
    pub fn restore(&self) {
        {
            let st = self.inner.lock();
            self.inner.persist(&st.current);
        }
        self.inner.cache.clear(CacheKey::LiveGameId);
        if self.inner.cache.get::<bool>(CacheKey::LiveAutoDetect) == Some(true) {
            info!("Restoring auto-detect from previous run");
            self.set_auto_detect(true);
        }
    }

    pub fn snapshot(&self) -> (TrackerMode, LiveMatchState) {
        let st = self.inner.lock();
        (st.mode.clone(), st.current.clone())
    }

    #[cfg(test)]
    pub fn mode(&self) -> TrackerMode {
        self.inner.lock().mode.clone()
    }

    /// Inactive → ActiveSimulated. No-op when already active.
    pub fn activate(&self) {
        let mut st = self.inner.lock();
        if st.mode != TrackerMode::Inactive {
            debug!("Tracker already active ({:?})", st.mode);
            return;
        }
        let roster = self.inner.roster_players();
        st.current = simulation::initial_state(SIMULATED_MATCH_ID, UNKNOWN_OPPONENT, &roster);
        st.mode = TrackerMode::ActiveSimulated;
        self.inner.start_tick_loop(&mut st);
        self.inner.persist(&st.current);
        info!("Live tracker activated (simulated)");
        self.inner.emit(TrackerEvent::Activated);
    }

    /// Bind the tracker to a live game from any state.
    pub fn set_live_target(&self, game_id: &str, opponent: &str) -> Result<(), SyncError> {
        let game_id = require_id("game_id", game_id)?;
        let mut st = self.inner.lock();
        self.inner.bind(&mut st, game_id, opponent.trim());
        Ok(())
    }

    /// Any state → Inactive. Cancels the tick loop.
    pub fn deactivate(&self) {
        let mut st = self.inner.lock();
        self.inner.stop_tick_loop(&mut st);
        if st.mode == TrackerMode::Inactive {
            return;
        }
        st.mode = TrackerMode::Inactive;
        st.current.is_active = false;
        self.inner.persist(&st.current);
        self.inner.cache.clear(CacheKey::LiveGameId);
        info!("Live tracker deactivated");
        self.inner.emit(TrackerEvent::Deactivated);
    }

    /// Deactivate and return the match state to its default value.
    pub fn reset(&self) {
        self.deactivate();
        let mut st = self.inner.lock();
        st.current = LiveMatchState::default();
        st.last_live_fetch = None;
        self.inner.persist(&st.current);
        self.inner.cache.clear(CacheKey::LiveGameId);
        self.inner.emit(TrackerEvent::Reset);
    }

    pub fn auto_detect_enabled(&self) -> bool {
        self.inner.lock().auto_detect
    }

    /// Persist the auto-detect flag and start or stop the detection loop.
    pub fn set_auto_detect(&self, enabled: bool) {
        self.inner.cache.set(CacheKey::LiveAutoDetect, &enabled);
        let mut st = self.inner.lock();
        st.auto_detect = enabled;
        if !enabled {
            if let Some(handle) = st.detect_loop.take() {
                handle.cancel();
                info!("Auto-detect disabled");
            }
            return;
        }
        if st.detect_loop.is_some() {
            return;
        }
        if self.inner.config.team_id.is_none() {
            warn!("Auto-detect enabled without a team id; nothing will be detected");
        }
        let weak = Arc::downgrade(&self.inner);
        st.detect_loop = Some(schedule(
            "auto-detect",
            self.inner.config.auto_detect_interval,
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        // Failures are logged and emitted by detect_once.
                        let _ = inner.detect_once().await;
                    }
                }
            },
        ));
        info!(
            "Auto-detect enabled (every {:?})",
            self.inner.config.auto_detect_interval
        );
    }

    /// Run one detection pass. Returns whether a new game was bound.
    pub async fn detect_once(&self) -> Result<bool, SyncError> {
        self.inner.detect_once().await
    }
}

impl TrackerInner {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: TrackerEvent) {
        let _ = self.events.send(event);
    }

    fn persist(&self, state: &LiveMatchState) {
        self.cache.set(CacheKey::LiveMatchState, state);
    }

    fn roster_players(&self) -> Vec<crate::db::models::Player> {
        self.cache
            .get::<RosterSnapshot>(CacheKey::RosterSnapshot)
            .map(|r| r.players)
            .unwrap_or_default()
    }

    fn start_tick_loop(self: &Arc<Self>, st: &mut TrackerState) {
        if st.tick_loop.is_some() {
            return;
        }
        st.session += 1;
        let session = st.session;
        let weak: Weak<TrackerInner> = Arc::downgrade(self);
        st.tick_loop = Some(schedule("live-tick", self.config.tick_interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.tick(session).await;
                }
            }
        }));
    }

    fn stop_tick_loop(&self, st: &mut TrackerState) {
        if let Some(handle) = st.tick_loop.take() {
            handle.cancel();
            st.session += 1;
        }
    }

    /// Switch to ActiveLive(game_id). Keeps the current players and clock
    /// when already active so the view does not jump.
    fn bind(self: &Arc<Self>, st: &mut TrackerState, game_id: String, opponent: &str) {
        if st.mode == TrackerMode::ActiveLive(game_id.clone()) {
            debug!("Already bound to {}", game_id);
            return;
        }
        let opponent = if opponent.is_empty() {
            UNKNOWN_OPPONENT
        } else {
            opponent
        };

        let mut next = if st.mode == TrackerMode::Inactive {
            simulation::initial_state(&game_id, opponent, &self.roster_players())
        } else {
            st.current.clone()
        };
        next.id = game_id.clone();
        next.opponent = opponent.to_string();
        next.is_active = true;
        next.data_source = DataSource::Live;

        st.current = next;
        st.mode = TrackerMode::ActiveLive(game_id.clone());
        st.last_live_fetch = None;
        self.start_tick_loop(st);
        self.persist(&st.current);
        self.cache.set(CacheKey::LiveGameId, &game_id);

        info!("Live tracker bound to game {} vs {}", game_id, opponent);
        self.emit(TrackerEvent::LiveBound {
            game_id,
            opponent: opponent.to_string(),
        });
    }

    async fn tick(&self, session: u64) {
        let live_target = {
            let st = self.lock();
            if st.session != session || st.mode == TrackerMode::Inactive {
                return;
            }
            match &st.mode {
                TrackerMode::ActiveLive(id)
                    if st
                        .last_live_fetch
                        .map_or(true, |t| t.elapsed() >= self.config.live_poll_interval) =>
                {
                    Some(id.clone())
                }
                _ => None,
            }
        };

        let Some(game_id) = live_target else {
            let mut st = self.lock();
            if st.session == session && st.mode != TrackerMode::Inactive {
                self.simulate(&mut st);
            }
            return;
        };

        let result = self.gateway.fetch_live_snapshot(&game_id).await;

        let mut st = self.lock();
        if st.session != session || st.mode != TrackerMode::ActiveLive(game_id.clone()) {
            debug!("Discarding stale live snapshot for {}", game_id);
            return;
        }

        let reason = match result {
            Ok(Some(snapshot)) if !snapshot.players.is_empty() => {
                st.current = merge_live(&st.current, snapshot);
                st.last_live_fetch = Some(Instant::now());
                self.persist(&st.current);
                return;
            }
            Ok(_) => "live feed has no player data yet".to_string(),
            Err(e) => e.to_string(),
        };

        warn!("Live update for {} unavailable, simulating: {}", game_id, reason);
        self.simulate(&mut st);
        self.emit(TrackerEvent::LiveFallback { game_id, reason });
    }

    fn simulate(&self, st: &mut TrackerState) {
        st.current = simulation::step(&st.current);
        self.persist(&st.current);
    }

    async fn detect_once(self: &Arc<Self>) -> Result<bool, SyncError> {
        if !self.lock().auto_detect {
            return Ok(false);
        }
        let Some(team_id) = self.config.team_id.as_deref() else {
            return Ok(false);
        };

        let series = match self.gateway.fetch_ongoing_games().await {
            Ok(series) => series,
            Err(e) => {
                warn!("Auto-detect skipped, ongoing games unavailable: {}", e);
                self.emit(TrackerEvent::DetectFailed { error: e.clone() });
                return Err(e);
            }
        };
        let Some((found, game)) = find_running_game(&series, team_id) else {
            debug!("Auto-detect: no running game for team {}", team_id);
            return Ok(false);
        };
        let opponent = found
            .teams
            .iter()
            .find(|t| t.id != team_id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| UNKNOWN_OPPONENT.to_string());

        let mut st = self.lock();
        if !st.auto_detect {
            return Ok(false);
        }
        if let TrackerMode::ActiveLive(bound) = &st.mode {
            if bound != &game.id {
                debug!(
                    "Auto-detect found {} but {} is already bound",
                    game.id, bound
                );
            }
            return Ok(false);
        }

        info!(
            "Auto-detect: series {} game {} vs {} is live",
            found.id, game.id, opponent
        );
        self.bind(&mut st, game.id.clone(), &opponent);
        self.emit(TrackerEvent::MatchFound {
            series_id: found.id.clone(),
            game_id: game.id.clone(),
            opponent,
        });
        Ok(true)
    }
}

/// Whole-value replacement of the tracked state by a live snapshot.
fn merge_live(current: &LiveMatchState, snapshot: LiveMatchState) -> LiveMatchState {
    LiveMatchState {
        id: current.id.clone(),
        opponent: if snapshot.opponent.is_empty() {
            current.opponent.clone()
        } else {
            snapshot.opponent
        },
        is_active: true,
        game_time: current.game_time.saturating_add(LIVE_SNAPSHOT_SECONDS),
        players: snapshot.players,
        data_source: DataSource::Live,
    }
}

/// Latest running game of a stats-enabled series the team plays in.
fn find_running_game<'a>(
    series: &'a [OngoingSeries],
    team_id: &str,
) -> Option<(&'a OngoingSeries, &'a OngoingGame)> {
    series
        .iter()
        .filter(|s| s.live_data_available && s.teams.iter().any(|t| t.id == team_id))
        .find_map(|s| {
            s.games
                .iter()
                .filter(|g| g.is_running())
                .max_by_key(|g| g.sequence_number)
                .map(|g| (s, g))
        })
}
