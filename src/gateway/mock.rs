//! Scripted in-process gateway for unit tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::{DataGateway, GatewayResult};
use crate::db::models::*;
use crate::error::SyncError;

pub struct MockGateway {
    roster: Mutex<RosterSnapshot>,
    /// Per-method forced failures for the roster queries
    roster_failures: Mutex<HashMap<&'static str, SyncError>>,
    /// Consumed front to back; `Ok(None)` once empty
    live: Mutex<VecDeque<GatewayResult<Option<LiveMatchState>>>>,
    live_delay: Mutex<Option<Duration>>,
    ongoing: Mutex<GatewayResult<Vec<OngoingSeries>>>,
    ongoing_delay: Mutex<Option<Duration>>,
    /// Consumed front to back; the last entry repeats
    series: Mutex<VecDeque<GatewayResult<SeriesState>>>,
    series_delay: Mutex<Option<Duration>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MockGateway {
    pub fn new() -> Self {
        MockGateway {
            roster: Mutex::new(sample_roster()),
            roster_failures: Mutex::new(HashMap::new()),
            live: Mutex::new(VecDeque::new()),
            live_delay: Mutex::new(None),
            ongoing: Mutex::new(Ok(vec![])),
            ongoing_delay: Mutex::new(None),
            series: Mutex::new(VecDeque::new()),
            series_delay: Mutex::new(None),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_roster(&self, roster: RosterSnapshot) {
        *self.roster.lock().unwrap() = roster;
    }

    pub fn fail(&self, method: &'static str, err: SyncError) {
        self.roster_failures.lock().unwrap().insert(method, err);
    }

    pub fn clear_failures(&self) {
        self.roster_failures.lock().unwrap().clear();
    }

    pub fn push_live(&self, result: GatewayResult<Option<LiveMatchState>>) {
        self.live.lock().unwrap().push_back(result);
    }

    pub fn set_live_delay(&self, delay: Duration) {
        *self.live_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_ongoing(&self, result: GatewayResult<Vec<OngoingSeries>>) {
        *self.ongoing.lock().unwrap() = result;
    }

    pub fn set_ongoing_delay(&self, delay: Duration) {
        *self.ongoing_delay.lock().unwrap() = Some(delay);
    }

    pub fn push_series(&self, result: GatewayResult<SeriesState>) {
        self.series.lock().unwrap().push_back(result);
    }

    pub fn set_series_delay(&self, delay: Duration) {
        *self.series_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn record(&self, method: &'static str) -> Option<SyncError> {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
        self.roster_failures.lock().unwrap().get(method).cloned()
    }
}

#[async_trait]
impl DataGateway for MockGateway {
    async fn fetch_organization(&self) -> GatewayResult<Organization> {
        match self.record("fetch_organization") {
            Some(e) => Err(e),
            None => Ok(self.roster.lock().unwrap().organization.clone()),
        }
    }

    async fn fetch_players(&self) -> GatewayResult<Vec<Player>> {
        match self.record("fetch_players") {
            Some(e) => Err(e),
            None => Ok(self.roster.lock().unwrap().players.clone()),
        }
    }

    async fn fetch_matches(&self, _limit: u32) -> GatewayResult<Vec<Match>> {
        match self.record("fetch_matches") {
            Some(e) => Err(e),
            None => Ok(self.roster.lock().unwrap().matches.clone()),
        }
    }

    async fn fetch_tournaments(&self, _limit: u32) -> GatewayResult<Vec<Tournament>> {
        match self.record("fetch_tournaments") {
            Some(e) => Err(e),
            None => Ok(self.roster.lock().unwrap().tournaments.clone()),
        }
    }

    async fn fetch_teams(&self, _limit: u32) -> GatewayResult<Vec<Team>> {
        match self.record("fetch_teams") {
            Some(e) => Err(e),
            None => Ok(self.roster.lock().unwrap().teams.clone()),
        }
    }

    async fn fetch_live_snapshot(&self, _game_id: &str) -> GatewayResult<Option<LiveMatchState>> {
        self.record("fetch_live_snapshot");
        let delay = *self.live_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.live.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn fetch_ongoing_games(&self) -> GatewayResult<Vec<OngoingSeries>> {
        self.record("fetch_ongoing_games");
        let delay = *self.ongoing_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.ongoing.lock().unwrap().clone()
    }

    async fn fetch_series_state(&self, _series_id: &str) -> GatewayResult<SeriesState> {
        self.record("fetch_series_state");
        let delay = *self.series_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut queue = self.series.lock().unwrap();
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        next.unwrap_or_else(|| Err(SyncError::Transport("no scripted series state".into())))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

pub fn player(id: &str, nickname: &str) -> Player {
    Player {
        id: id.into(),
        nickname: nickname.into(),
        full_name: None,
        team_id: Some("team-1".into()),
        role: None,
        stats: None,
    }
}

pub fn sample_roster() -> RosterSnapshot {
    RosterSnapshot {
        organization: Organization {
            id: "org-1".into(),
            name: "Northwind".into(),
            logo_url: None,
        },
        players: vec![player("p1", "vex"), player("p2", "kairo")],
        matches: vec![Match {
            id: "m1".into(),
            tournament_id: Some("t1".into()),
            tournament_name: Some("Spring Split".into()),
            opponent: "Red Harbor".into(),
            scheduled_at: Utc.with_ymd_and_hms(2024, 3, 2, 18, 0, 0).unwrap(),
            format: Some("bo3".into()),
            result: Some(MatchResult::Win),
            player_lines: vec![PlayerLine {
                player_id: "p1".into(),
                kills: 7,
                deaths: 2,
                assists: 5,
            }],
        }],
        tournaments: vec![Tournament {
            id: "t1".into(),
            name: "Spring Split".into(),
            start_date: None,
            end_date: None,
        }],
        teams: vec![Team {
            id: "team-1".into(),
            name: "Northwind".into(),
            logo_url: None,
        }],
    }
}

pub fn series_state(finished: bool) -> SeriesState {
    SeriesState {
        valid: true,
        updated_at: Utc::now(),
        format: "best-of-3".into(),
        started: true,
        finished,
        teams: vec![
            SeriesTeam {
                id: "team-1".into(),
                name: "Northwind".into(),
                score: if finished { 2 } else { 1 },
                won: finished,
            },
            SeriesTeam {
                id: "team-9".into(),
                name: "Red Harbor".into(),
                score: 0,
                won: false,
            },
        ],
        games: vec![],
    }
}

pub fn live_snapshot(game_id: &str, players: usize) -> LiveMatchState {
    LiveMatchState {
        id: game_id.into(),
        opponent: "Red Harbor".into(),
        is_active: true,
        game_time: 0,
        players: (0..players)
            .map(|i| LivePlayer {
                id: format!("p{}", i + 1),
                nickname: format!("player{}", i + 1),
                kills: 3,
                deaths: 1,
                assists: 2,
                gold: 4_500,
                level: 9,
            })
            .collect(),
        data_source: DataSource::Live,
    }
}

pub fn running_series(series_id: &str, game_id: &str, team_id: &str) -> OngoingSeries {
    OngoingSeries {
        id: series_id.into(),
        teams: vec![
            Team {
                id: team_id.into(),
                name: "Northwind".into(),
                logo_url: None,
            },
            Team {
                id: "team-9".into(),
                name: "Red Harbor".into(),
                logo_url: None,
            },
        ],
        live_data_available: true,
        games: vec![OngoingGame {
            id: game_id.into(),
            sequence_number: 1,
            started: true,
            finished: false,
        }],
    }
}
