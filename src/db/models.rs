use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The organization whose roster is being tracked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub logo_url: Option<String>,
}

/// A rostered player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub nickname: String,
    pub full_name: Option<String>,
    pub team_id: Option<String>,
    /// e.g. "mid", "support", "awper"
    pub role: Option<String>,
    /// Derived from match history during a roster sync, never fetched
    pub stats: Option<PlayerStats>,
}

/// Aggregate statistics derived from a player's match lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub matches_played: u32,
    pub wins: u32,
    /// wins / matches_played (0.0–1.0)
    pub win_rate: f64,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    /// (kills + assists) / max(deaths, 1)
    pub kda: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchResult {
    Win,
    Loss,
    Draw,
}

/// A past or scheduled match of the organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub tournament_id: Option<String>,
    pub tournament_name: Option<String>,
    pub opponent: String,
    pub scheduled_at: DateTime<Utc>,
    /// e.g. "bo1", "bo3"
    pub format: Option<String>,
    /// None while the match has not been played
    pub result: Option<MatchResult>,
    pub player_lines: Vec<PlayerLine>,
}

/// One player's box score in a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLine {
    pub player_id: String,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: String,
    pub name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub logo_url: Option<String>,
}

/// Everything a roster sync fetches, committed to the cache as one value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub organization: Organization,
    pub players: Vec<Player>,
    pub matches: Vec<Match>,
    pub tournaments: Vec<Tournament>,
    pub teams: Vec<Team>,
}

// ── Live match ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Simulated,
}

/// Per-player line inside a live match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePlayer {
    pub id: String,
    pub nickname: String,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub gold: u32,
    pub level: u32,
}

/// State of the match currently being watched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMatchState {
    pub id: String,
    pub opponent: String,
    pub is_active: bool,
    /// Seconds of in-game clock
    pub game_time: u32,
    pub players: Vec<LivePlayer>,
    pub data_source: DataSource,
}

impl Default for LiveMatchState {
    fn default() -> Self {
        LiveMatchState {
            id: String::new(),
            opponent: String::new(),
            is_active: false,
            game_time: 0,
            players: Vec::new(),
            data_source: DataSource::Simulated,
        }
    }
}

/// A series the remote reports as scheduled or running, with its games
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OngoingSeries {
    pub id: String,
    pub teams: Vec<Team>,
    /// Whether the provider publishes in-game stats for this series
    pub live_data_available: bool,
    pub games: Vec<OngoingGame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OngoingGame {
    pub id: String,
    pub sequence_number: u32,
    pub started: bool,
    pub finished: bool,
}

impl OngoingGame {
    pub fn is_running(&self) -> bool {
        self.started && !self.finished
    }
}

// ── Series state ──────────────────────────────────────────────────────────────

/// Full state of a series as reported by the series-state endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesState {
    pub valid: bool,
    pub updated_at: DateTime<Utc>,
    /// e.g. "best-of-3"
    pub format: String,
    pub started: bool,
    pub finished: bool,
    pub teams: Vec<SeriesTeam>,
    pub games: Vec<SeriesGame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesTeam {
    pub id: String,
    pub name: String,
    pub score: u32,
    pub won: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesGame {
    pub id: String,
    pub sequence_number: u32,
    pub started: bool,
    pub finished: bool,
    pub teams: Vec<SeriesTeam>,
}
