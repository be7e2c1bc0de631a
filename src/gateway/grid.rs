//! GraphQL client for GRID-style esports data APIs.
//!
//! Two endpoints are involved:
//! - **central data**: organizations, players, teams, tournaments and the
//!   series schedule (used as match history and for live-series discovery)
//! - **series state**: per-series and per-game state while a match runs
//!
//! Every response is classified into one [`SyncError`] category so callers
//! can tell a dropped connection from a revoked key or a schema change.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::join_all;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{DataGateway, GatewayResult};
use crate::db::models::{
    DataSource, LiveMatchState, LivePlayer, Match, MatchResult, OngoingGame, OngoingSeries,
    Organization, Player, PlayerLine, SeriesGame, SeriesState, SeriesTeam, Team, Tournament,
};
use crate::error::{require_id, SyncError};

const ORGANIZATION_QUERY: &str = r#"
query Organization($id: ID!) {
  organization(id: $id) { id name logoUrl }
}
"#;

const PLAYERS_QUERY: &str = r#"
query Players($orgId: ID!) {
  players(filter: { organizationIdFilter: { id: $orgId } }, first: 100) {
    edges { node { id nickname fullName role team { id } } }
  }
}
"#;

const MATCHES_QUERY: &str = r#"
query Matches($teamId: ID, $first: Int!) {
  allSeries(
    filter: { teamIds: { in: [$teamId] } }
    first: $first
    orderBy: StartTimeScheduled
    orderDirection: DESC
  ) {
    edges { node {
      id startTimeScheduled
      format { nameShortened }
      tournament { id name }
      teams { baseInfo { id name } won }
      players { id teamId kills deaths killAssistsGiven }
    } }
  }
}
"#;

const TOURNAMENTS_QUERY: &str = r#"
query Tournaments($first: Int!) {
  tournaments(first: $first) {
    edges { node { id name startDate endDate } }
  }
}
"#;

const TEAMS_QUERY: &str = r#"
query Teams($orgId: ID!, $first: Int!) {
  teams(filter: { organizationIdFilter: { id: $orgId } }, first: $first) {
    edges { node { id name logoUrl } }
  }
}
"#;

const LIVE_SERIES_QUERY: &str = r#"
query LiveSeries {
  allSeries(filter: { live: true }, first: 20) {
    edges { node {
      id
      teams { baseInfo { id name logoUrl } }
      productServiceLevels { productName serviceLevel }
    } }
  }
}
"#;

const SERIES_GAMES_QUERY: &str = r#"
query SeriesGames($id: ID!) {
  seriesState(id: $id) { games { id sequenceNumber started finished } }
}
"#;

const SERIES_STATE_QUERY: &str = r#"
query SeriesState($id: ID!) {
  seriesState(id: $id) {
    valid updatedAt format started finished
    teams { id name score won }
    games {
      id sequenceNumber started finished
      teams { id name score won }
    }
  }
}
"#;

const LIVE_GAME_QUERY: &str = r#"
query LiveGame($id: ID!) {
  gameState(id: $id) {
    id started finished
    clock { currentSeconds }
    teams {
      id name
      players { id name kills deaths killAssistsGiven netWorth level }
    }
  }
}
"#;

/// Client for the GRID central-data and series-state GraphQL endpoints.
#[derive(Clone)]
pub struct GridClient {
    http: Client,
    central_url: String,
    series_state_url: String,
    api_key: Option<String>,
    organization_id: String,
    /// The team whose matches and live games are of interest
    team_id: Option<String>,
}

impl GridClient {
    pub fn new(
        central_url: &str,
        series_state_url: &str,
        api_key: Option<String>,
        organization_id: &str,
        team_id: Option<String>,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(GridClient {
            http,
            central_url: central_url.to_string(),
            series_state_url: series_state_url.to_string(),
            api_key,
            organization_id: organization_id.to_string(),
            team_id,
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        url: &str,
        document: &str,
        variables: serde_json::Value,
    ) -> GatewayResult<T> {
        let mut req = self.http.post(url).json(&serde_json::json!({
            "query": document,
            "variables": variables,
        }));
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("GRID request failed: {}", e)))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| SyncError::Transport(format!("GRID response body lost: {}", e)))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        decode_response(&body)
    }

    fn opponent_of<'a>(&self, teams: &'a [WireSeriesTeam]) -> Option<&'a WireBaseInfo> {
        teams
            .iter()
            .map(|t| &t.base_info)
            .find(|t| Some(&t.id) != self.team_id.as_ref())
    }

    fn own_team_won(&self, teams: &[WireSeriesTeam]) -> Option<bool> {
        let own = self.team_id.as_ref()?;
        teams.iter().find(|t| &t.base_info.id == own)?.won
    }
}

#[async_trait]
impl DataGateway for GridClient {
    fn name(&self) -> &str {
        "GRID"
    }

    async fn fetch_organization(&self) -> GatewayResult<Organization> {
        #[derive(Deserialize)]
        struct Data {
            organization: Option<WireOrganization>,
        }
        let data: Data = self
            .query(
                &self.central_url,
                ORGANIZATION_QUERY,
                serde_json::json!({ "id": self.organization_id }),
            )
            .await?;
        let org = data.organization.ok_or_else(|| {
            SyncError::Protocol(format!("organization {} missing from response", self.organization_id))
        })?;
        Ok(Organization {
            id: org.id,
            name: org.name,
            logo_url: org.logo_url,
        })
    }

    async fn fetch_players(&self) -> GatewayResult<Vec<Player>> {
        #[derive(Deserialize)]
        struct Data {
            players: Connection<WirePlayer>,
        }
        let data: Data = self
            .query(
                &self.central_url,
                PLAYERS_QUERY,
                serde_json::json!({ "orgId": self.organization_id }),
            )
            .await?;
        Ok(data
            .players
            .into_nodes()
            .map(|p| Player {
                id: p.id,
                nickname: p.nickname,
                full_name: p.full_name,
                team_id: p.team.map(|t| t.id),
                role: p.role,
                stats: None,
            })
            .collect())
    }

    async fn fetch_matches(&self, limit: u32) -> GatewayResult<Vec<Match>> {
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "allSeries")]
            all_series: Connection<WireSeries>,
        }
        let data: Data = self
            .query(
                &self.central_url,
                MATCHES_QUERY,
                serde_json::json!({ "teamId": self.team_id, "first": limit }),
            )
            .await?;

        let matches = data
            .all_series
            .into_nodes()
            .map(|s| {
                let opponent = self
                    .opponent_of(&s.teams)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| "TBD".to_string());
                let result = self.own_team_won(&s.teams).map(|won| {
                    if won {
                        MatchResult::Win
                    } else if s.teams.iter().any(|t| t.won == Some(true)) {
                        MatchResult::Loss
                    } else {
                        MatchResult::Draw
                    }
                });
                let own_team = self.team_id.as_deref();
                let player_lines = s
                    .players
                    .into_iter()
                    .filter(|p| own_team.is_none() || p.team_id.as_deref() == own_team)
                    .map(|p| PlayerLine {
                        player_id: p.id,
                        kills: p.kills,
                        deaths: p.deaths,
                        assists: p.kill_assists_given,
                    })
                    .collect();
                Match {
                    id: s.id,
                    tournament_id: s.tournament.as_ref().map(|t| t.id.clone()),
                    tournament_name: s.tournament.map(|t| t.name),
                    opponent,
                    scheduled_at: s.start_time_scheduled,
                    format: s.format.map(|f| f.name_shortened),
                    result,
                    player_lines,
                }
            })
            .collect();
        Ok(matches)
    }

    async fn fetch_tournaments(&self, limit: u32) -> GatewayResult<Vec<Tournament>> {
        #[derive(Deserialize)]
        struct Data {
            tournaments: Connection<WireTournament>,
        }
        let data: Data = self
            .query(
                &self.central_url,
                TOURNAMENTS_QUERY,
                serde_json::json!({ "first": limit }),
            )
            .await?;
        Ok(data
            .tournaments
            .into_nodes()
            .map(|t| Tournament {
                id: t.id,
                name: t.name,
                start_date: t.start_date,
                end_date: t.end_date,
            })
            .collect())
    }

    async fn fetch_teams(&self, limit: u32) -> GatewayResult<Vec<Team>> {
        #[derive(Deserialize)]
        struct Data {
            teams: Connection<WireTeam>,
        }
        let data: Data = self
            .query(
                &self.central_url,
                TEAMS_QUERY,
                serde_json::json!({ "orgId": self.organization_id, "first": limit }),
            )
            .await?;
        Ok(data.teams.into_nodes().map(WireTeam::into_team).collect())
    }

    async fn fetch_live_snapshot(&self, game_id: &str) -> GatewayResult<Option<LiveMatchState>> {
        let game_id = require_id("game_id", game_id)?;
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "gameState")]
            game_state: Option<WireGameState>,
        }
        let data: Data = self
            .query(
                &self.series_state_url,
                LIVE_GAME_QUERY,
                serde_json::json!({ "id": game_id }),
            )
            .await?;
        let snapshot = data
            .game_state
            .filter(|g| g.started)
            .map(|g| live_state_from_wire(g, self.team_id.as_deref()));
        debug!(
            "Live snapshot for {}: {}",
            game_id,
            snapshot
                .as_ref()
                .map(|s| format!("{} players", s.players.len()))
                .unwrap_or_else(|| "none".to_string())
        );
        Ok(snapshot)
    }

    async fn fetch_ongoing_games(&self) -> GatewayResult<Vec<OngoingSeries>> {
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "allSeries")]
            all_series: Connection<WireLiveSeries>,
        }
        #[derive(Deserialize)]
        struct GamesData {
            #[serde(rename = "seriesState")]
            series_state: Option<WireSeriesGames>,
        }

        let data: Data = self
            .query(&self.central_url, LIVE_SERIES_QUERY, serde_json::json!({}))
            .await?;
        let listed: Vec<WireLiveSeries> = data.all_series.into_nodes().collect();
        let total = listed.len();
        // Only series that could be tracked are expanded; a key often covers
        // just a subset of the platform's live series.
        let candidates: Vec<WireLiveSeries> = listed
            .into_iter()
            .filter(|s| s.live_data_available())
            .filter(|s| match self.team_id.as_deref() {
                Some(team) => s.teams.iter().any(|t| t.base_info.id == team),
                None => true,
            })
            .collect();

        // Nested game state lives on the series-state endpoint. One series
        // failing to expand must not hide the others.
        let expanded = join_all(candidates.into_iter().map(|s| async move {
            let games = match self
                .query::<GamesData>(
                    &self.series_state_url,
                    SERIES_GAMES_QUERY,
                    serde_json::json!({ "id": s.id }),
                )
                .await
            {
                Ok(data) => data
                    .series_state
                    .map(|st| st.games.into_iter().map(WireGameSummary::into_game).collect())
                    .unwrap_or_default(),
                Err(e) => {
                    warn!("Games of live series {} unavailable: {}", s.id, e);
                    Vec::new()
                }
            };
            OngoingSeries {
                live_data_available: s.live_data_available(),
                id: s.id,
                teams: s.teams.into_iter().map(|t| t.base_info.into_team()).collect(),
                games,
            }
        }))
        .await;

        info!(
            "GRID reports {} live series, {} trackable",
            total,
            expanded.len()
        );
        Ok(expanded)
    }

    async fn fetch_series_state(&self, series_id: &str) -> GatewayResult<SeriesState> {
        let series_id = require_id("series_id", series_id)?;
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "seriesState")]
            series_state: Option<WireSeriesState>,
        }
        let data: Data = self
            .query(
                &self.series_state_url,
                SERIES_STATE_QUERY,
                serde_json::json!({ "id": series_id }),
            )
            .await?;
        let state = data
            .series_state
            .ok_or_else(|| SyncError::Protocol(format!("no series state for {}", series_id)))?;
        Ok(series_state_from_wire(state))
    }
}

// ── Response classification ───────────────────────────────────────────────────

fn classify_status(status: StatusCode, body: &str) -> SyncError {
    let detail = format!("HTTP {}: {}", status, truncate(body, 200));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::PermissionDenied(detail),
        StatusCode::TOO_MANY_REQUESTS => SyncError::Transport(detail),
        s if s.is_server_error() => SyncError::Transport(detail),
        _ => SyncError::Protocol(detail),
    }
}

fn decode_response<T: DeserializeOwned>(body: &str) -> GatewayResult<T> {
    let envelope: GraphqlResponse<T> = serde_json::from_str(body)
        .map_err(|e| SyncError::Protocol(format!("malformed GRID response: {}", e)))?;

    if let Some(first) = envelope.errors.first() {
        let message = envelope
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let kind = first
            .extensions
            .as_ref()
            .and_then(|x| x.error_type.as_deref())
            .unwrap_or("");
        return Err(match kind {
            "PERMISSION_DENIED" | "UNAUTHENTICATED" | "FORBIDDEN" => {
                SyncError::PermissionDenied(message)
            }
            "UNAVAILABLE" => SyncError::Transport(message),
            _ => SyncError::Protocol(message),
        });
    }

    envelope
        .data
        .ok_or_else(|| SyncError::Protocol("GRID response has neither data nor errors".into()))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ── Wire → model conversion ──────────────────────────────────────────────────

fn live_state_from_wire(game: WireGameState, team_id: Option<&str>) -> LiveMatchState {
    let own_idx = team_id
        .and_then(|id| game.teams.iter().position(|t| t.id == id))
        .unwrap_or(0);
    let opponent = game
        .teams
        .iter()
        .enumerate()
        .find(|(i, _)| *i != own_idx)
        .map(|(_, t)| t.name.clone())
        .unwrap_or_default();
    let players = game
        .teams
        .into_iter()
        .nth(own_idx)
        .map(|t| t.players)
        .unwrap_or_default()
        .into_iter()
        .map(|p| LivePlayer {
            id: p.id,
            nickname: p.name,
            kills: p.kills,
            deaths: p.deaths,
            assists: p.kill_assists_given,
            gold: p.net_worth,
            level: p.level,
        })
        .collect();

    LiveMatchState {
        id: game.id,
        opponent,
        is_active: !game.finished,
        game_time: game.clock.map(|c| c.current_seconds).unwrap_or(0),
        players,
        data_source: DataSource::Live,
    }
}

fn series_state_from_wire(s: WireSeriesState) -> SeriesState {
    SeriesState {
        valid: s.valid,
        updated_at: s.updated_at,
        format: s.format,
        started: s.started,
        finished: s.finished,
        teams: s.teams.into_iter().map(WireStateTeam::into_team).collect(),
        games: s
            .games
            .into_iter()
            .map(|g| SeriesGame {
                id: g.id,
                sequence_number: g.sequence_number,
                started: g.started,
                finished: g.finished,
                teams: g.teams.into_iter().map(WireStateTeam::into_team).collect(),
            })
            .collect(),
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
    #[serde(default)]
    extensions: Option<GraphqlErrorExtensions>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorExtensions {
    #[serde(rename = "errorType")]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Connection<T> {
    #[serde(default)]
    edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: T,
}

impl<T> Connection<T> {
    fn into_nodes(self) -> impl Iterator<Item = T> {
        self.edges.into_iter().map(|e| e.node)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOrganization {
    id: String,
    name: String,
    logo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireIdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePlayer {
    id: String,
    nickname: String,
    full_name: Option<String>,
    role: Option<String>,
    team: Option<WireIdRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSeries {
    id: String,
    start_time_scheduled: DateTime<Utc>,
    format: Option<WireFormat>,
    tournament: Option<WireTournamentRef>,
    #[serde(default)]
    teams: Vec<WireSeriesTeam>,
    #[serde(default)]
    players: Vec<WireSeriesPlayer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFormat {
    name_shortened: String,
}

#[derive(Debug, Deserialize)]
struct WireTournamentRef {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSeriesTeam {
    base_info: WireBaseInfo,
    won: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBaseInfo {
    id: String,
    name: String,
    logo_url: Option<String>,
}

impl WireBaseInfo {
    fn into_team(self) -> Team {
        Team {
            id: self.id,
            name: self.name,
            logo_url: self.logo_url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSeriesPlayer {
    id: String,
    team_id: Option<String>,
    kills: u32,
    deaths: u32,
    kill_assists_given: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTournament {
    id: String,
    name: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTeam {
    id: String,
    name: String,
    logo_url: Option<String>,
}

impl WireTeam {
    fn into_team(self) -> Team {
        Team {
            id: self.id,
            name: self.name,
            logo_url: self.logo_url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLiveSeries {
    id: String,
    #[serde(default)]
    teams: Vec<WireLiveSeriesTeam>,
    #[serde(default)]
    product_service_levels: Vec<WireServiceLevel>,
}

impl WireLiveSeries {
    fn live_data_available(&self) -> bool {
        self.product_service_levels
            .iter()
            .any(|l| l.product_name == "liveDataFeed" && l.service_level != "NONE")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLiveSeriesTeam {
    base_info: WireBaseInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireServiceLevel {
    product_name: String,
    service_level: String,
}

#[derive(Debug, Deserialize)]
struct WireSeriesGames {
    #[serde(default)]
    games: Vec<WireGameSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGameSummary {
    id: String,
    sequence_number: u32,
    started: bool,
    finished: bool,
}

impl WireGameSummary {
    fn into_game(self) -> OngoingGame {
        OngoingGame {
            id: self.id,
            sequence_number: self.sequence_number,
            started: self.started,
            finished: self.finished,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSeriesState {
    valid: bool,
    updated_at: DateTime<Utc>,
    format: String,
    started: bool,
    finished: bool,
    #[serde(default)]
    teams: Vec<WireStateTeam>,
    #[serde(default)]
    games: Vec<WireStateGame>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStateGame {
    id: String,
    sequence_number: u32,
    started: bool,
    finished: bool,
    #[serde(default)]
    teams: Vec<WireStateTeam>,
}

#[derive(Debug, Deserialize)]
struct WireStateTeam {
    id: String,
    name: String,
    #[serde(default)]
    score: u32,
    #[serde(default)]
    won: bool,
}

impl WireStateTeam {
    fn into_team(self) -> SeriesTeam {
        SeriesTeam {
            id: self.id,
            name: self.name,
            score: self.score,
            won: self.won,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireGameState {
    id: String,
    started: bool,
    finished: bool,
    clock: Option<WireClock>,
    #[serde(default)]
    teams: Vec<WireGameTeam>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireClock {
    current_seconds: u32,
}

#[derive(Debug, Deserialize)]
struct WireGameTeam {
    id: String,
    name: String,
    #[serde(default)]
    players: Vec<WireGamePlayer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGamePlayer {
    id: String,
    name: String,
    kills: u32,
    deaths: u32,
    kill_assists_given: u32,
    #[serde(default)]
    net_worth: u32,
    #[serde(default)]
    level: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "no access"),
            SyncError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            SyncError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            SyncError::Transport(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            SyncError::Transport(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, ""),
            SyncError::Protocol(_)
        ));
    }

    #[test]
    fn test_graphql_permission_error() {
        let body = r#"{"data":null,"errors":[{"message":"no access to series 42","extensions":{"errorType":"PERMISSION_DENIED"}}]}"#;
        let err = decode_response::<serde_json::Value>(body).unwrap_err();
        assert_eq!(err, SyncError::PermissionDenied("no access to series 42".into()));
    }

    #[test]
    fn test_graphql_unknown_error_is_protocol() {
        let body = r#"{"errors":[{"message":"Cannot query field \"foo\""}]}"#;
        let err = decode_response::<serde_json::Value>(body).unwrap_err();
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn test_malformed_body_is_protocol() {
        let err = decode_response::<serde_json::Value>("<html>gateway</html>").unwrap_err();
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn test_missing_data_is_protocol() {
        let err = decode_response::<serde_json::Value>(r#"{"data":null}"#).unwrap_err();
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn test_series_state_decodes() {
        #[derive(Deserialize)]
        struct Data {
            #[serde(rename = "seriesState")]
            series_state: Option<WireSeriesState>,
        }
        let body = r#"{"data":{"seriesState":{
            "valid":true,"updatedAt":"2024-05-01T12:00:00Z","format":"best-of-3",
            "started":true,"finished":false,
            "teams":[{"id":"1","name":"Northwind","score":1,"won":false},
                     {"id":"2","name":"Red Harbor","score":0,"won":false}],
            "games":[{"id":"g1","sequenceNumber":1,"started":true,"finished":true,
                      "teams":[{"id":"1","name":"Northwind","score":16,"won":true}]}]
        }}}"#;
        let data: Data = decode_response(body).unwrap();
        let state = series_state_from_wire(data.series_state.unwrap());
        assert!(state.valid && state.started && !state.finished);
        assert_eq!(state.teams.len(), 2);
        assert_eq!(state.teams[0].score, 1);
        assert_eq!(state.games[0].teams[0].score, 16);
        assert!(state.games[0].teams[0].won);
    }

    #[test]
    fn test_series_state_wrong_shape_is_protocol() {
        #[derive(Debug, Deserialize)]
        struct Data {
            #[serde(rename = "seriesState")]
            _series_state: Option<WireSeriesState>,
        }
        let body = r#"{"data":{"seriesState":{"valid":"yes"}}}"#;
        let err = decode_response::<Data>(body).unwrap_err();
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn test_live_state_picks_own_team() {
        let game = WireGameState {
            id: "g7".into(),
            started: true,
            finished: false,
            clock: Some(WireClock { current_seconds: 845 }),
            teams: vec![
                WireGameTeam {
                    id: "9".into(),
                    name: "Red Harbor".into(),
                    players: vec![],
                },
                WireGameTeam {
                    id: "1".into(),
                    name: "Northwind".into(),
                    players: vec![WireGamePlayer {
                        id: "p1".into(),
                        name: "vex".into(),
                        kills: 4,
                        deaths: 1,
                        kill_assists_given: 6,
                        net_worth: 7_300,
                        level: 12,
                    }],
                },
            ],
        };
        let state = live_state_from_wire(game, Some("1"));
        assert_eq!(state.opponent, "Red Harbor");
        assert_eq!(state.game_time, 845);
        assert_eq!(state.players.len(), 1);
        assert_eq!(state.players[0].assists, 6);
        assert_eq!(state.data_source, DataSource::Live);
    }

    #[test]
    fn test_live_series_service_level() {
        let series: WireLiveSeries = serde_json::from_str(
            r#"{"id":"s1","teams":[],"productServiceLevels":[
                {"productName":"liveDataFeed","serviceLevel":"FULL"}]}"#,
        )
        .unwrap();
        assert!(series.live_data_available());

        let series: WireLiveSeries = serde_json::from_str(
            r#"{"id":"s2","productServiceLevels":[
                {"productName":"liveDataFeed","serviceLevel":"NONE"}]}"#,
        )
        .unwrap();
        assert!(!series.live_data_available());
    }

    #[test]
    fn test_connection_without_edges_is_empty() {
        #[derive(Deserialize)]
        struct Data {
            players: Connection<WirePlayer>,
        }
        let data: Data = decode_response(r#"{"data":{"players":{}}}"#).unwrap();
        assert_eq!(data.players.into_nodes().count(), 0);

        let data: Data = decode_response(
            r#"{"data":{"players":{"edges":[{"node":{"id":"p1","nickname":"vex","team":{"id":"1"}}}]}}}"#,
        )
        .unwrap();
        let players: Vec<WirePlayer> = data.players.into_nodes().collect();
        assert_eq!(players[0].nickname, "vex");
        assert_eq!(players[0].team.as_ref().map(|t| t.id.as_str()), Some("1"));
    }

    /// Serves a fixed live-series list on `/central` and per-series games on
    /// `/state`, denying access to every series except `mine`.
    async fn spawn_grid_stub() -> String {
        use axum::{routing::post, Json, Router};
        use serde_json::{json, Value};

        async fn central(Json(_): Json<Value>) -> Json<Value> {
            let series = |id: &str, team: &str, level: &str| {
                json!({ "node": {
                    "id": id,
                    "teams": [
                        { "baseInfo": { "id": team, "name": "Team", "logoUrl": null } },
                        { "baseInfo": { "id": "9", "name": "Red Harbor", "logoUrl": null } }
                    ],
                    "productServiceLevels": [
                        { "productName": "liveDataFeed", "serviceLevel": level }
                    ]
                }})
            };
            Json(json!({ "data": { "allSeries": { "edges": [
                series("mine", "1", "FULL"),
                series("locked", "1", "FULL"),
                series("other", "7", "FULL"),
                series("nofeed", "1", "NONE"),
            ] } } }))
        }

        async fn state(Json(body): Json<Value>) -> Json<Value> {
            let id = body["variables"]["id"].as_str().unwrap_or_default().to_string();
            if id == "mine" {
                Json(json!({ "data": { "seriesState": { "games": [
                    { "id": "g1", "sequenceNumber": 1, "started": true, "finished": false }
                ] } } }))
            } else {
                Json(json!({ "data": null, "errors": [{
                    "message": format!("no access to series {}", id),
                    "extensions": { "errorType": "PERMISSION_DENIED" }
                }] }))
            }
        }

        let app = Router::new()
            .route("/central", post(central))
            .route("/state", post(state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_ongoing_games_survive_denied_series() {
        let base = spawn_grid_stub().await;
        let client = GridClient::new(
            &format!("{}/central", base),
            &format!("{}/state", base),
            Some("key".into()),
            "org-1",
            Some("1".into()),
        )
        .unwrap();

        let mut series = client.fetch_ongoing_games().await.unwrap();
        series.sort_by(|a, b| a.id.cmp(&b.id));
        let ids: Vec<&str> = series.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["locked", "mine"]);

        let mine = &series[1];
        assert!(mine.live_data_available);
        assert_eq!(mine.games.len(), 1);
        assert!(mine.games[0].is_running());
        assert!(series[0].games.is_empty());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
