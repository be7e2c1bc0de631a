pub mod grid;
#[cfg(test)]
pub mod mock;

pub use grid::GridClient;

use async_trait::async_trait;

use crate::db::models::{
    LiveMatchState, Match, OngoingSeries, Organization, Player, SeriesState, Team, Tournament,
};
use crate::error::SyncError;

pub type GatewayResult<T> = Result<T, SyncError>;

/// Typed queries against the remote esports data source.
///
/// Every call may fail with a [`SyncError`]; "no data" is an `Ok` with an
/// empty value, never an error.
#[async_trait]
pub trait DataGateway: Send + Sync {
    async fn fetch_organization(&self) -> GatewayResult<Organization>;

    async fn fetch_players(&self) -> GatewayResult<Vec<Player>>;

    async fn fetch_matches(&self, limit: u32) -> GatewayResult<Vec<Match>>;

    async fn fetch_tournaments(&self, limit: u32) -> GatewayResult<Vec<Tournament>>;

    async fn fetch_teams(&self, limit: u32) -> GatewayResult<Vec<Team>>;

    /// Attach derived statistics to each player. The default derives them
    /// locally from the fetched match history.
    async fn enrich_players_with_stats(
        &self,
        players: Vec<Player>,
        matches: &[Match],
    ) -> GatewayResult<Vec<Player>> {
        Ok(crate::sync::stats::enrich_players(players, matches))
    }

    /// Latest in-game state for a running game, `None` when the source has
    /// nothing for it yet.
    async fn fetch_live_snapshot(&self, game_id: &str) -> GatewayResult<Option<LiveMatchState>>;

    async fn fetch_ongoing_games(&self) -> GatewayResult<Vec<OngoingSeries>>;

    async fn fetch_series_state(&self, series_id: &str) -> GatewayResult<SeriesState>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
