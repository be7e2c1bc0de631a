use clap::Parser;
use std::time::Duration;
use url::Url;

use crate::live::TrackerConfig;
use crate::sync::RosterSyncConfig;

/// Esports live-data sync service
#[derive(Parser, Debug, Clone)]
#[command(name = "esports-live-sync", version, about)]
pub struct Config {
    /// Control API listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080")]
    pub dashboard_addr: String,

    /// SQLite cache path
    #[arg(long, env = "DATABASE_PATH", default_value = "esports-sync.db")]
    pub database_path: String,

    /// GRID central-data GraphQL endpoint
    #[arg(
        long,
        env = "GRID_API_URL",
        default_value = "https://api-op.grid.gg/central-data/graphql"
    )]
    pub grid_api_url: String,

    /// GRID series-state GraphQL endpoint
    #[arg(
        long,
        env = "GRID_SERIES_STATE_URL",
        default_value = "https://api-op.grid.gg/live-data-feed/series-state/graphql"
    )]
    pub grid_series_state_url: String,

    /// GRID API key, sent as `x-api-key`
    #[arg(long, env = "GRID_API_KEY")]
    pub grid_api_key: Option<String>,

    /// Organization whose roster is synced
    #[arg(long, env = "ORGANIZATION_ID")]
    pub organization_id: String,

    /// Team whose live games auto-detect looks for
    #[arg(long, env = "TEAM_ID")]
    pub team_id: Option<String>,

    /// Roster cache lifetime in seconds
    #[arg(long, env = "ROSTER_TTL_SECS", default_value = "300")]
    pub roster_ttl_secs: u64,

    /// Page size for matches, tournaments and teams
    #[arg(long, env = "FETCH_LIMIT", default_value = "50")]
    pub fetch_limit: u32,

    /// Live tracker tick period in milliseconds
    #[arg(long, env = "TICK_INTERVAL_MS", default_value = "1000")]
    pub tick_interval_ms: u64,

    /// Minimum spacing between live snapshot fetches in milliseconds
    #[arg(long, env = "GRID_POLL_INTERVAL_MS", default_value = "5000")]
    pub grid_poll_interval_ms: u64,

    /// Auto-detect period in milliseconds
    #[arg(long, env = "AUTO_DETECT_INTERVAL_MS", default_value = "30000")]
    pub auto_detect_interval_ms: u64,

    /// Series state polling period in milliseconds
    #[arg(long, env = "SERIES_POLL_INTERVAL_MS", default_value = "3000")]
    pub series_poll_interval_ms: u64,

    /// Enable live-game auto-detection at startup
    #[arg(long, env = "AUTO_DETECT", default_value = "false")]
    pub auto_detect: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("GRID_API_URL", &self.grid_api_url),
            ("GRID_SERIES_STATE_URL", &self.grid_series_state_url),
        ] {
            let url = Url::parse(value)
                .map_err(|e| anyhow::anyhow!("{} is not a valid URL ({}): {}", name, value, e))?;
            if !matches!(url.scheme(), "http" | "https") {
                anyhow::bail!("{} must be an http(s) URL, got {}", name, value);
            }
        }
        if self.organization_id.trim().is_empty() {
            anyhow::bail!("ORGANIZATION_ID must not be empty");
        }
        if self.fetch_limit == 0 {
            anyhow::bail!("fetch_limit must be positive");
        }
        for (name, value) in [
            ("tick_interval_ms", self.tick_interval_ms),
            ("grid_poll_interval_ms", self.grid_poll_interval_ms),
            ("auto_detect_interval_ms", self.auto_detect_interval_ms),
            ("series_poll_interval_ms", self.series_poll_interval_ms),
        ] {
            if value == 0 {
                anyhow::bail!("{} must be positive", name);
            }
        }
        if self.auto_detect && self.team_id().is_none() {
            anyhow::bail!("TEAM_ID is required when AUTO_DETECT is enabled");
        }
        Ok(())
    }

    /// Team id with blanks treated as unset
    pub fn team_id(&self) -> Option<String> {
        self.team_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn roster_sync(&self) -> RosterSyncConfig {
        RosterSyncConfig {
            ttl: Duration::from_secs(self.roster_ttl_secs),
            fetch_limit: self.fetch_limit,
        }
    }

    pub fn tracker(&self) -> TrackerConfig {
        TrackerConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            live_poll_interval: Duration::from_millis(self.grid_poll_interval_ms),
            auto_detect_interval: Duration::from_millis(self.auto_detect_interval_ms),
            team_id: self.team_id(),
        }
    }

    pub fn series_poll_interval(&self) -> Duration {
        Duration::from_millis(self.series_poll_interval_ms)
    }
}
