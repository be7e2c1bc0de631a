//! Roster synchronisation: organization, players, matches, tournaments and
//! teams fetched together and committed to the cache as one snapshot.
//!
//! A refresh is commit-or-nothing. If any of the five queries (or the stats
//! enrichment, or the cache commit) fails, the previously cached snapshot is
//! left untouched and the failure is reported to the caller and to
//! subscribers.

use chrono::{DateTime, Utc};
use futures_util::future::try_join5;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::db::models::RosterSnapshot;
use crate::db::{Cache, CacheKey};
use crate::error::SyncError;
use crate::gateway::DataGateway;

#[derive(Debug, Clone)]
pub struct RosterSyncConfig {
    /// Cached data younger than this is served without contacting the gateway
    pub ttl: Duration,
    /// Page size for matches, tournaments and teams
    pub fetch_limit: u32,
}

impl Default for RosterSyncConfig {
    fn default() -> Self {
        RosterSyncConfig {
            ttl: Duration::from_secs(300),
            fetch_limit: 50,
        }
    }
}

/// Progress notifications for UI feedback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RosterEvent {
    Started {
        force: bool,
    },
    Completed {
        from_cache: bool,
        players: usize,
        fetched_at: DateTime<Utc>,
    },
    Failed {
        error: SyncError,
    },
}

#[derive(Clone)]
pub struct RosterSync {
    inner: Arc<RosterInner>,
}

struct RosterInner {
    gateway: Arc<dyn DataGateway>,
    cache: Cache,
    config: RosterSyncConfig,
    /// Serializes refreshes so two callers never fetch concurrently
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<RosterEvent>,
}

impl RosterSync {
    pub fn new(gateway: Arc<dyn DataGateway>, cache: Cache, config: RosterSyncConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        RosterSync {
            inner: Arc::new(RosterInner {
                gateway,
                cache,
                config,
                refresh_lock: Mutex::new(()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RosterEvent> {
        self.inner.events.subscribe()
    }

    /// The last committed snapshot, if any.
    pub fn cached(&self) -> Option<RosterSnapshot> {
        self.inner.cache.get(CacheKey::RosterSnapshot)
    }

    pub fn last_fetch_time(&self) -> Option<DateTime<Utc>> {
        self.inner.cache.get(CacheKey::RosterLastFetch)
    }

    /// When the cached snapshot was last written by any process.
    pub fn cached_at(&self) -> Option<DateTime<Utc>> {
        self.inner.cache.write_time(CacheKey::RosterSnapshot)
    }

    /// Return the roster, refetching it when `force` is set or the cache is
    /// stale or empty.
    pub async fn refresh(&self, force: bool) -> Result<RosterSnapshot, SyncError> {
        let _guard = self.inner.refresh_lock.lock().await;

        if !force {
            if let Some((snapshot, fetched_at)) = self.fresh_cached() {
                debug!("Roster cache hit ({} players)", snapshot.players.len());
                self.emit(RosterEvent::Completed {
                    from_cache: true,
                    players: snapshot.players.len(),
                    fetched_at,
                });
                return Ok(snapshot);
            }
        }

        self.emit(RosterEvent::Started { force });
        match self.fetch_and_commit().await {
            Ok((snapshot, fetched_at)) => {
                info!(
                    "Roster synced from {}: {} players, {} matches, {} tournaments, {} teams",
                    self.inner.gateway.name(),
                    snapshot.players.len(),
                    snapshot.matches.len(),
                    snapshot.tournaments.len(),
                    snapshot.teams.len()
                );
                self.emit(RosterEvent::Completed {
                    from_cache: false,
                    players: snapshot.players.len(),
                    fetched_at,
                });
                Ok(snapshot)
            }
            Err(e) => {
                warn!("Roster sync failed, keeping cached roster: {}", e);
                self.emit(RosterEvent::Failed { error: e.clone() });
                Err(e)
            }
        }
    }

    fn fresh_cached(&self) -> Option<(RosterSnapshot, DateTime<Utc>)> {
        let fetched_at = self.last_fetch_time()?;
        // A timestamp in the future (clock step back) is treated as stale.
        let fresh = (Utc::now() - fetched_at)
            .to_std()
            .map(|age| age < self.inner.config.ttl)
            .unwrap_or(false);
        if !fresh {
            return None;
        }
        let snapshot = self.cached()?;
        if snapshot.players.is_empty() {
            return None;
        }
        Some((snapshot, fetched_at))
    }

    async fn fetch_and_commit(&self) -> Result<(RosterSnapshot, DateTime<Utc>), SyncError> {
        let gateway = &self.inner.gateway;
        let limit = self.inner.config.fetch_limit;

        let (organization, players, matches, tournaments, teams) = try_join5(
            gateway.fetch_organization(),
            gateway.fetch_players(),
            gateway.fetch_matches(limit),
            gateway.fetch_tournaments(limit),
            gateway.fetch_teams(limit),
        )
        .await?;

        let players = gateway.enrich_players_with_stats(players, &matches).await?;

        let snapshot = RosterSnapshot {
            organization,
            players,
            matches,
            tournaments,
            teams,
        };
        let fetched_at = Utc::now();

        let encoded = serde_json::to_value(&snapshot)
            .map_err(|e| SyncError::Storage(format!("roster snapshot not serializable: {}", e)))?;
        self.inner
            .cache
            .commit(vec![
                (CacheKey::RosterSnapshot, encoded),
                (CacheKey::RosterLastFetch, serde_json::json!(fetched_at)),
            ])
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        Ok((snapshot, fetched_at))
    }

    fn emit(&self, event: RosterEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::gateway::mock::{player, sample_roster, MockGateway};

    fn setup() -> (Arc<MockGateway>, Cache, RosterSync) {
        let gateway = Arc::new(MockGateway::new());
        let cache = Cache::new(Arc::new(Database::open_in_memory().unwrap()));
        let sync = RosterSync::new(gateway.clone(), cache.clone(), RosterSyncConfig::default());
        (gateway, cache, sync)
    }

    fn seed(cache: &Cache, snapshot: &RosterSnapshot, fetched_at: DateTime<Utc>) {
        cache
            .commit(vec![
                (CacheKey::RosterSnapshot, serde_json::to_value(snapshot).unwrap()),
                (CacheKey::RosterLastFetch, serde_json::json!(fetched_at)),
            ])
            .unwrap();
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_gateway() {
        let (gateway, cache, sync) = setup();
        let snapshot = sample_roster();
        seed(&cache, &snapshot, Utc::now());

        let got = sync.refresh(false).await.unwrap();
        assert_eq!(got, snapshot);
        assert_eq!(gateway.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_cache_refetches() {
        let (gateway, cache, sync) = setup();
        seed(&cache, &sample_roster(), Utc::now() - chrono::Duration::minutes(10));

        sync.refresh(false).await.unwrap();
        assert_eq!(gateway.calls("fetch_players"), 1);
        assert_eq!(gateway.calls("fetch_teams"), 1);
    }

    #[tokio::test]
    async fn test_future_fetch_time_refetches() {
        let (gateway, cache, sync) = setup();
        seed(&cache, &sample_roster(), Utc::now() + chrono::Duration::hours(1));

        sync.refresh(false).await.unwrap();
        assert_eq!(gateway.calls("fetch_players"), 1);
        assert!(sync.last_fetch_time().unwrap() <= Utc::now());
    }

    #[tokio::test]
    async fn test_empty_cached_roster_refetches() {
        let (gateway, cache, sync) = setup();
        let mut empty = sample_roster();
        empty.players.clear();
        seed(&cache, &empty, Utc::now());

        let got = sync.refresh(false).await.unwrap();
        assert_eq!(got.players.len(), 2);
        assert_eq!(gateway.calls("fetch_organization"), 1);
    }

    #[tokio::test]
    async fn test_force_bypasses_fresh_cache() {
        let (gateway, cache, sync) = setup();
        seed(&cache, &sample_roster(), Utc::now());

        sync.refresh(true).await.unwrap();
        assert_eq!(gateway.total_calls(), 5);
    }

    #[tokio::test]
    async fn test_success_commits_enriched_snapshot() {
        let (_, _, sync) = setup();
        assert!(sync.cached().is_none());

        let before = Utc::now();
        let snapshot = sync.refresh(true).await.unwrap();
        let vex = &snapshot.players[0];
        assert_eq!(vex.stats.as_ref().unwrap().matches_played, 1);
        assert_eq!(sync.cached(), Some(snapshot));
        assert!(sync.last_fetch_time().unwrap() >= before);
        assert!(sync.cached_at().is_some());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_previous_snapshot() {
        let (gateway, _, sync) = setup();
        let s1 = sync.refresh(true).await.unwrap();
        let s1_time = sync.last_fetch_time();

        let mut s2 = sample_roster();
        s2.players.push(player("p3", "newcomer"));
        gateway.set_roster(s2);
        gateway.fail("fetch_matches", SyncError::Transport("connection reset".into()));

        let err = sync.refresh(true).await.unwrap_err();
        assert_eq!(err, SyncError::Transport("connection reset".into()));
        assert_eq!(sync.cached(), Some(s1.clone()));
        assert_eq!(sync.last_fetch_time(), s1_time);

        // A later non-forced call still serves S1 from cache.
        assert_eq!(sync.refresh(false).await.unwrap(), s1);
    }

    #[tokio::test]
    async fn test_notifications() {
        let (gateway, _, sync) = setup();
        let mut rx = sync.subscribe();

        sync.refresh(true).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), RosterEvent::Started { force: true });
        assert!(matches!(
            rx.recv().await.unwrap(),
            RosterEvent::Completed {
                from_cache: false,
                players: 2,
                ..
            }
        ));

        sync.refresh(false).await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            RosterEvent::Completed { from_cache: true, .. }
        ));

        gateway.fail("fetch_organization", SyncError::PermissionDenied("revoked".into()));
        sync.refresh(true).await.unwrap_err();
        assert_eq!(rx.recv().await.unwrap(), RosterEvent::Started { force: true });
        assert_eq!(
            rx.recv().await.unwrap(),
            RosterEvent::Failed {
                error: SyncError::PermissionDenied("revoked".into())
            }
        );
    }
}
