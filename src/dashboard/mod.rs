use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::db::models::{LiveMatchState, RosterSnapshot};
use crate::error::SyncError;
use crate::live::{LiveMatchTracker, SeriesPoller};
use crate::sync::RosterSync;

#[derive(Clone)]
pub struct AppState {
    pub roster: RosterSync,
    pub tracker: LiveMatchTracker,
    pub poller: SeriesPoller,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Build the Axum router for the control API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/roster", get(roster_handler))
        .route("/api/roster/refresh", post(roster_refresh_handler))
        .route("/api/live", get(live_handler))
        .route("/api/live/activate", post(live_activate_handler))
        .route("/api/live/deactivate", post(live_deactivate_handler))
        .route("/api/live/reset", post(live_reset_handler))
        .route("/api/live/target", post(live_target_handler))
        .route("/api/live/auto-detect", post(live_auto_detect_handler))
        .route("/api/live/detect", post(live_detect_handler))
        .route("/api/series", get(series_handler))
        .route("/api/series/start", post(series_start_handler))
        .route("/api/series/stop", post(series_stop_handler))
        .route("/api/series/reset", post(series_reset_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn error_response(e: SyncError) -> (StatusCode, String) {
    let status = match e {
        SyncError::Validation(_) => StatusCode::BAD_REQUEST,
        SyncError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        SyncError::Transport(_) | SyncError::Protocol(_) => StatusCode::BAD_GATEWAY,
        SyncError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("Request failed ({}): {}", e.kind(), e);
    (status, e.to_string())
}

#[derive(Debug, Serialize)]
struct RosterView {
    snapshot: Option<RosterSnapshot>,
    last_fetch: Option<DateTime<Utc>>,
    cached_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshParams {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Serialize)]
struct LiveView {
    mode: &'static str,
    game_id: Option<String>,
    auto_detect: bool,
    state: LiveMatchState,
}

#[derive(Debug, Serialize)]
struct DetectView {
    bound: bool,
    #[serde(flatten)]
    live: LiveView,
}

#[derive(Debug, Deserialize)]
struct LiveTarget {
    game_id: String,
    #[serde(default)]
    opponent: String,
}

#[derive(Debug, Deserialize)]
struct AutoDetect {
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct SeriesTarget {
    series_id: String,
}

fn live_view(tracker: &LiveMatchTracker) -> LiveView {
    let (mode, state) = tracker.snapshot();
    LiveView {
        mode: mode.label(),
        game_id: mode.game_id().map(str::to_string),
        auto_detect: tracker.auto_detect_enabled(),
        state,
    }
}

/// GET /api/roster
async fn roster_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(RosterView {
        snapshot: state.roster.cached(),
        last_fetch: state.roster.last_fetch_time(),
        cached_at: state.roster.cached_at(),
    })
}

/// POST /api/roster/refresh?force=true
async fn roster_refresh_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RefreshParams>,
) -> ApiResult<impl IntoResponse> {
    state
        .roster
        .refresh(params.force)
        .await
        .map(|snapshot| Json(snapshot))
        .map_err(error_response)
}

/// GET /api/live
async fn live_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(live_view(&state.tracker))
}

/// POST /api/live/activate
async fn live_activate_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.tracker.activate();
    Json(live_view(&state.tracker))
}

/// POST /api/live/deactivate
async fn live_deactivate_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.tracker.deactivate();
    Json(live_view(&state.tracker))
}

/// POST /api/live/reset
async fn live_reset_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.tracker.reset();
    Json(live_view(&state.tracker))
}

/// POST /api/live/target {"game_id": "...", "opponent": "..."}
async fn live_target_handler(
    State(state): State<Arc<AppState>>,
    Json(target): Json<LiveTarget>,
) -> ApiResult<impl IntoResponse> {
    state
        .tracker
        .set_live_target(&target.game_id, &target.opponent)
        .map_err(error_response)?;
    Ok(Json(live_view(&state.tracker)))
}

/// POST /api/live/auto-detect {"enabled": true}
async fn live_auto_detect_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AutoDetect>,
) -> impl IntoResponse {
    state.tracker.set_auto_detect(body.enabled);
    Json(live_view(&state.tracker))
}

/// POST /api/live/detect
async fn live_detect_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<DetectView>> {
    let bound = state.tracker.detect_once().await.map_err(error_response)?;
    Ok(Json(DetectView {
        bound,
        live: live_view(&state.tracker),
    }))
}

/// GET /api/series
async fn series_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.poller.view())
}

/// POST /api/series/start {"series_id": "..."}
async fn series_start_handler(
    State(state): State<Arc<AppState>>,
    Json(target): Json<SeriesTarget>,
) -> ApiResult<impl IntoResponse> {
    state
        .poller
        .start(&target.series_id)
        .map_err(error_response)?;
    Ok(Json(state.poller.view()))
}

/// POST /api/series/stop
async fn series_stop_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.poller.stop();
    Json(state.poller.view())
}

/// POST /api/series/reset
async fn series_reset_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.poller.reset();
    Json(state.poller.view())
}
