use std::collections::HashMap;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use stream_core::{ChannelStats, LeaseCounts, RecordedEvent, SnapshotStatus};

use crate::state::AppState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub broadcaster_id: String,
    #[serde(flatten)]
    pub snapshot: SnapshotStatus,
    pub subscribers: usize,
    pub stats: ChannelStats,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub broadcaster_id: String,
    pub events: Vec<RecordedEvent>,
}

#[derive(Serialize)]
pub struct LeasesResponse {
    pub leases: HashMap<String, LeaseCounts>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/events", get(get_events))
        .route("/leases", get(get_leases))
}

/// GET /api/v1/status
async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        broadcaster_id: state.monitor.broadcaster_id().to_string(),
        snapshot: state.monitor.status().await,
        subscribers: state.clients.len(),
        stats: state.monitor.stats().await,
    })
}

/// GET /api/v1/events
async fn get_events(State(state): State<AppState>) -> Json<EventsResponse> {
    Json(EventsResponse {
        broadcaster_id: state.monitor.broadcaster_id().to_string(),
        events: state.monitor.recent_events().await,
    })
}

/// GET /api/v1/leases
async fn get_leases(State(state): State<AppState>) -> Json<LeasesResponse> {
    let leases = match &state.leases {
        Some(stats) => stats.snapshot().await,
        None => HashMap::new(),
    };
    Json(LeasesResponse { leases })
}
