use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::{info, warn};

use stream_core::{decode_follow, signature, BatchError, NotificationBatch, SIGNATURE_HEADER};

use crate::error::ApiError;
use crate::state::AppState;

/// The callback paths we hand out when subscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackTopic {
    Streams,
    Follows,
}

impl CallbackTopic {
    fn parse(s: &str) -> Result<Self, ApiError> {
        match s {
            "streams" => Ok(Self::Streams),
            "follows" => Ok(Self::Follows),
            other => Err(ApiError::NotFound(format!("Unknown topic: {}", other))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Streams => "streams",
            Self::Follows => "follows",
        }
    }
}

/// Query of the hub's intent verification request.
#[derive(Debug, Deserialize)]
pub struct VerificationQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.topic")]
    pub topic: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
    #[serde(rename = "hub.lease_seconds")]
    pub lease_seconds: Option<String>,
    #[serde(rename = "hub.reason")]
    pub reason: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{topic}", get(verify_intent).post(receive_notification))
}

/// GET /webhooks/{topic}
async fn verify_intent(
    Path(topic): Path<String>,
    Query(q): Query<VerificationQuery>,
) -> Result<Response, ApiError> {
    let topic = CallbackTopic::parse(&topic)?;

    if let Some(challenge) = q.challenge {
        info!(
            topic = topic.as_str(),
            mode = q.mode.as_deref().unwrap_or(""),
            lease_seconds = q.lease_seconds.as_deref().unwrap_or(""),
            "Hub verified subscription"
        );
        return Ok(([(header::CONTENT_TYPE, "text/plain")], challenge).into_response());
    }

    if q.mode.as_deref() == Some("denied") {
        warn!(
            topic = topic.as_str(),
            hub_topic = q.topic.as_deref().unwrap_or(""),
            reason = q.reason.as_deref().unwrap_or(""),
            "Hub denied subscription"
        );
        return Ok(StatusCode::OK.into_response());
    }

    Err(ApiError::BadRequest("missing hub.challenge".into()))
}

/// POST /webhooks/{topic}
async fn receive_notification(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let topic = CallbackTopic::parse(&topic)?;

    if let Some(secret) = state.secret.as_deref() {
        let provided = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        if let Err(e) = signature::verify(&body, secret, provided) {
            warn!(topic = topic.as_str(), error = %e, "Rejecting unsigned notification");
            return Err(e.into());
        }
    }

    let rejected = |e: BatchError| {
        warn!(topic = topic.as_str(), error = %e, "Rejecting malformed notification");
        ApiError::from(e)
    };
    match topic {
        CallbackTopic::Streams => {
            let batch = NotificationBatch::from_json(&body).map_err(rejected)?;
            state.monitor.handle_streams(&batch).await;
        }
        CallbackTopic::Follows => {
            let entry = decode_follow(&body).map_err(rejected)?;
            state.monitor.handle_follow(entry).await;
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
