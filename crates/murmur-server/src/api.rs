//! API handlers for the murmur agent.

use crate::pipeline::Outcome;
use crate::AppState;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use murmur_types::{FaultNotification, MemberId, MembershipEvent, SessionTarget, TextEvent};
use murmur_voice::{ConnectionSnapshot, Reaction, Ready, VoiceError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("voice backend error: {0}")]
    BadGateway(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<VoiceError> for ApiError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::SessionClosed => {
                ApiError::ServiceUnavailable("voice session is not running".to_string())
            }
            VoiceError::Connect(e) => ApiError::BadGateway(e.to_string()),
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

/// Response body for `GET /api/voice/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub connection: ConnectionSnapshot,
    pub target_member: Option<MemberId>,
}

/// Request body for manual joins.
#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub channel: SessionTarget,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub ready: Ready,
    pub channel: SessionTarget,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub left: bool,
}

/// Request body for `PUT /api/target`. `null` stops listening to anyone.
#[derive(Debug, Deserialize)]
pub struct SetTargetRequest {
    pub member_id: Option<MemberId>,
}

#[derive(Debug, Serialize)]
pub struct SetTargetResponse {
    pub target_member: Option<MemberId>,
}

/// Request body for `POST /api/voice/say`.
#[derive(Debug, Deserialize)]
pub struct SayRequest {
    pub text: String,
    /// Channel to join first when given.
    #[serde(default)]
    pub channel: Option<SessionTarget>,
}

/// Handler for `GET /api/voice/status`.
pub async fn status_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let connection = state.session.status().await?;
    Ok(Json(StatusResponse {
        connection,
        target_member: state.tracked.get(),
    }))
}

/// Handler for `POST /api/events/text`.
pub async fn text_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(event): Json<TextEvent>,
) -> Json<Outcome> {
    Json(state.pipeline.handle_text(&event).await)
}

/// Handler for `POST /api/events/membership`.
pub async fn membership_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(event): Json<MembershipEvent>,
) -> Result<Json<Reaction>, ApiError> {
    Ok(Json(state.observer.on_membership(&event).await?))
}

/// Handler for `POST /api/events/fault`.
pub async fn fault_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(fault): Json<FaultNotification>,
) -> Result<Json<Reaction>, ApiError> {
    Ok(Json(state.observer.on_fault(&fault).await?))
}

/// Handler for `POST /api/voice/join`.
///
/// The terminal connect error, if any, is returned to the caller verbatim.
pub async fn join_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, ApiError> {
    let channel = payload.channel;
    if channel.name.trim().is_empty() {
        return Err(ApiError::BadRequest("channel name is empty".to_string()));
    }
    let ready = state.session.join(channel.clone()).await?;
    tracing::info!(%channel, ?ready, "joined voice channel on request");
    Ok(Json(JoinResponse { ready, channel }))
}

/// Handler for `POST /api/voice/leave`.
pub async fn leave_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<LeaveResponse>, ApiError> {
    if !state.session.leave().await? {
        return Err(ApiError::Conflict(
            "not connected to a voice channel".to_string(),
        ));
    }
    tracing::info!("left voice channel on request");
    Ok(Json(LeaveResponse { left: true }))
}

/// Handler for `PUT /api/target`.
pub async fn set_target_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SetTargetRequest>,
) -> Json<SetTargetResponse> {
    state.tracked.set(payload.member_id);
    match payload.member_id {
        Some(member) => tracing::info!(%member, "now listening for messages"),
        None => tracing::info!("no longer listening to anyone"),
    }
    Json(SetTargetResponse {
        target_member: payload.member_id,
    })
}

/// Handler for `POST /api/voice/say`.
pub async fn say_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SayRequest>,
) -> Json<Outcome> {
    Json(state.pipeline.say(&payload.text, payload.channel).await)
}
