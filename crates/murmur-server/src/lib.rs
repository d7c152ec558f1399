//! HTTP surface, event pipeline and configuration for the murmur agent.

pub mod api;
pub mod config;
pub mod pipeline;
pub mod sanitize;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Extension, Json, Router,
};
use config::BotConfig;
use murmur_types::MemberId;
use murmur_voice::{DisconnectObserver, SpeechSynthesizer, TrackedMember, VoiceSession};
use pipeline::Pipeline;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the voice session actor.
    pub session: VoiceSession,
    /// Member whose messages are spoken.
    pub tracked: TrackedMember,
    /// Forwards membership changes and faults to the session.
    pub observer: DisconnectObserver,
    /// Text event pipeline.
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(
        session: VoiceSession,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        bot: &BotConfig,
    ) -> Self {
        let tracked = TrackedMember::new(bot.target_member.map(MemberId));
        let observer = DisconnectObserver::new(
            session.clone(),
            tracked.clone(),
            bot.agent_member.map(MemberId),
        );
        let pipeline = Pipeline::new(
            session.clone(),
            synthesizer,
            tracked.clone(),
            bot.command_prefix.clone(),
        );
        Self {
            session,
            tracked,
            observer,
            pipeline,
        }
    }
}

/// Maximum request body size (256 KiB).
const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/voice/status", get(api::status_handler))
        .route("/api/voice/join", post(api::join_handler))
        .route("/api/voice/leave", post(api::leave_handler))
        .route("/api/voice/say", post(api::say_handler))
        .route("/api/target", put(api::set_target_handler))
        .route("/api/events/text", post(api::text_event_handler))
        .route("/api/events/membership", post(api::membership_event_handler))
        .route("/api/events/fault", post(api::fault_event_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
