//! Drop-if-busy playback over the current connection.

use crate::state::ConnectionState;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Playback was handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Started {
    pub session_id: Uuid,
    pub bytes: usize,
}

/// Why an utterance was dropped instead of played.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejected {
    #[error("not connected to a voice channel")]
    NotConnected,

    #[error("audio is already playing")]
    AlreadyPlaying,

    #[error("playback failed: {0}")]
    Failed(String),
}

/// Starts playing `audio` on the current connection.
///
/// Preconditions are read from `state` at call time. Nothing is queued: a
/// request that cannot start right now is rejected and the audio discarded.
pub fn start(state: &mut ConnectionState, audio: Vec<u8>) -> Result<Started, Rejected> {
    let Some(active) = state.active_mut().filter(|active| active.is_alive()) else {
        info!("voice session not connected, skipping playback");
        return Err(Rejected::NotConnected);
    };

    if active.connection().is_playing() {
        info!(channel = %active.target(), "audio is already playing, skipping");
        return Err(Rejected::AlreadyPlaying);
    }

    let bytes = audio.len();
    let session_id = active.session_id();
    match active.connection_mut().play(audio) {
        Ok(()) => {
            info!(channel = %active.target(), bytes, "playback started");
            Ok(Started { session_id, bytes })
        }
        Err(e) => {
            warn!(channel = %active.target(), "failed to start playback: {}", e);
            Err(Rejected::Failed(e.to_string()))
        }
    }
}
