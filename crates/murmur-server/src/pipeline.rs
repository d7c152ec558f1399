//! Text event pipeline: qualify, connect, clean, synthesize, play.
//!
//! Failures along the way never propagate. An utterance that cannot be spoken
//! right now is dropped and reported as an [`Outcome`]; the next event starts
//! from scratch.

use crate::sanitize::clean_text;
use murmur_types::{SessionTarget, TextEvent};
use murmur_voice::{Rejected, SpeechSynthesizer, Started, TrackedMember, Unready, VoiceSession};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why an event was not considered at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// No member is being tracked.
    NoTarget,
    /// The sender is not the tracked member.
    OtherSender,
    /// The message is empty.
    Empty,
    /// The message is a command.
    Command,
    /// Nothing speakable was left after cleaning.
    NothingToSay,
}

/// Why a qualifying utterance was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DropReason {
    /// The session could not be brought to the sender's channel.
    Unready(String),
    /// The connection went away before synthesis.
    Disconnected,
    /// The synthesis backend failed.
    Synthesis(String),
    /// Another utterance is still playing.
    Busy,
    /// The transport refused to play.
    Playback(String),
}

/// Result of pushing one event through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Ignored { reason: IgnoreReason },
    Dropped { reason: DropReason },
    Speaking { started: Started },
}

#[derive(Clone)]
pub struct Pipeline {
    session: VoiceSession,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    tracked: TrackedMember,
    command_prefix: String,
}

impl Pipeline {
    pub fn new(
        session: VoiceSession,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        tracked: TrackedMember,
        command_prefix: impl Into<String>,
    ) -> Self {
        Self {
            session,
            synthesizer,
            tracked,
            command_prefix: command_prefix.into(),
        }
    }

    /// Handles a text message from the chat framework.
    pub async fn handle_text(&self, event: &TextEvent) -> Outcome {
        let Some(tracked) = self.tracked.get() else {
            return ignored(IgnoreReason::NoTarget);
        };
        if event.sender_id != tracked {
            return ignored(IgnoreReason::OtherSender);
        }
        if event.content.trim().is_empty() {
            return ignored(IgnoreReason::Empty);
        }
        if !self.command_prefix.is_empty() && event.content.starts_with(&self.command_prefix) {
            return ignored(IgnoreReason::Command);
        }

        if let Err(e) = self.session.ensure(event.sender_channel.clone()).await {
            match &e {
                Unready::NoChannel => info!(sender = %event.sender_id, "sender is not in a voice channel"),
                _ => warn!(sender = %event.sender_id, "failed to establish voice connection: {}", e),
            }
            return dropped(DropReason::Unready(e.to_string()));
        }

        let Some(text) = clean_text(&event.content, &event.mentions) else {
            return ignored(IgnoreReason::NothingToSay);
        };
        debug!(sender = %event.sender_id, %text, "speaking message");
        self.speak(&text).await
    }

    /// Speaks `text`, first moving to `channel` when one is given.
    pub async fn say(&self, text: &str, channel: Option<SessionTarget>) -> Outcome {
        let text = text.trim();
        if text.is_empty() {
            return ignored(IgnoreReason::Empty);
        }
        if channel.is_some() {
            if let Err(e) = self.session.ensure(channel).await {
                return dropped(DropReason::Unready(e.to_string()));
            }
        }
        self.speak(text).await
    }

    async fn speak(&self, text: &str) -> Outcome {
        match self.session.status().await {
            Ok(status) if status.connected => {}
            _ => {
                info!("voice client disconnected before synthesis");
                return dropped(DropReason::Disconnected);
            }
        }

        let audio = match self.synthesizer.synthesize(text).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!("failed to generate speech: {}", e);
                return dropped(DropReason::Synthesis(e.to_string()));
            }
        };

        match self.session.play(audio).await {
            Ok(started) => Outcome::Speaking { started },
            Err(Rejected::NotConnected) => dropped(DropReason::Disconnected),
            Err(Rejected::AlreadyPlaying) => dropped(DropReason::Busy),
            Err(Rejected::Failed(msg)) => dropped(DropReason::Playback(msg)),
        }
    }
}

fn ignored(reason: IgnoreReason) -> Outcome {
    Outcome::Ignored { reason }
}

fn dropped(reason: DropReason) -> Outcome {
    Outcome::Dropped { reason }
}
