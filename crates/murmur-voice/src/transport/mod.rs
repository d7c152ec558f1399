//! The transport seam between the lifecycle manager and a voice backend.
//!
//! A [`VoiceTransport`] opens connections; a [`VoiceConnection`] is one live
//! session. The lifecycle manager only ever talks to these traits, so tests can
//! script arbitrary failure sequences and the binary can pick a concrete
//! backend at startup.

mod loopback;
mod process;

pub use loopback::LoopbackTransport;
pub use process::ProcessSinkTransport;

use async_trait::async_trait;
use murmur_types::{CloseCode, SessionTarget};
use thiserror::Error;

/// A raw failure reported by a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect timed out")]
    Timeout,

    #[error("connection closed with code {code}: {reason}")]
    Closed { code: u16, reason: String },

    #[error("already connected to a voice channel")]
    AlreadyConnected,

    #[error("connection is not alive")]
    NotAlive,

    #[error("{0}")]
    Other(String),
}

/// Recovery class of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Timeout or a connect that reported success without a usable transport.
    TransientTimeout,
    /// The backend rejected the session as no longer valid.
    SessionInvalid,
    /// Backend infrastructure issue.
    TransportServerFailure,
    /// The transport already holds a connection local state does not know about.
    AlreadyConnectedConflict,
    /// Anything else. Never retried.
    UnclassifiedFatal,
}

impl FailureClass {
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::UnclassifiedFatal)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::TransientTimeout => "transient_timeout",
            Self::SessionInvalid => "session_invalid",
            Self::TransportServerFailure => "transport_server_failure",
            Self::AlreadyConnectedConflict => "already_connected_conflict",
            Self::UnclassifiedFatal => "unclassified_fatal",
        }
    }
}

impl TransportError {
    /// Maps a transport failure onto its recovery class.
    pub fn classify(&self) -> FailureClass {
        match self {
            Self::Timeout | Self::NotAlive => FailureClass::TransientTimeout,
            Self::Closed { code, .. } => match CloseCode::from_u16(*code) {
                Some(CloseCode::SessionInvalid) => FailureClass::SessionInvalid,
                Some(c) if c.is_server_failure() => FailureClass::TransportServerFailure,
                _ => FailureClass::UnclassifiedFatal,
            },
            Self::AlreadyConnected => FailureClass::AlreadyConnectedConflict,
            Self::Other(msg) if msg.to_lowercase().contains("already connected") => {
                FailureClass::AlreadyConnectedConflict
            }
            Self::Other(_) => FailureClass::UnclassifiedFatal,
        }
    }
}

/// Opens voice connections.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Issues one raw connect call. Callers apply their own timeout.
    async fn connect(
        &self,
        target: &SessionTarget,
    ) -> Result<Box<dyn VoiceConnection>, TransportError>;

    /// Drops any connection the transport still tracks on its own side.
    ///
    /// Called after an already-connected conflict, when the transport and the
    /// lifecycle manager disagree about whether a session exists.
    async fn reset(&self) {}
}

/// One live voice session.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Whether the session is still usable. Queried at time of use; the remote
    /// side can sever the session at any moment.
    fn is_alive(&self) -> bool;

    /// Whether an audio stream is currently being played.
    fn is_playing(&self) -> bool;

    /// Reads the connected channel's name. Fails when the session metadata is
    /// no longer readable.
    fn channel_name(&self) -> Result<String, TransportError>;

    /// Starts playing `audio` and returns without waiting for it to finish.
    fn play(&mut self, audio: Vec<u8>) -> Result<(), TransportError>;

    /// Closes the session.
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}
