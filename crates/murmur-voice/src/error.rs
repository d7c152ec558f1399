use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Voice profile not found: {0}")]
    ProfileNotFound(String),

    #[error("voice session task is not running")]
    SessionClosed,

    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// Terminal outcome of a connection establishment.
///
/// Recoverable transport failures never surface as a `ConnectError`; they are
/// retried inside the establisher until the attempt bound is reached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Every permitted attempt failed with a retryable failure.
    #[error("failed to connect to {channel} after {attempts} attempts (last error: {last_error})")]
    Exhausted {
        channel: String,
        attempts: u32,
        last_error: String,
    },

    /// A failure the establisher does not know how to recover from.
    #[error("failed to connect to {channel}: {reason}")]
    Fatal { channel: String, reason: String },
}
