use crate::backoff::BackoffPolicy;
use murmur_types::voice::VoiceProfile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

fn default_max_attempts() -> u32 {
    3
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_cooldown_ms() -> u64 {
    5_000
}

fn default_stabilize_ms() -> u64 {
    500
}

fn default_migrate_delay_ms() -> u64 {
    1_000
}

fn default_conflict_delay_ms() -> u64 {
    1_000
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_cap_ms() -> u64 {
    10_000
}

fn default_session_invalid_base_ms() -> u64 {
    3_000
}

fn default_session_invalid_step_ms() -> u64 {
    2_000
}

fn default_server_failure_base_ms() -> u64 {
    2_000
}

fn default_server_failure_step_ms() -> u64 {
    1_000
}

/// Timing and retry settings for the voice connection lifecycle.
///
/// All durations are in milliseconds so the table stays readable in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connect attempts per establish call. Default: 3.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Hard timeout for a single connect call. Default: 30 s.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Minimum quiet period after a teardown before connecting again. Default: 5 s.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Pause between a successful connect and the liveness re-check. Default: 500 ms.
    #[serde(default = "default_stabilize_ms")]
    pub stabilize_ms: u64,
    /// Pause between leaving one channel and joining another. Default: 1 s.
    #[serde(default = "default_migrate_delay_ms")]
    pub migrate_delay_ms: u64,
    /// Retry delay after an already-connected conflict. Default: 1 s.
    #[serde(default = "default_conflict_delay_ms")]
    pub conflict_delay_ms: u64,
    /// First retry delay for generic transient failures. Default: 1 s.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Ceiling for generic transient retry delays. Default: 10 s.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Base delay after a session-invalid close. Default: 3 s.
    #[serde(default = "default_session_invalid_base_ms")]
    pub session_invalid_base_ms: u64,
    /// Per-attempt increment after a session-invalid close. Default: 2 s.
    #[serde(default = "default_session_invalid_step_ms")]
    pub session_invalid_step_ms: u64,
    /// Base delay after a voice server failure. Default: 2 s.
    #[serde(default = "default_server_failure_base_ms")]
    pub server_failure_base_ms: u64,
    /// Per-attempt increment after a voice server failure. Default: 1 s.
    #[serde(default = "default_server_failure_step_ms")]
    pub server_failure_step_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            connect_timeout_ms: default_connect_timeout_ms(),
            cooldown_ms: default_cooldown_ms(),
            stabilize_ms: default_stabilize_ms(),
            migrate_delay_ms: default_migrate_delay_ms(),
            conflict_delay_ms: default_conflict_delay_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            session_invalid_base_ms: default_session_invalid_base_ms(),
            session_invalid_step_ms: default_session_invalid_step_ms(),
            server_failure_base_ms: default_server_failure_base_ms(),
            server_failure_step_ms: default_server_failure_step_ms(),
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stabilize(&self) -> Duration {
        Duration::from_millis(self.stabilize_ms)
    }

    pub fn migrate_delay(&self) -> Duration {
        Duration::from_millis(self.migrate_delay_ms)
    }

    /// Builds the backoff policy described by this configuration.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.max_attempts,
            base: Duration::from_millis(self.backoff_base_ms),
            cap: Duration::from_millis(self.backoff_cap_ms),
            session_invalid_base: Duration::from_millis(self.session_invalid_base_ms),
            session_invalid_step: Duration::from_millis(self.session_invalid_step_ms),
            server_failure_base: Duration::from_millis(self.server_failure_base_ms),
            server_failure_step: Duration::from_millis(self.server_failure_step_ms),
            conflict_delay: Duration::from_millis(self.conflict_delay_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }
}

fn default_api_base() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_piper_binary() -> PathBuf {
    PathBuf::from("piper")
}

fn default_voices_dir() -> PathBuf {
    PathBuf::from("assets/voices")
}

/// Speech synthesis settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Voice used for every utterance.
    #[serde(default)]
    pub profile: VoiceProfile,
    /// Base URL of the remote TTS API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// API key for the remote TTS API.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Directory that relative Piper model paths resolve against.
    #[serde(default = "default_voices_dir")]
    pub voices_dir: PathBuf,
    /// Path to the Piper executable.
    #[serde(default = "default_piper_binary")]
    pub piper_binary: PathBuf,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            profile: VoiceProfile::default(),
            api_base: default_api_base(),
            api_key: String::new(),
            voices_dir: default_voices_dir(),
            piper_binary: default_piper_binary(),
        }
    }
}

impl fmt::Debug for TtsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtsConfig")
            .field("profile", &self.profile)
            .field("api_base", &self.api_base)
            .field("api_key", &"[REDACTED]")
            .field("voices_dir", &self.voices_dir)
            .field("piper_binary", &self.piper_binary)
            .finish()
    }
}

/// Which transport carries audio to the voice backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// In-memory transport; nothing leaves the process.
    #[default]
    Loopback,
    /// One long-lived sink process per connection, fed through stdin.
    Process,
}

fn default_bytes_per_second() -> u64 {
    // s16le mono at 22050 Hz
    44_100
}

/// Transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    /// Sink program for the process transport.
    #[serde(default)]
    pub program: String,
    /// Sink arguments. `{channel}` and `{channel_id}` are substituted per connection.
    #[serde(default)]
    pub args: Vec<String>,
    /// Audio byte rate used to model how long a playback occupies the connection.
    #[serde(default = "default_bytes_per_second")]
    pub bytes_per_second: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            program: String::new(),
            args: Vec::new(),
            bytes_per_second: default_bytes_per_second(),
        }
    }
}
