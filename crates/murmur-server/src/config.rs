//! Agent configuration loading from file and environment variables.

use murmur_voice::{ConnectionConfig, TransportConfig, TtsConfig};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP surface settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Who is listened to and who the agent is.
    #[serde(default)]
    pub bot: BotConfig,

    /// Connection lifecycle timings and retry bounds.
    #[serde(default)]
    pub voice: ConnectionConfig,

    /// Speech synthesis settings.
    #[serde(default)]
    pub tts: TtsConfig,

    /// Voice transport settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Identities the event pipeline and observer care about.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Member whose messages are spoken. Nothing is spoken while unset.
    #[serde(default)]
    pub target_member: Option<u64>,

    /// The agent's own member id, used to notice forced disconnects.
    #[serde(default)]
    pub agent_member: Option<u64>,

    /// Messages starting with this prefix are commands and never spoken.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "murmur_voice=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3100
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            target_member: None,
            agent_member: None,
            command_prefix: default_command_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `MURMUR_HOST` overrides `server.host`
/// - `MURMUR_PORT` overrides `server.port`
/// - `MURMUR_TARGET_USER` overrides `bot.target_member`
/// - `MURMUR_AGENT_ID` overrides `bot.agent_member`
/// - `MURMUR_TTS_API_KEY` overrides `tts.api_key`
/// - `MURMUR_VOICE_ID` overrides `tts.profile.voice`
/// - `MURMUR_LOG_LEVEL` overrides `logging.level`
/// - `MURMUR_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies `MURMUR_*` overrides using `lookup` to read variables.
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("MURMUR_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("MURMUR_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(target) = lookup("MURMUR_TARGET_USER") {
        if let Ok(parsed) = target.trim().parse() {
            config.bot.target_member = Some(parsed);
        }
    }
    if let Some(agent) = lookup("MURMUR_AGENT_ID") {
        if let Ok(parsed) = agent.trim().parse() {
            config.bot.agent_member = Some(parsed);
        }
    }
    if let Some(key) = lookup("MURMUR_TTS_API_KEY") {
        config.tts.api_key = key;
    }
    if let Some(voice) = lookup("MURMUR_VOICE_ID") {
        config.tts.profile.voice = voice;
    }
    if let Some(level) = lookup("MURMUR_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("MURMUR_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
