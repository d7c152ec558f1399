//! Shared types for the murmur workspace.
//!
//! This crate holds the data that crosses crate boundaries: identities of
//! chat members and voice channels, the inbound events delivered by the chat
//! framework, transport close codes, and voice profile definitions.
//!
//! Nothing in here performs I/O. The voice lifecycle logic lives in
//! `murmur-voice`; the HTTP surface and event pipeline live in
//! `murmur-server`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

pub mod voice;

/// Identifier of a chat member (a human user or the agent itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a voice channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The remote voice channel the agent should be connected to.
///
/// Two targets are the same channel when their ids match; the display name is
/// carried for logging and may change (channel renames) without the target
/// being considered different.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTarget {
    /// Channel identifier.
    pub channel_id: ChannelId,
    /// Human-readable channel name.
    pub name: String,
}

impl SessionTarget {
    pub fn new(channel_id: u64, name: impl Into<String>) -> Self {
        Self {
            channel_id: ChannelId(channel_id),
            name: name.into(),
        }
    }
}

impl PartialEq for SessionTarget {
    fn eq(&self, other: &Self) -> bool {
        self.channel_id == other.channel_id
    }
}

impl Eq for SessionTarget {}

impl Hash for SessionTarget {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.channel_id.hash(state);
    }
}

impl fmt::Display for SessionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.channel_id)
    }
}

/// Kind of entity referenced by an inline mention token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionKind {
    /// `<@id>` or `<@!id>`.
    User,
    /// `<@&id>`.
    Role,
    /// `<#id>`.
    Channel,
}

/// A mention resolved by the chat framework, used to make message text
/// speakable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub kind: MentionKind,
    pub id: u64,
    /// Display name, role name, or channel name.
    pub name: String,
}

/// A text message delivered by the chat framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEvent {
    /// Author of the message.
    pub sender_id: MemberId,
    /// Raw message content.
    pub content: String,
    /// Voice channel the author currently sits in, if any.
    #[serde(default)]
    pub sender_channel: Option<SessionTarget>,
    /// Mentions contained in `content`, already resolved to names.
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

/// A voice membership change for a single member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub member_id: MemberId,
    #[serde(default)]
    pub previous_channel: Option<SessionTarget>,
    #[serde(default)]
    pub new_channel: Option<SessionTarget>,
}

impl MembershipEvent {
    /// Returns `true` when the member was in a voice channel and now is in none.
    ///
    /// Moves between channels and joins are not departures.
    pub fn left_voice(&self) -> bool {
        self.previous_channel.is_some() && self.new_channel.is_none()
    }
}

/// An out-of-band fault surfaced by the chat framework or the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultNotification {
    /// Name of the framework event during which the fault was raised.
    pub event: String,
    /// Numeric close code, when the fault carries one.
    #[serde(default)]
    pub code: Option<u16>,
    /// Free-form description (error text, traceback, ...).
    #[serde(default)]
    pub detail: String,
}

/// Voice gateway close codes the lifecycle manager distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    /// The backend no longer considers the session valid.
    SessionInvalid = 4006,
    /// The connection was closed by the backend (kicked, channel deleted).
    Disconnected = 4014,
    /// The voice server crashed.
    VoiceServerCrashed = 4015,
}

impl CloseCode {
    /// Returns the numeric code.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Attempts to convert a numeric code to a known `CloseCode`.
    ///
    /// Returns `None` for codes the lifecycle manager does not classify.
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            4006 => Some(Self::SessionInvalid),
            4014 => Some(Self::Disconnected),
            4015 => Some(Self::VoiceServerCrashed),
            _ => None,
        }
    }

    /// Returns the string label for this code.
    pub fn label(self) -> &'static str {
        match self {
            Self::SessionInvalid => "SESSION_INVALID",
            Self::Disconnected => "DISCONNECTED",
            Self::VoiceServerCrashed => "VOICE_SERVER_CRASHED",
        }
    }

    /// Returns `true` for codes that indicate a backend infrastructure issue.
    pub fn is_server_failure(self) -> bool {
        matches!(self, Self::Disconnected | Self::VoiceServerCrashed)
    }
}
