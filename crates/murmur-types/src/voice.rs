//! Voice profile and model definitions.
//!
//! A `VoiceProfile` maps a logical ID to a specific TTS backend and its
//! parameters.

use serde::{Deserialize, Serialize};

/// Supported TTS backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceModel {
    /// ElevenLabs-compatible cloud API.
    #[default]
    ElevenLabs,
    /// Piper TTS (ONNX-based, fast, local).
    Piper,
    /// System TTS (`espeak-ng`).
    System,
}

/// A voice profile configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Unique identifier for the voice profile.
    pub id: String,
    /// The TTS backend.
    #[serde(default)]
    pub model: VoiceModel,
    /// Remote voice id (ElevenLabs) or model file path (Piper).
    pub voice: String,
    /// Remote model id, e.g. `eleven_flash_v2`. Ignored by local backends.
    #[serde(default)]
    pub model_id: Option<String>,
    /// Speech speed multiplier (1.0 is normal).
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Voice stability (remote backends only).
    #[serde(default = "default_half")]
    pub stability: f32,
    /// Similarity boost (remote backends only).
    #[serde(default = "default_half")]
    pub similarity_boost: f32,
    /// Speaker ID within a multi-speaker model (0-indexed).
    #[serde(default)]
    pub speaker_id: Option<u32>,
}

fn default_speed() -> f32 {
    1.0
}

fn default_half() -> f32 {
    0.5
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            model: VoiceModel::ElevenLabs,
            voice: String::new(),
            model_id: Some("eleven_flash_v2".to_string()),
            speed: default_speed(),
            stability: default_half(),
            similarity_boost: default_half(),
            speaker_id: None,
        }
    }
}
