use crate::config::TtsConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use murmur_types::voice::{VoiceModel, VoiceProfile};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::debug;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for TTS process execution and remote requests.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// Size of the canonical WAV header written by `espeak-ng --stdout`.
const WAV_HEADER_BYTES: usize = 44;

/// Turns text into audio bytes.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError>;
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Serialize)]
struct RemoteSpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// Service for generating speech from text.
#[derive(Clone)]
pub struct TtsService {
    profiles: Arc<RwLock<HashMap<String, VoiceProfile>>>,
    default_profile: String,
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    voices_dir: PathBuf,
    piper_binary: PathBuf,
}

impl fmt::Debug for TtsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtsService")
            .field("default_profile", &self.default_profile)
            .field("api_base", &self.api_base)
            .field("api_key", &"[REDACTED]")
            .field("voices_dir", &self.voices_dir)
            .field("piper_binary", &self.piper_binary)
            .finish()
    }
}

impl TtsService {
    /// Creates a service whose default voice is `config.profile`.
    pub fn new(config: &TtsConfig) -> Result<Self, VoiceError> {
        let http = reqwest::Client::builder()
            .timeout(TTS_TIMEOUT)
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {}", e)))?;

        let mut profiles = HashMap::new();
        profiles.insert(config.profile.id.clone(), config.profile.clone());

        Ok(Self {
            profiles: Arc::new(RwLock::new(profiles)),
            default_profile: config.profile.id.clone(),
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            voices_dir: config.voices_dir.clone(),
            piper_binary: config.piper_binary.clone(),
        })
    }

    /// Adds a voice profile to the service.
    pub async fn add_profile(&self, profile: VoiceProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile);
    }

    /// Retrieves a voice profile by ID.
    pub async fn get_profile(&self, id: &str) -> Option<VoiceProfile> {
        self.profiles.read().await.get(id).cloned()
    }

    /// Synthesizes speech from the given text using the specified profile.
    pub async fn synthesize_with(
        &self,
        text: &str,
        profile_id: &str,
    ) -> Result<Vec<u8>, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let profile = self
            .get_profile(profile_id)
            .await
            .ok_or_else(|| VoiceError::ProfileNotFound(profile_id.to_string()))?;

        debug!(profile = %profile.id, model = ?profile.model, chars = text.len(), "synthesizing speech");
        match profile.model {
            VoiceModel::ElevenLabs => self.synthesize_remote(text, &profile).await,
            VoiceModel::Piper => self.synthesize_piper(text, &profile).await,
            VoiceModel::System => self.synthesize_system(text, &profile).await,
        }
    }

    async fn synthesize_remote(
        &self,
        text: &str,
        profile: &VoiceProfile,
    ) -> Result<Vec<u8>, VoiceError> {
        if self.api_key.is_empty() {
            return Err(VoiceError::Config(
                "TTS API key is not configured. Set tts.api_key in config \
                 or the MURMUR_TTS_API_KEY environment variable."
                    .to_string(),
            ));
        }
        if profile.voice.is_empty() {
            return Err(VoiceError::Config("voice id is empty".to_string()));
        }

        let url = format!("{}/v1/text-to-speech/{}", self.api_base, profile.voice);
        let body = RemoteSpeechRequest {
            text,
            model_id: profile.model_id.as_deref().unwrap_or("eleven_flash_v2"),
            voice_settings: VoiceSettings {
                stability: profile.stability,
                similarity_boost: profile.similarity_boost,
            },
        };

        let response = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Tts(format!("TTS request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!(
                "TTS API returned {}: {}",
                status, detail
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| VoiceError::Tts(format!("failed to read TTS response: {}", e)))?;
        Ok(audio.to_vec())
    }

    async fn synthesize_piper(
        &self,
        text: &str,
        profile: &VoiceProfile,
    ) -> Result<Vec<u8>, VoiceError> {
        let model_path = if Path::new(&profile.voice).is_absolute() {
            PathBuf::from(&profile.voice)
        } else {
            self.voices_dir.join(&profile.voice)
        };

        if !model_path.exists() {
            return Err(VoiceError::Tts(format!(
                "Model file not found: {:?}",
                model_path
            )));
        }

        if profile.speed < 0.1 || profile.speed > 10.0 {
            return Err(VoiceError::Config(
                "Speed must be between 0.1 and 10.0".to_string(),
            ));
        }

        let mut command = Command::new(&self.piper_binary);
        command
            .arg("--model")
            .arg(model_path)
            .arg("--output_raw")
            // length scale is the inverse of speed
            .arg("--length_scale")
            .arg((1.0 / profile.speed).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(speaker) = profile.speaker_id {
            command.arg("--speaker").arg(speaker.to_string());
        }

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("Failed to spawn piper: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Tts("Failed to open stdin".to_string()))?;
        let text_owned = text.to_string();

        // Write from a separate task so a full stdout pipe cannot deadlock us.
        let write_task = tokio::spawn(async move { stdin.write_all(text_owned.as_bytes()).await });

        let output = tokio::time::timeout(TTS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Tts(format!(
                    "TTS process timed out after {} seconds",
                    TTS_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Tts(format!("Failed to wait for piper: {}", e)))?;

        match write_task.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::Tts(format!(
                    "Failed to write to piper stdin: {}",
                    e
                )))
            }
            Err(e) => return Err(VoiceError::Tts(format!("Stdin task failed: {}", e))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Tts(format!("Piper failed: {}", stderr)));
        }

        Ok(output.stdout)
    }

    /// Synthesizes speech with `espeak-ng`, returning raw PCM.
    async fn synthesize_system(
        &self,
        text: &str,
        profile: &VoiceProfile,
    ) -> Result<Vec<u8>, VoiceError> {
        let mut command = Command::new("espeak-ng");
        command.arg("--stdout");
        if !profile.voice.is_empty() {
            command.arg("-v").arg(&profile.voice);
        }
        // espeak-ng speaks at 175 words per minute by default
        let wpm = (175.0 * profile.speed.clamp(0.1, 10.0)).round() as u32;
        command
            .arg("-s")
            .arg(wpm.to_string())
            .arg(text)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("Failed to spawn espeak-ng: {}", e)))?;

        let output = tokio::time::timeout(TTS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Tts(format!(
                    "System TTS process timed out after {} seconds",
                    TTS_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Tts(format!("Failed to wait for espeak-ng: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Tts(format!("espeak-ng failed: {}", stderr)));
        }

        Ok(strip_wav_header(output.stdout))
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsService {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        self.synthesize_with(text, &self.default_profile).await
    }
}

fn strip_wav_header(wav: Vec<u8>) -> Vec<u8> {
    if wav.len() > WAV_HEADER_BYTES && wav.starts_with(b"RIFF") {
        wav[WAV_HEADER_BYTES..].to_vec()
    } else {
        wav
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(profile: VoiceProfile) -> TtsService {
        TtsService::new(&TtsConfig {
            profile,
            ..TtsConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn oversized_input_is_rejected_before_any_backend() {
        let tts = service(VoiceProfile::default());
        let text = "a".repeat(MAX_TTS_INPUT_BYTES + 1);
        let err = tts.synthesize(&text).await.unwrap_err();
        assert!(matches!(err, VoiceError::Tts(msg) if msg.contains("maximum size")));
    }

    #[tokio::test]
    async fn unknown_profile_is_reported() {
        let tts = service(VoiceProfile::default());
        let err = tts.synthesize_with("hello", "missing").await.unwrap_err();
        assert!(matches!(err, VoiceError::ProfileNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn remote_backend_requires_api_key() {
        let tts = service(VoiceProfile::default());
        let err = tts.synthesize("hello").await.unwrap_err();
        assert!(matches!(err, VoiceError::Config(_)));
    }

    #[tokio::test]
    async fn piper_reports_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let tts = TtsService::new(&TtsConfig {
            profile: VoiceProfile {
                id: "piper".to_string(),
                model: VoiceModel::Piper,
                voice: "absent.onnx".to_string(),
                ..VoiceProfile::default()
            },
            voices_dir: dir.path().to_path_buf(),
            ..TtsConfig::default()
        })
        .unwrap();
        let err = tts.synthesize("hello").await.unwrap_err();
        assert!(matches!(err, VoiceError::Tts(msg) if msg.contains("Model file not found")));
    }

    #[tokio::test]
    async fn profiles_can_be_added() {
        let tts = service(VoiceProfile::default());
        tts.add_profile(VoiceProfile {
            id: "robot".to_string(),
            model: VoiceModel::System,
            ..VoiceProfile::default()
        })
        .await;
        assert_eq!(
            tts.get_profile("robot").await.map(|p| p.model),
            Some(VoiceModel::System)
        );
    }

    #[test]
    fn wav_header_is_stripped_only_from_wav() {
        let mut wav = b"RIFF".to_vec();
        wav.resize(WAV_HEADER_BYTES, 0);
        wav.extend_from_slice(&[1, 2, 3]);
        assert_eq!(strip_wav_header(wav), vec![1, 2, 3]);
        assert_eq!(strip_wav_header(vec![9; 50]), vec![9; 50]);
    }
}
