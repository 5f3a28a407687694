//! Text-to-speech boundary.
//!
//! Two implementations: a local `say` subprocess writing AIFF, and the
//! Google Gemini TTS REST API returning PCM. Both hand back base64 audio so
//! the HTTP layer never touches raw sample data.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::SpeechError;

/// Synthesized audio, base64-encoded.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesizedAudio {
    pub audio: String,
    pub format: String,
}

/// Turns text into audible speech.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SpeechError>;
}

/// Local synthesis via the macOS `say` command into a temp AIFF file.
pub struct SayCommand {
    command: String,
}

impl SayCommand {
    pub fn new() -> Self {
        Self {
            command: "say".to_string(),
        }
    }

    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for SayCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Synthesizer for SayCommand {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SpeechError> {
        let aiff = tempfile::Builder::new()
            .prefix("dexhub-tts-")
            .suffix(".aiff")
            .tempfile()?;

        let output = tokio::process::Command::new(&self.command)
            .arg("-o")
            .arg(aiff.path())
            .arg(text)
            .output()
            .await?;

        if !output.status.success() {
            return Err(SpeechError::SynthesisFailed {
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let audio = tokio::fs::read(aiff.path()).await?;
        Ok(SynthesizedAudio {
            audio: BASE64.encode(audio),
            format: "aiff".to_string(),
        })
    }
}

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const GEMINI_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Transient cloud failures are retried on this schedule before giving up.
const RETRY_BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Cloud synthesis via the Google Gemini TTS REST API.
pub struct GeminiTts {
    client: reqwest::Client,
    api_key: SecretString,
    voice: String,
    base_url: String,
    backoff: Vec<Duration>,
}

impl GeminiTts {
    pub fn new(api_key: SecretString, voice: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            voice: voice.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            backoff: RETRY_BACKOFF.to_vec(),
        }
    }

    /// Point at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the retry schedule (tests).
    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    fn request_body(&self, text: &str) -> GeminiTtsRequest {
        GeminiTtsRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiTextPart {
                    text: text.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: GeminiSpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice.clone(),
                        },
                    },
                },
            },
        }
    }

    async fn attempt(&self, body: &GeminiTtsRequest) -> Result<String, String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, GEMINI_TTS_MODEL
        );
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let parsed: GeminiTtsResponse = response.json().await.map_err(|e| e.to_string())?;
        extract_audio(parsed).ok_or_else(|| "no audio in response".to_string())
    }
}

#[async_trait]
impl Synthesizer for GeminiTts {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SpeechError> {
        let body = self.request_body(text);
        let mut last_failure = String::new();

        for (attempt, delay) in self.backoff.iter().enumerate() {
            match self.attempt(&body).await {
                Ok(audio) => {
                    return Ok(SynthesizedAudio {
                        audio,
                        format: "pcm".to_string(),
                    });
                }
                Err(reason) => {
                    tracing::warn!(attempt = attempt + 1, %reason, "cloud TTS attempt failed");
                    last_failure = reason;
                }
            }
            tokio::time::sleep(*delay).await;
        }

        Err(SpeechError::SynthesisFailed {
            reason: format!(
                "cloud TTS failed after {} attempts: {last_failure}",
                self.backoff.len()
            ),
        })
    }
}

/// Pull the base64 audio out of the first candidate part.
fn extract_audio(response: GeminiTtsResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content
        .parts
        .into_iter()
        .next()?
        .inline_data
        .map(|data| data.data)
}

#[derive(Debug, Serialize)]
struct GeminiTtsRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiTextPart>,
}

#[derive(Debug, Serialize)]
struct GeminiTextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
    speech_config: GeminiSpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiSpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Deserialize)]
struct GeminiTtsResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(rename = "inlineData")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Deserialize)]
struct GeminiInlineData {
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gemini() -> GeminiTts {
        GeminiTts::new(SecretString::from("test-key".to_string()), "Puck")
    }

    #[test]
    fn test_request_body_matches_api_shape() {
        let body = gemini().request_body("hello");
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(value["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            value["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Puck"
        );
    }

    #[test]
    fn test_extract_audio_from_response() {
        let response: GeminiTtsResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [{ "inlineData": { "data": "cGNtLWJ5dGVz" } }]
                }
            }]
        }))
        .unwrap();

        assert_eq!(extract_audio(response).unwrap(), "cGNtLWJ5dGVz");
    }

    #[test]
    fn test_extract_audio_handles_empty_response() {
        let response: GeminiTtsResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(extract_audio(response).is_none());

        let response: GeminiTtsResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{ "content": { "parts": [{}] } }]
        }))
        .unwrap();
        assert!(extract_audio(response).is_none());
    }

    #[test]
    fn test_default_backoff_schedule() {
        let tts = gemini();
        assert_eq!(
            tts.backoff,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_say_failure_surfaces_synthesis_error() {
        let synthesizer = SayCommand::with_command("false");
        let err = synthesizer.synthesize("hello").await.unwrap_err();
        assert!(matches!(err, SpeechError::SynthesisFailed { .. }));
    }

    #[tokio::test]
    async fn test_gemini_gives_up_after_backoff_exhausted() {
        // Unroutable endpoint with a zero-length schedule of one instant
        // retry: the error must surface as SynthesisFailed, not hang.
        let tts = gemini()
            .with_base_url("http://127.0.0.1:1")
            .with_backoff(vec![Duration::from_millis(0)]);
        let err = tts.synthesize("hello").await.unwrap_err();
        assert!(matches!(err, SpeechError::SynthesisFailed { .. }));
    }
}
