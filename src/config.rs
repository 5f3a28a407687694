//! Environment-driven configuration.
//!
//! All settings come from `DEXHUB_*` environment variables (a `.env` file is
//! honored by the binary). Rate-limit parameters live here so deployments can
//! tune them without touching the algorithm.

use std::net::SocketAddr;
use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::trust::rate_limit::{BucketParams, RateLimitConfig};

const DEFAULT_BIND: &str = "0.0.0.0:5000";
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Where synthesized speech comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsMode {
    /// Local `say` subprocess.
    #[default]
    Local,
    /// Google Gemini TTS REST API.
    Gemini,
}

impl std::str::FromStr for TtsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(TtsMode::Local),
            "gemini" => Ok(TtsMode::Gemini),
            other => Err(format!("unknown TTS mode: {other}")),
        }
    }
}

/// Speech engine settings.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub tts_mode: TtsMode,
    /// Required when `tts_mode` is `gemini`.
    pub gemini_api_key: Option<SecretString>,
    pub gemini_voice: String,
    /// Whisper-compatible CLI invoked for transcription.
    pub stt_command: String,
    pub stt_args: Vec<String>,
}

/// Full gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub registry_path: PathBuf,
    pub allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub rate_limits: RateLimitConfig,
    pub speech: SpeechConfig,
}

impl Config {
    /// Read configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind = env_or("DEXHUB_BIND", DEFAULT_BIND)
            .parse()
            .map_err(|e| invalid("DEXHUB_BIND", e))?;

        let registry_path = match env_opt("DEXHUB_REGISTRY_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_registry_path(),
        };

        let allowed_origins = match env_opt("DEXHUB_ALLOWED_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => default_origins(),
        };

        let max_body_bytes = match env_opt("DEXHUB_MAX_BODY_BYTES") {
            Some(raw) => raw
                .parse()
                .map_err(|e| invalid("DEXHUB_MAX_BODY_BYTES", e))?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        let defaults = RateLimitConfig::default();
        let rate_limits = RateLimitConfig {
            recognition: bucket_from_env("DEXHUB_RATE_RECOGNITION", defaults.recognition)?,
            general: bucket_from_env("DEXHUB_RATE_GENERAL", defaults.general)?,
        };

        let tts_mode: TtsMode = match env_opt("DEXHUB_TTS_MODE") {
            Some(raw) => raw
                .parse()
                .map_err(|e: String| invalid("DEXHUB_TTS_MODE", e))?,
            None => TtsMode::default(),
        };
        let gemini_api_key = env_opt("DEXHUB_GEMINI_API_KEY").map(SecretString::from);
        if tts_mode == TtsMode::Gemini && gemini_api_key.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "DEXHUB_GEMINI_API_KEY".to_string(),
            ));
        }

        let speech = SpeechConfig {
            tts_mode,
            gemini_api_key,
            gemini_voice: env_or("DEXHUB_GEMINI_VOICE", "Puck"),
            stt_command: env_or("DEXHUB_STT_COMMAND", "whisper-cli"),
            stt_args: match env_opt("DEXHUB_STT_ARGS") {
                Some(raw) => raw.split_whitespace().map(str::to_string).collect(),
                None => Vec::new(),
            },
        };

        Ok(Self {
            bind,
            registry_path,
            allowed_origins,
            max_body_bytes,
            rate_limits,
            speech,
        })
    }
}

fn default_registry_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("dexhub"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("device_registry.json")
}

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:1420".to_string(),
        "tauri://localhost".to_string(),
    ]
}

fn bucket_from_env(prefix: &str, defaults: BucketParams) -> Result<BucketParams, ConfigError> {
    let capacity = match env_opt(&format!("{prefix}_CAPACITY")) {
        Some(raw) => raw
            .parse()
            .map_err(|e| invalid(&format!("{prefix}_CAPACITY"), e))?,
        None => defaults.capacity,
    };
    let refill_per_sec = match env_opt(&format!("{prefix}_REFILL_PER_MIN")) {
        Some(raw) => {
            let per_min: f64 = raw
                .parse()
                .map_err(|e| invalid(&format!("{prefix}_REFILL_PER_MIN"), e))?;
            per_min / 60.0
        }
        None => defaults.refill_per_sec,
    };
    Ok(BucketParams {
        capacity,
        refill_per_sec,
    })
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn invalid(key: &str, message: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
