//! Error types for DexHub.

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device registry persistence errors.
///
/// A failed save is fatal to the operation that triggered it; losing a write
/// would desynchronize trust state between memory and disk.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to load device registry from {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("Failed to persist device registry to {path}: {reason}")]
    Save { path: String, reason: String },
}

/// Request authentication failures.
///
/// Every variant is terminal for the request: it is surfaced to the caller
/// with a specific status and never retried server-side.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication headers")]
    MissingCredentials,

    #[error("Invalid timestamp")]
    InvalidTimestamp,

    #[error("Request expired: {skew_ms}ms outside the freshness window")]
    RequestExpired { skew_ms: i64 },

    #[error("Nonce replay detected for device {device_id}")]
    NonceReplay { device_id: String },

    #[error("Device unauthorized or unknown: {device_id}")]
    DeviceUnauthorized { device_id: String },

    #[error("Rate limit exceeded for device {device_id}")]
    RateLimited { device_id: String },

    #[error("Body integrity check failed")]
    BodyIntegrityFailure,

    #[error("Invalid signature")]
    SignatureInvalid,
}

/// Pairing bootstrap and admin failures.
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("Invalid pairing code")]
    InvalidCode,

    #[error("Pairing code expired")]
    CodeExpired,

    #[error("Proof of possession failed")]
    ProofOfPossessionFailed,

    #[error("Invalid public key: {reason}")]
    InvalidPublicKey { reason: String },

    #[error("Local-only endpoint called from {addr}")]
    LocalOnlyViolation { addr: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Speech engine boundary failures.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("No text provided")]
    EmptyText,

    #[error("Transcription failed: {reason}")]
    TranscriptionFailed { reason: String },

    #[error("Synthesis failed: {reason}")]
    SynthesisFailed { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Gateway server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    #[error("Invalid origin in CORS configuration: {origin}")]
    InvalidOrigin { origin: String },
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;
