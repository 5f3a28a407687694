//! Signed-request authentication.
//!
//! Every protected request carries five headers: device id, millisecond
//! timestamp, nonce, SHA-256 hex digest of the body, and a base64 Ed25519
//! signature over the canonical string
//! `METHOD\nPATH\nTIMESTAMP\nNONCE\nBODY_SHA256_HEX`. The authenticator runs
//! a fixed sequence of checks and the first failure short-circuits; no
//! handler code executes after a rejection.

use std::net::IpAddr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::AuthError;
use crate::trust::nonce::NonceCache;
use crate::trust::rate_limit::{EndpointClass, RateLimitConfig, RateLimiter};
use crate::trust::registry::DeviceRegistry;

/// Maximum absolute skew between the request timestamp and the server clock,
/// accepting both future and past skew.
const TIMESTAMP_WINDOW_MS: i64 = 60_000;

/// Nonce retention. Exceeds the timestamp window so a nonce outlives every
/// request that could legally carry it, scheduling delay included.
const NONCE_TTL_MS: u64 = 65_000;

pub const HEADER_DEVICE_ID: &str = "x-dex-deviceid";
pub const HEADER_TIMESTAMP: &str = "x-dex-timestamp";
pub const HEADER_NONCE: &str = "x-dex-nonce";
pub const HEADER_BODY_SHA256: &str = "x-dex-bodysha256";
pub const HEADER_SIGNATURE: &str = "x-dex-signature";

/// Credential headers as extracted from a request, before presence checks.
#[derive(Debug, Clone, Default)]
pub struct RawCredentials {
    pub device_id: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    pub body_sha256: Option<String>,
    pub signature: Option<String>,
}

/// The five credential fields, all present.
struct Credentials {
    device_id: String,
    timestamp: String,
    nonce: String,
    body_sha256: String,
    signature: String,
}

impl RawCredentials {
    fn require(self) -> Result<Credentials, AuthError> {
        match (
            self.device_id,
            self.timestamp,
            self.nonce,
            self.body_sha256,
            self.signature,
        ) {
            (Some(device_id), Some(timestamp), Some(nonce), Some(body_sha256), Some(signature)) => {
                Ok(Credentials {
                    device_id,
                    timestamp,
                    nonce,
                    body_sha256,
                    signature,
                })
            }
            _ => Err(AuthError::MissingCredentials),
        }
    }
}

/// Produces an accept/reject decision for every incoming protected request.
#[derive(Clone)]
pub struct RequestAuthenticator {
    registry: DeviceRegistry,
    nonces: NonceCache,
    limiter: RateLimiter,
    limits: RateLimitConfig,
}

impl RequestAuthenticator {
    pub fn new(registry: DeviceRegistry, limits: RateLimitConfig) -> Self {
        Self {
            registry,
            nonces: NonceCache::new(),
            limiter: RateLimiter::new(),
            limits,
        }
    }

    /// Run the full check sequence for one request.
    ///
    /// The nonce is committed in check 3, before the device, rate, body and
    /// signature checks. A request rejected by a later check still consumes
    /// its nonce; the caller must mint a fresh one when it retries.
    pub async fn verify(
        &self,
        method: &str,
        path: &str,
        credentials: RawCredentials,
        body: &[u8],
        caller: IpAddr,
    ) -> Result<(), AuthError> {
        // 1. All five credential fields present.
        let credentials = credentials.require()?;

        // 2. Timestamp freshness, symmetric around the server clock.
        let now_ms = Utc::now().timestamp_millis();
        let timestamp: f64 = credentials
            .timestamp
            .parse()
            .map_err(|_| AuthError::InvalidTimestamp)?;
        let skew_ms = (now_ms as f64 - timestamp).abs() as i64;
        if skew_ms > TIMESTAMP_WINDOW_MS {
            return Err(AuthError::RequestExpired { skew_ms });
        }

        // 3. Nonce replay. Committed here regardless of later outcomes.
        let fresh = self
            .nonces
            .check_and_store(
                &credentials.device_id,
                &credentials.nonce,
                now_ms as u64,
                now_ms as u64 + NONCE_TTL_MS,
            )
            .await;
        if !fresh {
            return Err(AuthError::NonceReplay {
                device_id: credentials.device_id,
            });
        }

        // 4. The device must be registered and enabled.
        let record = self
            .registry
            .get(&credentials.device_id)
            .await
            .filter(|r| r.enabled)
            .ok_or_else(|| AuthError::DeviceUnauthorized {
                device_id: credentials.device_id.clone(),
            })?;

        // 5. Rate limiting, skipped entirely for loopback callers.
        if !caller.is_loopback() {
            let class = EndpointClass::for_path(path);
            let consumed = self
                .limiter
                .try_consume(
                    &credentials.device_id,
                    class,
                    now_ms as u64,
                    self.limits.params(class),
                )
                .await;
            if !consumed {
                return Err(AuthError::RateLimited {
                    device_id: credentials.device_id,
                });
            }
        }

        // 6. The claimed digest must match the literal body bytes, so a
        // signature over the digest cannot be paired with a tampered body.
        let body_sha256 = hex::encode(Sha256::digest(body));
        let digest_matches: bool = body_sha256
            .as_bytes()
            .ct_eq(credentials.body_sha256.as_bytes())
            .into();
        if !digest_matches {
            return Err(AuthError::BodyIntegrityFailure);
        }

        // 7. Signature over the canonical string, against the stored key.
        let canonical = format!(
            "{method}\n{path}\n{timestamp}\n{nonce}\n{body_sha256}",
            timestamp = credentials.timestamp,
            nonce = credentials.nonce,
        );
        verify_signature(&record.public_key, canonical.as_bytes(), &credentials.signature)?;

        tracing::debug!(device_id = %credentials.device_id, path = %path, "request authenticated");
        Ok(())
    }
}

/// Verify a base64 signature against a hex-encoded stored key. Any decode or
/// verification failure collapses to `SignatureInvalid`.
fn verify_signature(
    public_key_hex: &str,
    message: &[u8],
    signature_b64: &str,
) -> Result<(), AuthError> {
    let key_bytes: [u8; 32] = hex::decode(public_key_hex)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(AuthError::SignatureInvalid)?;
    let verify_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| AuthError::SignatureInvalid)?;

    let signature_bytes = BASE64
        .decode(signature_b64)
        .map_err(|_| AuthError::SignatureInvalid)?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| AuthError::SignatureInvalid)?;

    verify_key
        .verify(message, &signature)
        .map_err(|_| AuthError::SignatureInvalid)
}
