//! Proof-of-possession device pairing.
//!
//! Pairing runs on an unauthenticated bootstrap path: a loopback-only caller
//! requests a short-lived 6-digit code, delivers it to the new device out of
//! band, and the device exchanges the code plus a signature over
//! `PAIR:<code>` for a trusted registry entry. The signature proves control
//! of the private key matching the submitted public key without ever
//! transmitting that key.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::Rng;
use tokio::sync::Mutex;

use crate::error::PairingError;
use crate::trust::registry::{derive_device_id, DeviceRecord, DeviceRegistry, DeviceRole};

/// Lifetime of a pairing code.
const CODE_TTL: Duration = Duration::from_secs(300);

/// Out-of-band delivery channel for freshly generated pairing codes.
///
/// Keeps the coordinator decoupled from any specific output mechanism; the
/// production implementation prints to the operator console.
pub trait CodeDelivery: Send + Sync {
    fn deliver(&self, code: &str);
}

/// Prints pairing codes to the operator console.
pub struct ConsoleDelivery;

impl CodeDelivery for ConsoleDelivery {
    fn deliver(&self, code: &str) {
        println!("*** PAIRING CODE: {code} ***");
    }
}

/// Manages pending pairing codes and turns confirmed proofs into registry
/// entries.
#[derive(Clone)]
pub struct PairingCoordinator {
    registry: DeviceRegistry,
    /// code -> creation time.
    pending: Arc<Mutex<HashMap<String, Instant>>>,
    delivery: Arc<dyn CodeDelivery>,
    code_ttl: Duration,
}

impl PairingCoordinator {
    pub fn new(registry: DeviceRegistry, delivery: Arc<dyn CodeDelivery>) -> Self {
        Self {
            registry,
            pending: Arc::new(Mutex::new(HashMap::new())),
            delivery,
            code_ttl: CODE_TTL,
        }
    }

    /// Override the code lifetime (tests).
    pub fn with_code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    /// Generate a fresh single-use code and hand it to the delivery channel.
    /// Loopback callers only.
    pub async fn request_pairing(&self, caller: IpAddr) -> Result<String, PairingError> {
        if !caller.is_loopback() {
            return Err(PairingError::LocalOnlyViolation {
                addr: caller.to_string(),
            });
        }

        let code = generate_code();
        self.pending
            .lock()
            .await
            .insert(code.clone(), Instant::now());
        self.delivery.deliver(&code);
        tracing::info!("pairing code issued");
        Ok(code)
    }

    /// Exchange a valid code plus proof of possession for an enabled registry
    /// entry. Returns the derived device id.
    ///
    /// The code is consumed on success and on expiry; a failed proof puts it
    /// back so the device can retry within the code's lifetime.
    pub async fn confirm_pairing(
        &self,
        code: &str,
        public_key_hex: &str,
        signature_b64: &str,
        role: DeviceRole,
    ) -> Result<String, PairingError> {
        let created = {
            let mut pending = self.pending.lock().await;
            let created = pending.remove(code).ok_or(PairingError::InvalidCode)?;
            if created.elapsed() > self.code_ttl {
                return Err(PairingError::CodeExpired);
            }
            created
        };

        let public_key = match verify_proof(code, public_key_hex, signature_b64) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.pending.lock().await.insert(code.to_string(), created);
                return Err(err);
            }
        };

        let device_id = derive_device_id(&public_key);
        let record = DeviceRecord {
            public_key: public_key_hex.to_string(),
            role,
            enabled: true,
            created_at: Utc::now().timestamp() as f64,
        };
        self.registry.upsert(&device_id, record).await?;
        tracing::info!(device_id = %device_id, "device paired");
        Ok(device_id)
    }

    /// Disable a device. Loopback callers only. Returns `false` when the
    /// device is unknown; the record is never deleted.
    pub async fn revoke(&self, device_id: &str, caller: IpAddr) -> Result<bool, PairingError> {
        if !caller.is_loopback() {
            return Err(PairingError::LocalOnlyViolation {
                addr: caller.to_string(),
            });
        }

        let revoked = self.registry.disable(device_id).await?;
        if revoked {
            tracing::info!(device_id = %device_id, "device revoked");
        }
        Ok(revoked)
    }

    /// Drop pending codes older than the TTL. Called from a periodic task so
    /// codes that are never confirmed cannot accumulate over long uptimes.
    pub async fn sweep_expired(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|_, created| created.elapsed() <= self.code_ttl);
        before - pending.len()
    }

    /// Number of outstanding codes (for diagnostics).
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Check the proof signature over `PAIR:<code>` and return the raw public
/// key bytes.
fn verify_proof(
    code: &str,
    public_key_hex: &str,
    signature_b64: &str,
) -> Result<[u8; 32], PairingError> {
    let bytes = hex::decode(public_key_hex).map_err(|e| PairingError::InvalidPublicKey {
        reason: e.to_string(),
    })?;
    let public_key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| PairingError::InvalidPublicKey {
            reason: "expected 32 bytes".to_string(),
        })?;
    let verify_key =
        VerifyingKey::from_bytes(&public_key).map_err(|_| PairingError::ProofOfPossessionFailed)?;

    let signature_bytes = BASE64
        .decode(signature_b64)
        .map_err(|_| PairingError::ProofOfPossessionFailed)?;
    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|_| PairingError::ProofOfPossessionFailed)?;

    let message = format!("PAIR:{code}");
    verify_key
        .verify(message.as_bytes(), &signature)
        .map_err(|_| PairingError::ProofOfPossessionFailed)?;
    Ok(public_key)
}

/// Generate a random 6-digit pairing code.
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let code: u32 = rng.gen_range(100_000..1_000_000);
    code.to_string()
}
