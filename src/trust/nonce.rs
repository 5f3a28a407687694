//! Replay detection via a per-device nonce cache.
//!
//! Purging is lazy and scoped to the device being checked, so a lookup costs
//! O(entries for that device) rather than a global sweep. State is
//! process-local; a restart resets the cache, which the short replay window
//! makes an acceptable availability/security tradeoff.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Recently-seen request nonces, keyed by device and expiring per entry.
#[derive(Clone, Default)]
pub struct NonceCache {
    /// device_id -> nonce -> expires_at_ms
    entries: Arc<Mutex<HashMap<String, HashMap<String, u64>>>>,
}

impl NonceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Purge this device's expired entries, then record `nonce` unless it is
    /// already present. Returns `false` on replay.
    ///
    /// Purge, check and insert happen under one lock acquisition so two
    /// concurrent requests carrying the same nonce cannot both observe
    /// "not seen".
    pub async fn check_and_store(
        &self,
        device_id: &str,
        nonce: &str,
        now_ms: u64,
        expires_at_ms: u64,
    ) -> bool {
        let mut entries = self.entries.lock().await;
        let device = entries.entry(device_id.to_string()).or_default();
        device.retain(|_, expires| *expires > now_ms);
        if device.contains_key(nonce) {
            return false;
        }
        device.insert(nonce.to_string(), expires_at_ms);
        true
    }

    /// Whether the nonce is currently recorded (and unexpired) for the device.
    pub async fn seen(&self, device_id: &str, nonce: &str, now_ms: u64) -> bool {
        self.entries
            .lock()
            .await
            .get(device_id)
            .and_then(|device| device.get(nonce))
            .is_some_and(|expires| *expires > now_ms)
    }

    /// Number of entries currently held for a device, expired or not.
    pub async fn entry_count(&self, device_id: &str) -> usize {
        self.entries
            .lock()
            .await
            .get(device_id)
            .map_or(0, HashMap::len)
    }
}
