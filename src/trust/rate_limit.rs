//! Token-bucket rate limiting per device and endpoint class.
//!
//! Buckets refill lazily on access, saturate at their capacity, and lose
//! exactly one token per accepted request. State is process-local and resets
//! on restart.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Endpoint classes with distinct rate allowances.
///
/// Speech recognition is markedly more expensive than everything else, so it
/// gets its own, tighter bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Recognition,
    General,
}

impl EndpointClass {
    /// Classify a request path.
    pub fn for_path(path: &str) -> Self {
        if path == "/stt" {
            EndpointClass::Recognition
        } else {
            EndpointClass::General
        }
    }
}

/// Capacity and refill rate for one bucket class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketParams {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

/// Rate parameters for both endpoint classes. Configuration, not constants.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub recognition: BucketParams,
    pub general: BucketParams,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            recognition: BucketParams {
                capacity: 5.0,
                refill_per_sec: 20.0 / 60.0,
            },
            general: BucketParams {
                capacity: 10.0,
                refill_per_sec: 60.0 / 60.0,
            },
        }
    }
}

impl RateLimitConfig {
    pub fn params(&self, class: EndpointClass) -> BucketParams {
        match class {
            EndpointClass::Recognition => self.recognition,
            EndpointClass::General => self.general,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill_ms: u64,
}

/// Per-(device, endpoint class) token buckets behind one lock.
#[derive(Clone, Default)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<(String, EndpointClass), Bucket>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refill the bucket from elapsed time, then consume one token if at
    /// least one is available. Refill, check and decrement happen under a
    /// single lock acquisition.
    pub async fn try_consume(
        &self,
        device_id: &str,
        class: EndpointClass,
        now_ms: u64,
        params: BucketParams,
    ) -> bool {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry((device_id.to_string(), class))
            .or_insert(Bucket {
                tokens: params.capacity,
                last_refill_ms: now_ms,
            });

        let elapsed_s = now_ms.saturating_sub(bucket.last_refill_ms) as f64 / 1000.0;
        bucket.tokens = (bucket.tokens + elapsed_s * params.refill_per_sec).min(params.capacity);
        bucket.last_refill_ms = now_ms;

        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }
}
