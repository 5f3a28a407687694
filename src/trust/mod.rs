//! Device trust and request authentication.
//!
//! Everything that decides whether an inbound request is allowed to reach a
//! handler: the durable device registry, replay detection, rate limiting,
//! the pairing bootstrap, and the authenticator that ties them together.

pub mod authenticator;
pub mod nonce;
pub mod pairing;
pub mod rate_limit;
pub mod registry;

pub use authenticator::{RawCredentials, RequestAuthenticator};
pub use nonce::NonceCache;
pub use pairing::{CodeDelivery, ConsoleDelivery, PairingCoordinator};
pub use rate_limit::{BucketParams, EndpointClass, RateLimitConfig, RateLimiter};
pub use registry::{
    derive_device_id, DeviceRecord, DeviceRegistry, DeviceRole, JsonFileStore, MemoryStore,
    RegistryStore,
};
