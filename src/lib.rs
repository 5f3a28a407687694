//! DexHub: a self-hosted trusted-node speech gateway.
//!
//! The gateway exposes speech-to-text and text-to-speech endpoints to a small
//! set of paired personal devices. Every protected request is authenticated
//! with an Ed25519 signature over a canonical request string, checked for
//! replay and staleness, and rate limited per device. New devices bootstrap
//! through a loopback-initiated pairing handshake that proves possession of
//! their private key.

pub mod cli;
pub mod config;
pub mod error;
pub mod server;
pub mod speech;
pub mod trust;

pub use error::{Error, Result};
