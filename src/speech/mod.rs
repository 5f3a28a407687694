//! Speech engine boundaries.
//!
//! The gateway treats speech-to-text and text-to-speech as external
//! collaborators behind traits. Implementations shell out to local tools or
//! call a cloud API; authentication never depends on them.

pub mod stt;
pub mod tts;

pub use stt::{Transcriber, Transcript, WhisperCommand};
pub use tts::{GeminiTts, SayCommand, SynthesizedAudio, Synthesizer};
