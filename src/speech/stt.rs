//! Speech-to-text boundary.

use std::io::Write;

use async_trait::async_trait;

use crate::error::SpeechError;

/// Result of a transcription.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
}

/// Turns raw audio bytes into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript, SpeechError>;
}

/// Runs a Whisper-compatible CLI over a temp WAV file and reads the
/// transcription from stdout.
pub struct WhisperCommand {
    command: String,
    args: Vec<String>,
}

impl WhisperCommand {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl Transcriber for WhisperCommand {
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript, SpeechError> {
        let mut wav = tempfile::Builder::new()
            .prefix("dexhub-stt-")
            .suffix(".wav")
            .tempfile()?;
        wav.write_all(audio)?;
        wav.flush()?;

        let output = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .arg(wav.path())
            .output()
            .await?;

        if !output.status.success() {
            return Err(SpeechError::TranscriptionFailed {
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(Transcript {
            text: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transcribe_reads_command_stdout() {
        // `cat <file>` echoes the audio bytes back, standing in for a real
        // transcriber binary.
        let transcriber = WhisperCommand::new("cat", Vec::new());
        let transcript = transcriber.transcribe(b"  hello world \n").await.unwrap();
        assert_eq!(transcript.text, "hello world");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_surfaces_transcription_error() {
        let transcriber = WhisperCommand::new("false", Vec::new());
        let err = transcriber.transcribe(b"audio").await.unwrap_err();
        assert!(matches!(err, SpeechError::TranscriptionFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_surfaces_io_error() {
        let transcriber = WhisperCommand::new("dexhub-no-such-binary", Vec::new());
        let err = transcriber.transcribe(b"audio").await.unwrap_err();
        assert!(matches!(err, SpeechError::Io(_)));
    }
}
