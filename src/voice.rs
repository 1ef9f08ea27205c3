//! Voice input for queries.
//!
//! Speech capture stays outside the process: the configured transcriber
//! command records one utterance and prints the transcript to stdout. Any
//! speech-to-text tool that fits that contract works, and an empty command
//! means voice input is simply unavailable.

use crate::config::VoiceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Trait for one-shot speech capture
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Capture a single utterance and return its transcript
    async fn transcribe(&self) -> Result<String>;
}

/// Runs an external speech-to-text command and reads the first non-empty
/// stdout line as the transcript
#[derive(Debug)]
pub struct CommandTranscriber {
    command: String,
    args: Vec<String>,
}

impl CommandTranscriber {
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        if config.command.trim().is_empty() {
            return Err(Error::VoiceUnavailable(
                "no transcriber command configured".to_string(),
            ));
        }
        Ok(Self {
            command: config.command.clone(),
            args: config.args.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self) -> Result<String> {
        debug!("Running transcriber: {} {:?}", self.command, self.args);
        let output = Command::new(&self.command)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| {
                Error::VoiceUnavailable(format!("failed to run '{}': {}", self.command, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::VoiceUnavailable(format!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let transcript = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string);

        transcript.ok_or_else(|| {
            Error::VoiceUnavailable(format!("'{}' produced no transcript", self.command))
        })
    }
}

/// Create a transcriber based on configuration
pub fn create_transcriber(config: &VoiceConfig) -> Result<Box<dyn Transcriber>> {
    let transcriber = CommandTranscriber::new(config)?;
    Ok(Box::new(transcriber))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(command: &str, args: &[&str]) -> VoiceConfig {
        VoiceConfig {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_command_is_unavailable() {
        let err = CommandTranscriber::new(&voice("", &[])).unwrap_err();
        assert!(matches!(err, Error::VoiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_reads_first_nonempty_line() {
        let transcriber =
            CommandTranscriber::new(&voice("printf", &["\\n  \\nfirst line\\nsecond\\n"])).unwrap();
        let transcript = transcriber.transcribe().await.unwrap();
        assert_eq!(transcript, "first line");
    }

    #[tokio::test]
    async fn test_failing_command_reports_unavailable() {
        let transcriber = CommandTranscriber::new(&voice("false", &[])).unwrap();
        let err = transcriber.transcribe().await.unwrap_err();
        assert!(matches!(err, Error::VoiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_silent_command_reports_unavailable() {
        let transcriber = CommandTranscriber::new(&voice("true", &[])).unwrap();
        let err = transcriber.transcribe().await.unwrap_err();
        assert!(matches!(err, Error::VoiceUnavailable(_)));
    }
}
