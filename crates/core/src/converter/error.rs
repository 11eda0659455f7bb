//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during conversion.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// The external tool could not be launched.
    #[error("Failed to launch {tool}: {source}")]
    ToolSpawnFailed {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external tool exited unsuccessfully.
    #[error("{}", exit_message(.code, .diagnostics))]
    ToolExitedNonZero {
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Last non-empty diagnostic lines.
        diagnostics: String,
    },

    /// Output directory does not exist and could not be created.
    #[error("Failed to create output directory: {path}")]
    OutputDirectoryFailed { path: PathBuf },

    /// Invocation exceeded the configured timeout.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Failed to probe media file.
    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// Configuration is outside what the converter supports.
    #[error("Invalid configuration: {reason}")]
    ConfigurationInvalid { reason: String },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The job was canceled while converting.
    #[error("Conversion canceled")]
    Canceled,
}

fn exit_message(code: &Option<i32>, diagnostics: &str) -> String {
    let status = match code {
        Some(code) => format!("exited with code {}", code),
        None => "was terminated by a signal".to_string(),
    };
    if diagnostics.is_empty() {
        format!("ffmpeg {}", status)
    } else {
        format!("ffmpeg {}:\n{}", status, diagnostics)
    }
}

impl ConverterError {
    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Creates a new invalid configuration error.
    pub fn configuration_invalid(reason: impl Into<String>) -> Self {
        Self::ConfigurationInvalid {
            reason: reason.into(),
        }
    }

    /// Whether this error means the operation was aborted on request.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_message_includes_diagnostics() {
        let err = ConverterError::ToolExitedNonZero {
            code: Some(1),
            diagnostics: "Invalid data found when processing input".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exited with code 1"));
        assert!(msg.contains("Invalid data found"));
    }

    #[test]
    fn test_exit_message_for_signal() {
        let err = ConverterError::ToolExitedNonZero {
            code: None,
            diagnostics: String::new(),
        };
        assert_eq!(err.to_string(), "ffmpeg was terminated by a signal");
    }

    #[test]
    fn test_is_cancellation() {
        assert!(ConverterError::Canceled.is_cancellation());
        assert!(!ConverterError::probe_failed("nope").is_cancellation());
    }
}
