//! Error types for vizbox.

use std::time::Duration;

use crate::sandbox::SandboxError;
use crate::script::ScriptError;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Infrastructure failures that abort a whole pipeline call.
///
/// Anything that goes wrong inside a single snippet is absorbed by the
/// pipeline; only these reach the caller, who can then fall back to
/// returning the plain response text.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to spawn sandbox worker: {reason}")]
    WorkerSpawn { reason: String },

    #[error("Sandbox executor is shutting down")]
    ShuttingDown,
}

/// Rasterization failures.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Drawing failed: {0}")]
    Draw(String),

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// Attachment encoding failures.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Raster is not a PNG image ({len} bytes)")]
    NotPng { len: usize },

    #[error("Attachment payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Why a single snippet did not produce an attachment.
///
/// Only timeouts and faults are defects worth a warning; the rest describe
/// ordinary variability in agent-generated text and are logged at debug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnippetIssue {
    /// Malformed or interleaved fencing; the block was skipped.
    ExtractionAmbiguous { offset: usize },
    /// The classifier decided the snippet draws nothing.
    ClassificationRejected { reason: String },
    /// The snippet ran past its deadline.
    SandboxTimeout { deadline: Duration },
    /// The snippet raised (or could not be parsed).
    SandboxFault { summary: String },
    /// The snippet completed without drawing anything.
    RenderEmpty,
    /// The raster could not be turned into an attachment.
    EncodingFailure { summary: String },
}

impl SnippetIssue {
    /// Whether this issue is logged as a warning.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::SandboxTimeout { .. } | Self::SandboxFault { .. } | Self::EncodingFailure { .. }
        )
    }

    /// Log the issue for the snippet at `ordinal`.
    pub fn report(&self, ordinal: usize) {
        if self.is_warning() {
            tracing::warn!(snippet = ordinal, issue = %self, "Visualization snippet failed");
        } else {
            tracing::debug!(snippet = ordinal, issue = %self, "Visualization snippet skipped");
        }
    }
}

impl std::fmt::Display for SnippetIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExtractionAmbiguous { offset } => {
                write!(f, "ambiguous fencing at byte {}", offset)
            }
            Self::ClassificationRejected { reason } => write!(f, "not a visualization: {}", reason),
            Self::SandboxTimeout { deadline } => write!(f, "timed out after {:?}", deadline),
            Self::SandboxFault { summary } => write!(f, "fault: {}", summary),
            Self::RenderEmpty => write!(f, "nothing was drawn"),
            Self::EncodingFailure { summary } => write!(f, "encoding failure: {}", summary),
        }
    }
}

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_spawn_display() {
        let err = PipelineError::WorkerSpawn {
            reason: "resource temporarily unavailable".to_string(),
        };
        assert!(err.to_string().contains("resource temporarily unavailable"));
        assert!(err.to_string().contains("spawn"));
    }

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            key: "VIZ_MAX_ATTACHMENTS".to_string(),
            message: "not a number".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("VIZ_MAX_ATTACHMENTS"));
        assert!(msg.contains("not a number"));
    }

    #[test]
    fn test_only_timeouts_and_faults_warn() {
        assert!(
            SnippetIssue::SandboxTimeout {
                deadline: Duration::from_secs(10)
            }
            .is_warning()
        );
        assert!(
            SnippetIssue::SandboxFault {
                summary: "NameError: name 'os' is not defined".to_string()
            }
            .is_warning()
        );
        assert!(
            SnippetIssue::EncodingFailure {
                summary: "not a png".to_string()
            }
            .is_warning()
        );
        assert!(!SnippetIssue::RenderEmpty.is_warning());
        assert!(!SnippetIssue::ExtractionAmbiguous { offset: 4 }.is_warning());
        assert!(
            !SnippetIssue::ClassificationRejected {
                reason: "no plotting calls".to_string()
            }
            .is_warning()
        );
    }

    #[test]
    fn test_top_level_from_pipeline_error() {
        let err = Error::from(PipelineError::ShuttingDown);
        assert!(err.to_string().contains("shutting down"));
    }

    #[test]
    fn test_issue_display_has_no_newlines() {
        let issue = SnippetIssue::SandboxFault {
            summary: "TypeError: unsupported operand".to_string(),
        };
        assert!(!issue.to_string().contains('\n'));
    }
}
