//! Error types for the snippet sandbox.

use std::time::Duration;

use crate::error::RenderError;
use crate::script::ScriptError;

/// Why a sandboxed execution did not complete normally.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The snippet ran past its deadline and was interrupted.
    #[error("Snippet timed out after {0:?}")]
    Timeout(Duration),

    /// The snippet raised, failed to parse or hit a resource limit.
    #[error("Snippet fault: {0}")]
    Fault(#[from] ScriptError),

    /// The finished figure could not be rasterized.
    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    /// The worker thread went away without reporting.
    #[error("Sandbox worker exited without reporting a result")]
    WorkerLost,
}

impl SandboxError {
    /// One-line `Kind: message` summary, safe to show end users.
    pub fn summary(&self) -> String {
        match self {
            Self::Timeout(deadline) => {
                format!("Timeout: execution exceeded the {:.1}s deadline", deadline.as_secs_f64())
            }
            Self::Fault(err) => format!("{}: {}", err.kind, err.message),
            Self::Render(err) => format!("RenderError: {}", err),
            Self::WorkerLost => "InternalError: sandbox worker exited unexpectedly".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptErrorKind;

    #[test]
    fn test_timeout_display() {
        let err = SandboxError::Timeout(Duration::from_secs(10));
        let msg = err.to_string();
        assert!(msg.contains("timed out"));
        assert!(msg.contains("10"));
        assert_eq!(err.summary(), "Timeout: execution exceeded the 10.0s deadline");
    }

    #[test]
    fn test_fault_summary_omits_line_and_traceback() {
        let err = SandboxError::from(ScriptError::name("name 'os' is not defined").at_line(3));
        assert_eq!(err.summary(), "NameError: name 'os' is not defined");
        assert!(!err.summary().contains('\n'));
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_from_render_error() {
        let err = SandboxError::from(RenderError::Encode("buffer too small".to_string()));
        assert!(err.summary().starts_with("RenderError:"));
        assert!(err.summary().contains("buffer too small"));
    }

    #[test]
    fn test_limit_fault_kind() {
        let err = SandboxError::Fault(ScriptError::limit("step budget of 10 exhausted"));
        assert!(matches!(&err, SandboxError::Fault(e) if e.kind == ScriptErrorKind::LimitExceeded));
        assert!(err.summary().starts_with("LimitExceeded:"));
    }

    #[test]
    fn test_debug_is_implemented() {
        let debug = format!("{:?}", SandboxError::WorkerLost);
        assert!(debug.contains("WorkerLost"));
    }
}
