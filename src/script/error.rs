//! Errors raised while parsing or running a snippet.
//!
//! Messages are written for the end of a chat transcript: a kind and a short
//! message, never host paths or interpreter internals.

/// Category of a snippet error, named after the Python exception a snippet
/// author would expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    SyntaxError,
    IndentationError,
    NameError,
    AttributeError,
    TypeError,
    ValueError,
    IndexError,
    KeyError,
    ZeroDivisionError,
    ImportError,
    /// A sandbox resource limit (steps, collection size, nesting) was hit.
    LimitExceeded,
    /// The executor tripped the interrupt handle.
    Interrupted,
}

impl std::fmt::Display for ScriptErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SyntaxError => "SyntaxError",
            Self::IndentationError => "IndentationError",
            Self::NameError => "NameError",
            Self::AttributeError => "AttributeError",
            Self::TypeError => "TypeError",
            Self::ValueError => "ValueError",
            Self::IndexError => "IndexError",
            Self::KeyError => "KeyError",
            Self::ZeroDivisionError => "ZeroDivisionError",
            Self::ImportError => "ImportError",
            Self::LimitExceeded => "LimitExceeded",
            Self::Interrupted => "Interrupted",
        };
        f.write_str(name)
    }
}

/// An error raised by a snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
    /// 1-based snippet line, when known.
    pub line: Option<usize>,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}

impl ScriptError {
    pub fn new(kind: ScriptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::SyntaxError, message)
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::NameError, message)
    }

    pub fn attribute(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::AttributeError, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::TypeError, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::ValueError, message)
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::IndexError, message)
    }

    pub fn key(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::KeyError, message)
    }

    pub fn limit(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::LimitExceeded, message)
    }

    pub fn interrupted() -> Self {
        Self::new(ScriptErrorKind::Interrupted, "execution was interrupted")
    }

    /// Attach a line number unless one is already set.
    pub fn at_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    pub fn is_interrupt(&self) -> bool {
        self.kind == ScriptErrorKind::Interrupted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_kind_and_message() {
        let err = ScriptError::name("name 'os' is not defined");
        assert_eq!(err.to_string(), "NameError: name 'os' is not defined");
    }

    #[test]
    fn test_display_with_line() {
        let err = ScriptError::syntax("invalid syntax").at_line(3);
        assert_eq!(err.to_string(), "SyntaxError: invalid syntax (line 3)");
    }

    #[test]
    fn test_at_line_keeps_innermost() {
        let err = ScriptError::value("bad").at_line(2).at_line(7);
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_interrupt() {
        assert!(ScriptError::interrupted().is_interrupt());
        assert!(!ScriptError::limit("too big").is_interrupt());
    }
}
