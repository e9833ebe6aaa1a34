use orrery_models::LlmError;

/// The result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Agent-level errors.
///
/// Tool-level errors are recoverable; they go back to the model as
/// `is_error` results so it can adapt. Session-level errors affect the
/// session lifecycle. Classification arms are exhaustive so a new variant
/// cannot ship unclassified.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    // -- Tool-level --
    /// No file at the given path.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// Filesystem permission refused the operation.
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// Tool arguments failed validation.
    #[error("validation error: {reason}")]
    ValidationError { reason: String },

    /// The model called a tool that is not registered.
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    /// I/O failure during tool execution.
    #[error("i/o error: {message}")]
    Io { message: String },

    // -- Session-level --
    /// The session is closed and rejects further input.
    #[error("session closed")]
    SessionClosed,

    /// A second submit arrived while one was in flight.
    #[error("already processing")]
    AlreadyProcessing,

    /// Subagent lifecycle failure (unknown id, dead task).
    #[error("subagent error: {message}")]
    Subagent { message: String },

    /// An error from the LLM client.
    #[error("llm error: {0}")]
    Llm(LlmError),
}

impl AgentError {
    /// Whether this error should be returned to the model as an
    /// `is_error` tool result rather than surfacing to the session.
    #[must_use]
    pub fn is_tool_error(&self) -> bool {
        match self {
            Self::FileNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::ValidationError { .. }
            | Self::UnknownTool { .. }
            | Self::Io { .. } => true,

            Self::SessionClosed
            | Self::AlreadyProcessing
            | Self::Subagent { .. }
            | Self::Llm(_) => false,
        }
    }

    /// A short stable code for event payloads.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::FileNotFound { .. } => "FILE_NOT_FOUND",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::UnknownTool { .. } => "UNKNOWN_TOOL",
            Self::Io { .. } => "IO_ERROR",
            Self::SessionClosed => "SESSION_CLOSED",
            Self::AlreadyProcessing => "ALREADY_PROCESSING",
            Self::Subagent { .. } => "SUBAGENT_ERROR",
            Self::Llm(err) => err.code(),
        }
    }

    /// Map an `io::Error` to the most specific variant, with the path for
    /// context.
    #[must_use]
    pub fn from_io(err: std::io::Error, path: &std::path::Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound {
                path: path.display().to_string(),
            },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.display().to_string(),
            },
            _ => Self::Io {
                message: format!("{}: {err}", path.display()),
            },
        }
    }
}

impl From<LlmError> for AgentError {
    fn from(err: LlmError) -> Self {
        Self::Llm(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_display_names_the_tool() {
        let err = AgentError::UnknownTool {
            name: "bogus".into(),
        };
        assert!(err.to_string().contains("Unknown tool: bogus"));
        assert!(err.is_tool_error());
    }

    #[test]
    fn session_errors_are_not_tool_errors() {
        assert!(!AgentError::SessionClosed.is_tool_error());
        assert!(!AgentError::AlreadyProcessing.is_tool_error());
    }
}
