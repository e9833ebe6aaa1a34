use serde::ser::SerializeMap;

/// The result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised by the pipeline engine and its handlers.
///
/// Retryable variants describe transient provider and transport trouble;
/// structural variants describe broken pipeline definitions; fatal
/// variants end a run from inside the engine loop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    // -- Retryable --
    /// A provider rate limit was hit inside a handler.
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// A network call inside a handler timed out.
    #[error("network timeout: {message}")]
    NetworkTimeout { message: String },

    /// A dependency was temporarily unavailable.
    #[error("temporarily unavailable: {message}")]
    TemporarilyUnavailable { message: String },

    // -- Handler / terminal --
    /// A handler failed in a way that is not a normal FAIL outcome.
    #[error("handler failed for node {node_id}: {reason}")]
    HandlerFailed { node_id: String, reason: String },

    /// A required context key is missing.
    #[error("missing context key: {key}")]
    MissingContext { key: String },

    // -- Structural --
    /// No start node (shape `Mdiamond` or id `start`/`Start`).
    #[error("pipeline has no start node")]
    NoStartNode,

    /// An edge or checkpoint references a node the graph lacks.
    #[error("node not found: {node_id}")]
    NodeNotFound { node_id: String },

    /// The pipeline definition is invalid.
    #[error("invalid pipeline: {reason}")]
    InvalidPipeline { reason: String },

    // -- Fatal run outcomes --
    /// A terminal node was reached with an unsatisfied goal gate and no
    /// retry target.
    #[error("Goal gate unsatisfied for node '{node_id}' and no retry target available")]
    GoalGateUnsatisfied { node_id: String },

    /// A stage failed and no routing could absorb the failure.
    #[error("Stage '{node_id}' failed with no outgoing fail edge")]
    StageFailedNoRoute { node_id: String },

    // -- Wrappers --
    /// Filesystem failure writing run artifacts.
    #[error("io error: {message}")]
    Io { message: String },

    /// Serialization failure for checkpoints or manifests.
    #[error("json error: {message}")]
    Json { message: String },
}

impl PipelineError {
    /// Whether a retry of the failing handler may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::NetworkTimeout { .. }
            | Self::TemporarilyUnavailable { .. }
            | Self::Io { .. } => true,

            Self::HandlerFailed { .. }
            | Self::MissingContext { .. }
            | Self::NoStartNode
            | Self::NodeNotFound { .. }
            | Self::InvalidPipeline { .. }
            | Self::GoalGateUnsatisfied { .. }
            | Self::StageFailedNoRoute { .. }
            | Self::Json { .. } => false,
        }
    }

    /// A stable code for event payloads and logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::NetworkTimeout { .. } => "NETWORK_TIMEOUT",
            Self::TemporarilyUnavailable { .. } => "TEMPORARILY_UNAVAILABLE",
            Self::HandlerFailed { .. } => "HANDLER_FAILED",
            Self::MissingContext { .. } => "MISSING_CONTEXT",
            Self::NoStartNode => "NO_START_NODE",
            Self::NodeNotFound { .. } => "NODE_NOT_FOUND",
            Self::InvalidPipeline { .. } => "INVALID_PIPELINE",
            Self::GoalGateUnsatisfied { .. } => "GOAL_GATE_UNSATISFIED",
            Self::StageFailedNoRoute { .. } => "STAGE_FAILED_NO_ROUTE",
            Self::Io { .. } => "IO_ERROR",
            Self::Json { .. } => "JSON_ERROR",
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl serde::Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("code", self.code())?;
        map.serialize_entry("message", &self.to_string())?;
        map.end()
    }
}
