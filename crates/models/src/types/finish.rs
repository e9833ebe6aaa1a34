use serde::{Deserialize, Serialize};

/// Normalized reason a generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Natural end of output.
    Stop,
    /// Hit the max-tokens limit.
    Length,
    /// The model wants tool executions.
    ToolCalls,
    /// Output blocked by a content filter.
    ContentFilter,
    /// The provider reported an error mid-generation.
    Error,
    /// Anything else.
    Other,
}

/// Why a response finished, with the provider's raw reason preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishReason {
    pub reason: Reason,
    /// The provider's verbatim finish reason (e.g. `"end_turn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl FinishReason {
    #[must_use]
    pub fn new(reason: Reason, raw: Option<String>) -> Self {
        Self { reason, raw }
    }

    /// A plain `stop` finish with no raw value.
    #[must_use]
    pub fn stop() -> Self {
        Self::new(Reason::Stop, None)
    }
}
