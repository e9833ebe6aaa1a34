use serde::{Deserialize, Serialize};

/// The author role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Result of a tool execution, keyed by `tool_call_id`.
    Tool,
    /// Developer instructions (providers that distinguish them from system).
    Developer,
}
