//! Tool definitions, choices, calls, and results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorDetails, LlmError, LlmResult};

/// A tool the model may call: name, description, and a JSON Schema for
/// its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    /// Request strict schema adherence from providers that support it.
    #[serde(default)]
    pub strict: bool,
}

impl ToolDefinition {
    /// Check the definition is acceptable to every supported provider:
    /// identifier-shaped name of at most 64 characters, non-empty
    /// description, object-rooted parameter schema.
    pub fn validate(&self) -> LlmResult<()> {
        let invalid = |message: String| LlmError::InvalidRequest {
            message,
            details: ErrorDetails::default(),
        };

        if self.name.is_empty() || self.name.len() > 64 {
            return Err(invalid(format!(
                "tool name must be 1-64 characters: '{}'",
                self.name
            )));
        }
        let mut chars = self.name.chars();
        let first = chars.next().unwrap_or('0');
        if !(first.is_ascii_alphabetic() || first == '_')
            || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid(format!(
                "tool name must match [A-Za-z_][A-Za-z0-9_-]*: '{}'",
                self.name
            )));
        }
        if self.description.is_empty() {
            return Err(invalid(format!(
                "tool '{}' must have a description",
                self.name
            )));
        }
        if !self.parameters.is_object() {
            return Err(invalid(format!(
                "tool '{}' parameters must be a JSON object schema",
                self.name
            )));
        }
        Ok(())
    }
}

/// How the model may use the supplied tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// The model decides between text and tool calls.
    Auto,
    /// The model must not call tools.
    None,
    /// The model must call at least one tool.
    Required,
    /// The model must call this specific tool.
    Tool(String),
}

/// A normalized tool call extracted from a response.
///
/// When the provider delivered arguments as a JSON string, the parsed value
/// lands in `arguments` and the original string is kept in `raw_arguments`.
/// Unparsable strings stay in `arguments` verbatim with `parse_error` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_arguments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

/// The outcome of executing one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: Value,
    #[serde(default)]
    pub is_error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn definition_validate_accepts_reasonable_tool() {
        let def = ToolDefinition {
            name: "read_file".into(),
            description: "Read a file".into(),
            parameters: json!({"type": "object", "properties": {}}),
            strict: false,
        };
        assert!(def.validate().is_ok());
    }

    #[test]
    fn definition_validate_rejects_bad_names() {
        for name in ["", "9lives", "has space", &"x".repeat(65)] {
            let def = ToolDefinition {
                name: name.into(),
                description: "d".into(),
                parameters: json!({"type": "object"}),
                strict: false,
            };
            assert!(def.validate().is_err(), "name {name:?} should fail");
        }
    }

    #[test]
    fn tool_choice_wire_shapes() {
        assert_eq!(
            serde_json::to_string(&ToolChoice::Auto).expect("serialize"),
            "\"auto\""
        );
        assert_eq!(
            serde_json::to_string(&ToolChoice::Tool("grep".into())).expect("serialize"),
            "{\"tool\":\"grep\"}"
        );
    }
}
