use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The shape the model's output must take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormatType {
    /// Free-form text (the default when no format is requested).
    Text,
    /// Any syntactically valid JSON object.
    JsonObject,
    /// JSON conforming to the supplied schema.
    JsonSchema,
}

/// A structured-output request attached to a [`Request`](crate::types::request::Request).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: ResponseFormatType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<Value>,
    #[serde(default)]
    pub strict: bool,
}

impl ResponseFormat {
    /// A schema-constrained JSON format.
    #[must_use]
    pub fn json_schema(schema: Value, strict: bool) -> Self {
        Self {
            format_type: ResponseFormatType::JsonSchema,
            json_schema: Some(schema),
            strict,
        }
    }
}
