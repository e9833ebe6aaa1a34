use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::content::ContentPart;
use crate::types::finish::FinishReason;
use crate::types::message::Message;
use crate::types::tool::ToolCall;
use crate::types::usage::Usage;

/// A non-fatal problem reported alongside a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// A normalized completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Provider-assigned response id.
    pub id: String,
    /// The model that actually served the request.
    pub model: String,
    /// Name of the adapter that produced this response.
    pub provider: String,
    /// The final assistant message.
    pub message: Message,
    pub finish_reason: FinishReason,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<Warning>>,
}

impl Response {
    /// Concatenation of the message's text parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.message.text()
    }

    /// Tool calls extracted from the message, with string-delivered
    /// arguments JSON-parsed and the raw string preserved. Arguments that
    /// fail to parse stay verbatim with `parse_error` set.
    #[must_use]
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.message
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall { tool_call } => Some(tool_call),
                _ => None,
            })
            .map(|tc| match &tc.arguments {
                Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                    Ok(parsed) => ToolCall {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        arguments: parsed,
                        raw_arguments: Some(raw.clone()),
                        parse_error: None,
                    },
                    Err(err) => ToolCall {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        arguments: Value::String(raw.clone()),
                        raw_arguments: Some(raw.clone()),
                        parse_error: Some(err.to_string()),
                    },
                },
                structured => ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: structured.clone(),
                    raw_arguments: None,
                    parse_error: None,
                },
            })
            .collect()
    }

    /// Concatenation of thinking parts, or `None` when there are none.
    #[must_use]
    pub fn reasoning(&self) -> Option<String> {
        let mut found = false;
        let text: String = self
            .message
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Thinking { thinking } if !thinking.redacted => {
                    found = true;
                    Some(thinking.text.as_str())
                }
                _ => None,
            })
            .collect();
        found.then_some(text)
    }
}
