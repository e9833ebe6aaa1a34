//! Message content parts.
//!
//! A message body is an ordered list of [`ContentPart`]s. Parts are
//! serialized with a `"kind"` tag; unknown or malformed kinds round-trip
//! through the [`Extension`](ContentPart::Extension) variant so that new
//! provider content types never break deserialization.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LlmError, LlmResult};

/// Image content, either by URL or inline bytes (exactly one of the two).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ImageData {
    /// Check that exactly one of `url` / `data` is set.
    pub fn validate(&self) -> LlmResult<()> {
        match (&self.url, &self.data) {
            (Some(_), Some(_)) => Err(LlmError::Configuration {
                message: "image content must not set both url and data".into(),
            }),
            (None, None) => Err(LlmError::Configuration {
                message: "image content must set url or data".into(),
            }),
            _ => Ok(()),
        }
    }

    /// Media type for inline data, defaulting to PNG. `None` for URLs.
    #[must_use]
    pub fn effective_media_type(&self) -> Option<&str> {
        if self.data.is_some() {
            Some(self.media_type.as_deref().unwrap_or("image/png"))
        } else {
            None
        }
    }
}

/// Audio content by URL or inline bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Document content (PDF and friends) by URL or inline bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// A tool invocation requested by the model.
///
/// `arguments` may arrive as a structured map or as a JSON-encoded string,
/// depending on the provider; [`Response::tool_calls`](crate::types::response::Response::tool_calls)
/// normalizes both forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallData {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    /// Provider call type, almost always `"function"`.
    #[serde(
        rename = "type",
        default = "default_call_type",
        skip_serializing_if = "is_default_call_type"
    )]
    pub call_type: String,
}

fn default_call_type() -> String {
    "function".into()
}

fn is_default_call_type(t: &str) -> bool {
    t == "function"
}

/// The result of a tool execution, echoed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultData {
    pub tool_call_id: String,
    pub content: Value,
    #[serde(default)]
    pub is_error: bool,
}

/// Model reasoning. `redacted` marks thinking the provider returned in
/// opaque (encrypted or stripped) form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingData {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub redacted: bool,
}

/// One part of a message body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { image: ImageData },
    Audio { audio: AudioData },
    Document { document: DocumentData },
    ToolCall { tool_call: ToolCallData },
    ToolResult { tool_result: ToolResultData },
    Thinking { thinking: ThinkingData },
    /// Any kind this version does not model. Preserved verbatim.
    #[serde(untagged)]
    Extension(Value),
}

/// Kinds handled by the typed variants. A well-formed part with one of
/// these kinds never deserializes as `Extension`.
const KNOWN_KINDS: &[&str] = &[
    "text",
    "image",
    "audio",
    "document",
    "tool_call",
    "tool_result",
    "thinking",
];

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let kind = value.get("kind").and_then(Value::as_str).unwrap_or_default();

        // Known kinds parse into their typed variant; anything malformed or
        // unrecognized is preserved as an Extension so callers can inspect
        // (and validate()) it.
        let parsed = match kind {
            "text" => value
                .get("text")
                .and_then(Value::as_str)
                .map(|text| Self::Text { text: text.into() }),
            "image" => from_field(&value, "image").map(|image| Self::Image { image }),
            "audio" => from_field(&value, "audio").map(|audio| Self::Audio { audio }),
            "document" => from_field(&value, "document").map(|document| Self::Document { document }),
            "tool_call" => from_field(&value, "tool_call").map(|tool_call| Self::ToolCall { tool_call }),
            "tool_result" => {
                from_field(&value, "tool_result").map(|tool_result| Self::ToolResult { tool_result })
            }
            "thinking" => from_field(&value, "thinking").map(|thinking| Self::Thinking { thinking }),
            _ => None,
        };

        Ok(parsed.unwrap_or(Self::Extension(value)))
    }
}

fn from_field<T: serde::de::DeserializeOwned>(value: &Value, field: &str) -> Option<T> {
    value
        .get(field)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
}

impl ContentPart {
    /// A plain text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// An image part referencing a URL.
    #[must_use]
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::Image {
            image: ImageData {
                url: Some(url.into()),
                data: None,
                media_type: None,
                detail: None,
            },
        }
    }

    /// An image part carrying inline bytes.
    #[must_use]
    pub fn image_data(data: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self::Image {
            image: ImageData {
                url: None,
                data: Some(data),
                media_type: Some(media_type.into()),
                detail: None,
            },
        }
    }

    /// A tool-call part with structured arguments.
    #[must_use]
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self::ToolCall {
            tool_call: ToolCallData {
                id: id.into(),
                name: name.into(),
                arguments,
                call_type: default_call_type(),
            },
        }
    }

    /// A tool-result part.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: Value, is_error: bool) -> Self {
        Self::ToolResult {
            tool_result: ToolResultData {
                tool_call_id: tool_call_id.into(),
                content,
                is_error,
            },
        }
    }

    /// A thinking part with visible text.
    #[must_use]
    pub fn thinking(text: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: ThinkingData {
                text: text.into(),
                signature: None,
                redacted: false,
            },
        }
    }

    /// Reject parts that look like a known kind but failed to parse into
    /// the typed variant (a malformed `{"kind":"text"}`, for instance).
    /// Truly unknown kinds pass.
    pub fn validate(&self) -> LlmResult<()> {
        match self {
            Self::Extension(value) => {
                let kind = value.get("kind").and_then(Value::as_str).unwrap_or_default();
                if KNOWN_KINDS.contains(&kind) {
                    Err(LlmError::InvalidRequest {
                        message: format!("malformed content part of kind '{kind}'"),
                        details: crate::error::ErrorDetails::default(),
                    })
                } else {
                    Ok(())
                }
            }
            Self::Image { image } => image.validate(),
            Self::Text { .. }
            | Self::Audio { .. }
            | Self::Document { .. }
            | Self::ToolCall { .. }
            | Self::ToolResult { .. }
            | Self::Thinking { .. } => Ok(()),
        }
    }
}
