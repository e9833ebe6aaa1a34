//! Streaming event protocol.
//!
//! Adapters emit a flat sequence of [`StreamEvent`]s; the terminal `finish`
//! event carries the fully-formed [`Response`] so consumers holding a
//! response future never need to re-accumulate.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;
use crate::types::finish::FinishReason;
use crate::types::response::Response;
use crate::types::usage::Usage;

/// The kind of a streaming event. Unrecognized kinds are preserved in
/// [`Unknown`](StreamEventType::Unknown) for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventType {
    StreamStart,
    TextStart,
    TextDelta,
    TextEnd,
    ReasoningStart,
    ReasoningDelta,
    ReasoningEnd,
    ToolCallStart,
    ToolCallDelta,
    ToolCallEnd,
    Finish,
    Error,
    ProviderEvent,
    Unknown(String),
}

impl StreamEventType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::StreamStart => "stream_start",
            Self::TextStart => "text_start",
            Self::TextDelta => "text_delta",
            Self::TextEnd => "text_end",
            Self::ReasoningStart => "reasoning_start",
            Self::ReasoningDelta => "reasoning_delta",
            Self::ReasoningEnd => "reasoning_end",
            Self::ToolCallStart => "tool_call_start",
            Self::ToolCallDelta => "tool_call_delta",
            Self::ToolCallEnd => "tool_call_end",
            Self::Finish => "finish",
            Self::Error => "error",
            Self::ProviderEvent => "provider_event",
            Self::Unknown(s) => s,
        }
    }

    fn from_wire(s: &str) -> Self {
        match s {
            "stream_start" => Self::StreamStart,
            "text_start" => Self::TextStart,
            "text_delta" => Self::TextDelta,
            "text_end" => Self::TextEnd,
            "reasoning_start" => Self::ReasoningStart,
            "reasoning_delta" => Self::ReasoningDelta,
            "reasoning_end" => Self::ReasoningEnd,
            "tool_call_start" => Self::ToolCallStart,
            "tool_call_delta" => Self::ToolCallDelta,
            "tool_call_end" => Self::ToolCallEnd,
            "finish" => Self::Finish,
            "error" => Self::Error,
            "provider_event" => Self::ProviderEvent,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl Serialize for StreamEventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StreamEventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&s))
    }
}

/// One event in a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: StreamEventType,
    /// Incremental text for delta events (text, reasoning, tool arguments).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    /// Tool call id for tool_call_* events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name for tool_call_start events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// The complete response, carried by the terminal `finish` event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Box<Response>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<LlmError>,
    /// Opaque provider payload for `provider_event`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl StreamEvent {
    fn bare(event_type: StreamEventType) -> Self {
        Self {
            event_type,
            delta: None,
            tool_call_id: None,
            tool_name: None,
            finish_reason: None,
            usage: None,
            response: None,
            error: None,
            raw: None,
        }
    }

    #[must_use]
    pub fn stream_start() -> Self {
        Self::bare(StreamEventType::StreamStart)
    }

    #[must_use]
    pub fn text_start() -> Self {
        Self::bare(StreamEventType::TextStart)
    }

    #[must_use]
    pub fn text_delta(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
            ..Self::bare(StreamEventType::TextDelta)
        }
    }

    #[must_use]
    pub fn text_end() -> Self {
        Self::bare(StreamEventType::TextEnd)
    }

    #[must_use]
    pub fn reasoning_delta(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
            ..Self::bare(StreamEventType::ReasoningDelta)
        }
    }

    #[must_use]
    pub fn tool_call_start(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(id.into()),
            tool_name: Some(name.into()),
            ..Self::bare(StreamEventType::ToolCallStart)
        }
    }

    #[must_use]
    pub fn tool_call_delta(id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(id.into()),
            delta: Some(delta.into()),
            ..Self::bare(StreamEventType::ToolCallDelta)
        }
    }

    #[must_use]
    pub fn tool_call_end(id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(id.into()),
            ..Self::bare(StreamEventType::ToolCallEnd)
        }
    }

    /// A terminal finish event without a response payload. The buffered
    /// stream accumulates one in this case.
    #[must_use]
    pub fn finish(finish_reason: FinishReason, usage: Usage) -> Self {
        Self {
            finish_reason: Some(finish_reason),
            usage: Some(usage),
            ..Self::bare(StreamEventType::Finish)
        }
    }

    /// The preferred terminal event: finish carrying the full response.
    #[must_use]
    pub fn finish_with_response(response: Response) -> Self {
        Self {
            finish_reason: Some(response.finish_reason.clone()),
            usage: Some(response.usage.clone()),
            response: Some(Box::new(response)),
            ..Self::bare(StreamEventType::Finish)
        }
    }

    #[must_use]
    pub fn error(error: LlmError) -> Self {
        Self {
            error: Some(error),
            ..Self::bare(StreamEventType::Error)
        }
    }

    #[must_use]
    pub fn provider_event(raw: Value) -> Self {
        Self {
            raw: Some(raw),
            ..Self::bare(StreamEventType::ProviderEvent)
        }
    }
}
