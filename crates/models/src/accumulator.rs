//! Folds a stream of events back into a [`Response`].
//!
//! Used by consumers that want the final response from a streamed call
//! when the terminal `finish` event did not carry one.

use serde_json::Value;

use crate::types::content::ContentPart;
use crate::types::finish::{FinishReason, Reason};
use crate::types::message::Message;
use crate::types::response::Response;
use crate::types::role::Role;
use crate::types::stream_event::{StreamEvent, StreamEventType};
use crate::types::usage::Usage;

/// A tool call being assembled from start/delta/end events.
#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates [`StreamEvent`]s into a [`Response`].
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    reasoning: String,
    has_reasoning: bool,
    tool_calls: Vec<PendingToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    response: Option<Response>,
}

impl StreamAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the accumulated state.
    pub fn process(&mut self, event: &StreamEvent) {
        match &event.event_type {
            StreamEventType::TextDelta => {
                if let Some(delta) = &event.delta {
                    self.text.push_str(delta);
                }
            }
            StreamEventType::ReasoningDelta => {
                if let Some(delta) = &event.delta {
                    self.has_reasoning = true;
                    self.reasoning.push_str(delta);
                }
            }
            StreamEventType::ToolCallStart => {
                self.tool_calls.push(PendingToolCall {
                    id: event.tool_call_id.clone().unwrap_or_default(),
                    name: event.tool_name.clone().unwrap_or_default(),
                    arguments: String::new(),
                });
            }
            StreamEventType::ToolCallDelta => {
                if let Some(delta) = &event.delta {
                    // Deltas address a call by id; an empty or missing id
                    // falls back to the most recently started call.
                    let id = event.tool_call_id.as_deref().unwrap_or_default();
                    let slot = if id.is_empty() {
                        self.tool_calls.last_mut()
                    } else {
                        self.tool_calls.iter_mut().rev().find(|tc| tc.id == id)
                    };
                    if let Some(tc) = slot {
                        tc.arguments.push_str(delta);
                    }
                }
            }
            StreamEventType::Finish => {
                self.finish_reason = event.finish_reason.clone();
                self.usage = event.usage.clone();
                if let Some(response) = &event.response {
                    self.response = Some((**response).clone());
                }
            }
            StreamEventType::StreamStart
            | StreamEventType::TextStart
            | StreamEventType::TextEnd
            | StreamEventType::ReasoningStart
            | StreamEventType::ReasoningEnd
            | StreamEventType::ToolCallEnd
            | StreamEventType::Error
            | StreamEventType::ProviderEvent
            | StreamEventType::Unknown(_) => {}
        }
    }

    /// Build the final response.
    ///
    /// When the terminal event carried a response it wins; otherwise the
    /// response is assembled from the accumulated deltas. Tool-call
    /// argument buffers that parse as JSON become structured arguments;
    /// anything else is kept as the raw string.
    #[must_use]
    pub fn response(&self) -> Response {
        if let Some(response) = &self.response {
            return response.clone();
        }

        let mut parts = Vec::new();
        if self.has_reasoning {
            parts.push(ContentPart::thinking(self.reasoning.clone()));
        }
        if !self.text.is_empty() {
            parts.push(ContentPart::text(self.text.clone()));
        }
        for tc in &self.tool_calls {
            let arguments = serde_json::from_str::<Value>(&tc.arguments)
                .unwrap_or_else(|_| Value::String(tc.arguments.clone()));
            parts.push(ContentPart::tool_call(tc.id.clone(), tc.name.clone(), arguments));
        }

        let reason = if self.tool_calls.is_empty() {
            Reason::Stop
        } else {
            Reason::ToolCalls
        };

        Response {
            id: String::new(),
            model: String::new(),
            provider: String::new(),
            message: Message::new(Role::Assistant, parts),
            finish_reason: self
                .finish_reason
                .clone()
                .unwrap_or(FinishReason::new(reason, None)),
            usage: self.usage.clone().unwrap_or_default(),
            warnings: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_text_deltas() {
        let mut acc = StreamAccumulator::new();
        acc.process(&StreamEvent::text_delta("Hel"));
        acc.process(&StreamEvent::text_delta("lo"));
        assert_eq!(acc.response().text(), "Hello");
    }

    #[test]
    fn assembles_tool_call_from_deltas() {
        let mut acc = StreamAccumulator::new();
        acc.process(&StreamEvent::tool_call_start("c1", "grep"));
        acc.process(&StreamEvent::tool_call_delta("c1", "{\"pat"));
        acc.process(&StreamEvent::tool_call_delta("c1", "tern\":\"x\"}"));
        acc.process(&StreamEvent::tool_call_end("c1"));
        let calls = acc.response().tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, serde_json::json!({"pattern": "x"}));
    }

    #[test]
    fn delta_with_empty_id_targets_last_started_call() {
        let mut acc = StreamAccumulator::new();
        acc.process(&StreamEvent::tool_call_start("c1", "grep"));
        acc.process(&StreamEvent::tool_call_delta("", "{}"));
        let calls = acc.response().tool_calls();
        assert_eq!(calls[0].arguments, serde_json::json!({}));
    }

    #[test]
    fn finish_response_wins_over_accumulation() {
        let mut acc = StreamAccumulator::new();
        acc.process(&StreamEvent::text_delta("partial"));
        let full = Response {
            id: "r1".into(),
            model: "m".into(),
            provider: "p".into(),
            message: Message::assistant("complete"),
            finish_reason: FinishReason::stop(),
            usage: Usage::default(),
            warnings: None,
        };
        acc.process(&StreamEvent::finish_with_response(full));
        assert_eq!(acc.response().text(), "complete");
    }
}
