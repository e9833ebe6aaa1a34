//! Session event delivery.
//!
//! An [`EventEmitter`] / [`EventReceiver`] pair over an unbounded tokio
//! channel. The emitter stamps every event with the session id and a
//! timestamp; emission silently discards when the receiver is gone; the
//! loop must never fail because nobody is listening.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::types::{EventKind, SessionEvent, SessionState, now_timestamp};

/// An `(EventEmitter, EventReceiver)` pair with a fresh UUID session id.
#[must_use]
pub fn channel() -> (EventEmitter, EventReceiver) {
    channel_with_id(uuid::Uuid::new_v4().to_string())
}

/// Pair with a caller-chosen session id, for deterministic tests.
#[must_use]
pub fn channel_with_id(session_id: String) -> (EventEmitter, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventEmitter {
            session_id: session_id.clone(),
            tx,
        },
        EventReceiver { session_id, rx },
    )
}

/// Sends [`SessionEvent`]s into the channel.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    session_id: String,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventEmitter {
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stamp and send. Dropped receivers are ignored.
    pub fn emit(&self, kind: EventKind, data: serde_json::Map<String, Value>) {
        let event = SessionEvent {
            kind,
            timestamp: now_timestamp(),
            session_id: self.session_id.clone(),
            data,
        };
        let _ = self.tx.send(event);
    }

    pub fn emit_session_start(&self) {
        self.emit(EventKind::SessionStart, serde_json::Map::new());
    }

    pub fn emit_session_end(&self, final_state: SessionState) {
        let mut data = serde_json::Map::new();
        if let Ok(value) = serde_json::to_value(final_state) {
            data.insert("final_state".into(), value);
        }
        self.emit(EventKind::SessionEnd, data);
    }

    pub fn emit_user_input(&self, content: &str) {
        let mut data = serde_json::Map::new();
        data.insert("content".into(), Value::String(content.into()));
        self.emit(EventKind::UserInput, data);
    }

    pub fn emit_steering_injected(&self, content: &str) {
        let mut data = serde_json::Map::new();
        data.insert("content".into(), Value::String(content.into()));
        self.emit(EventKind::SteeringInjected, data);
    }

    pub fn emit_llm_call_start(&self, model: &str, round: u32) {
        let mut data = serde_json::Map::new();
        data.insert("model".into(), Value::String(model.into()));
        data.insert("round".into(), Value::Number(round.into()));
        self.emit(EventKind::LlmCallStart, data);
    }

    pub fn emit_llm_call_end(&self, response_id: &str, round: u32) {
        let mut data = serde_json::Map::new();
        data.insert("response_id".into(), Value::String(response_id.into()));
        data.insert("round".into(), Value::Number(round.into()));
        self.emit(EventKind::LlmCallEnd, data);
    }

    pub fn emit_assistant_text_end(&self, text: &str, reasoning: Option<&str>) {
        let mut data = serde_json::Map::new();
        data.insert("text".into(), Value::String(text.into()));
        if let Some(reasoning) = reasoning {
            data.insert("reasoning".into(), Value::String(reasoning.into()));
        }
        self.emit(EventKind::AssistantTextEnd, data);
    }

    pub fn emit_tool_call_start(&self, tool_name: &str, call_id: &str, arguments: &Value) {
        let mut data = serde_json::Map::new();
        data.insert("tool_name".into(), Value::String(tool_name.into()));
        data.insert("call_id".into(), Value::String(call_id.into()));
        data.insert("arguments".into(), arguments.clone());
        self.emit(EventKind::ToolCallStart, data);
    }

    /// `TOOL_CALL_END` carries the full, untruncated output.
    pub fn emit_tool_call_end(&self, call_id: &str, output: &str) {
        let mut data = serde_json::Map::new();
        data.insert("call_id".into(), Value::String(call_id.into()));
        data.insert("output".into(), Value::String(output.into()));
        self.emit(EventKind::ToolCallEnd, data);
    }

    pub fn emit_tool_call_end_error(&self, call_id: &str, error: &str) {
        let mut data = serde_json::Map::new();
        data.insert("call_id".into(), Value::String(call_id.into()));
        data.insert("error".into(), Value::String(error.into()));
        self.emit(EventKind::ToolCallEnd, data);
    }

    pub fn emit_turn_complete(&self, reason: &str) {
        let mut data = serde_json::Map::new();
        data.insert("reason".into(), Value::String(reason.into()));
        self.emit(EventKind::TurnComplete, data);
    }

    pub fn emit_turn_limit(&self, limit_type: &str, count: u32) {
        let mut data = serde_json::Map::new();
        data.insert("limit_type".into(), Value::String(limit_type.into()));
        data.insert("count".into(), Value::Number(count.into()));
        self.emit(EventKind::TurnLimit, data);
    }

    pub fn emit_loop_detection(&self, message: &str) {
        let mut data = serde_json::Map::new();
        data.insert("message".into(), Value::String(message.into()));
        self.emit(EventKind::LoopDetection, data);
    }

    pub fn emit_warning(&self, message: &str, data_extra: serde_json::Map<String, Value>) {
        let mut data = data_extra;
        data.insert("message".into(), Value::String(message.into()));
        self.emit(EventKind::Warning, data);
    }

    pub fn emit_error(&self, code: &str, message: &str) {
        let mut data = serde_json::Map::new();
        data.insert("code".into(), Value::String(code.into()));
        data.insert("message".into(), Value::String(message.into()));
        self.emit(EventKind::Error, data);
    }

    pub fn emit_subagent_spawn(&self, agent_id: &str) {
        let mut data = serde_json::Map::new();
        data.insert("agent_id".into(), Value::String(agent_id.into()));
        self.emit(EventKind::SubagentSpawn, data);
    }

    pub fn emit_subagent_complete(&self, agent_id: &str, success: bool) {
        let mut data = serde_json::Map::new();
        data.insert("agent_id".into(), Value::String(agent_id.into()));
        data.insert("success".into(), Value::Bool(success));
        self.emit(EventKind::SubagentComplete, data);
    }
}

/// Receives [`SessionEvent`]s from the paired emitter.
#[derive(Debug)]
pub struct EventReceiver {
    session_id: String,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventReceiver {
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The next event; `None` once the emitter is gone and the buffer is
    /// drained.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive of a buffered event.
    pub fn try_recv(&mut self) -> Result<SessionEvent, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
