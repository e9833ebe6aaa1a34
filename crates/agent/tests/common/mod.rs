//! Shared helpers for session tests: a scripted model client and profile
//! builders. Deterministic; no network.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use orrery_agent::{BaseProfile, ModelClient, ProviderProfile, RegisteredTool, tool_fn};
use orrery_models::{
    ContentPart, FinishReason, LlmError, Message, Reason, Request, Response, Role, ToolDefinition,
    Usage,
};
use serde_json::json;

/// A text-only assistant response.
pub fn text_response(text: &str) -> Response {
    Response {
        id: "r-text".into(),
        model: "test-model".into(),
        provider: "mock".into(),
        message: Message::assistant(text),
        finish_reason: FinishReason::stop(),
        usage: Usage::new(10, 5),
        warnings: None,
    }
}

/// An assistant response carrying tool calls.
pub fn tool_call_response(calls: &[(&str, &str, serde_json::Value)]) -> Response {
    let parts: Vec<ContentPart> = calls
        .iter()
        .map(|(id, name, args)| ContentPart::tool_call(*id, *name, args.clone()))
        .collect();
    Response {
        id: "r-tools".into(),
        model: "test-model".into(),
        provider: "mock".into(),
        message: Message::new(Role::Assistant, parts),
        finish_reason: FinishReason::new(Reason::ToolCalls, None),
        usage: Usage::new(20, 10),
        warnings: None,
    }
}

/// Scripted model client: pops responses in order and repeats the final
/// one when the script runs dry.
pub struct ScriptedClient {
    responses: Mutex<Vec<Response>>,
    calls: AtomicU32,
}

impl ScriptedClient {
    pub fn new(mut responses: Vec<Response>) -> Self {
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn complete(&self, _request: Request) -> Result<Response, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().expect("lock");
        let response = if responses.len() > 1 {
            responses.pop()
        } else {
            responses.last().cloned()
        };
        response.ok_or(LlmError::Configuration {
            message: "script exhausted".into(),
        })
    }
}

/// A client that always fails with the given error.
pub struct FailingClient {
    pub error: LlmError,
}

#[async_trait]
impl ModelClient for FailingClient {
    async fn complete(&self, _request: Request) -> Result<Response, LlmError> {
        Err(self.error.clone())
    }
}

/// A profile with a `read_file` echo tool registered.
pub fn profile_with_read_tool() -> BaseProfile {
    let mut profile = BaseProfile::new("anthropic", "test-model");
    profile.tool_registry_mut().register(read_file_tool());
    profile
}

/// A `read_file` tool whose executor answers `contents of <path>`.
pub fn read_file_tool() -> RegisteredTool {
    tool_fn(
        ToolDefinition {
            name: "read_file".into(),
            description: "Read a file".into(),
            parameters: json!({
                "type": "object",
                "properties": {"file_path": {"type": "string"}},
                "required": ["file_path"]
            }),
            strict: false,
        },
        |args, _env| {
            Box::pin(async move {
                let path = args
                    .get("file_path")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("?");
                Ok(format!("contents of {path}"))
            })
        },
    )
}
