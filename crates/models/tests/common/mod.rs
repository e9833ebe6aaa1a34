//! Shared test adapters. Deterministic; no network.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use orrery_models::{
    BoxFuture, BoxStream, ContentPart, FinishReason, LlmError, LlmResult, Message, ProviderAdapter,
    Reason, Request, Response, Role, StreamEvent, Usage,
};

/// Build a simple text response.
pub fn make_response(provider: &str, text: &str) -> Response {
    Response {
        id: "test-id".into(),
        model: "test-model".into(),
        provider: provider.into(),
        message: Message::assistant(text),
        finish_reason: FinishReason::stop(),
        usage: Usage::new(10, 5),
        warnings: None,
    }
}

/// Build a response that calls the given tools.
pub fn make_tool_call_response(provider: &str, calls: &[(&str, &str, serde_json::Value)]) -> Response {
    let parts: Vec<ContentPart> = calls
        .iter()
        .map(|(id, name, args)| ContentPart::tool_call(*id, *name, args.clone()))
        .collect();
    Response {
        id: "tool-id".into(),
        model: "test-model".into(),
        provider: provider.into(),
        message: Message::new(Role::Assistant, parts),
        finish_reason: FinishReason::new(Reason::ToolCalls, None),
        usage: Usage::new(20, 10),
        warnings: None,
    }
}

/// Returns a fixed response; streams it as start + per-char deltas +
/// finish-with-response.
pub struct MockAdapter {
    name: &'static str,
    response: Response,
}

impl MockAdapter {
    pub fn new(name: &'static str, response: Response) -> Self {
        Self { name, response }
    }

    pub fn with_text(name: &'static str, text: &str) -> Self {
        Self::new(name, make_response(name, text))
    }
}

impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        self.name
    }

    fn complete(&self, _request: Request) -> BoxFuture<'_, LlmResult<Response>> {
        let response = self.response.clone();
        Box::pin(async move { Ok(response) })
    }

    fn stream(
        &self,
        _request: Request,
    ) -> BoxFuture<'_, LlmResult<BoxStream<'_, LlmResult<StreamEvent>>>> {
        let response = self.response.clone();
        Box::pin(async move {
            let mut events: Vec<LlmResult<StreamEvent>> = vec![Ok(StreamEvent::stream_start())];
            for chunk in response.text().chars() {
                events.push(Ok(StreamEvent::text_delta(chunk.to_string())));
            }
            events.push(Ok(StreamEvent::finish_with_response(response)));
            Ok(Box::pin(futures::stream::iter(events)) as BoxStream<'_, LlmResult<StreamEvent>>)
        })
    }
}

/// Always fails with a fixed error.
pub struct ErrorAdapter {
    name: &'static str,
    error: LlmError,
}

impl ErrorAdapter {
    pub fn new(name: &'static str, error: LlmError) -> Self {
        Self { name, error }
    }
}

impl ProviderAdapter for ErrorAdapter {
    fn name(&self) -> &str {
        self.name
    }

    fn complete(&self, _request: Request) -> BoxFuture<'_, LlmResult<Response>> {
        let error = self.error.clone();
        Box::pin(async move { Err(error) })
    }

    fn stream(
        &self,
        _request: Request,
    ) -> BoxFuture<'_, LlmResult<BoxStream<'_, LlmResult<StreamEvent>>>> {
        let error = self.error.clone();
        Box::pin(async move { Err(error) })
    }
}

/// Pops one scripted response per call; repeats the last when exhausted.
/// Counts calls.
pub struct ScriptedAdapter {
    name: &'static str,
    responses: Mutex<Vec<Response>>,
    calls: AtomicU32,
}

impl ScriptedAdapter {
    pub fn new(name: &'static str, mut responses: Vec<Response>) -> Self {
        responses.reverse(); // pop() yields in the scripted order
        Self {
            name,
            responses: Mutex::new(responses),
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        self.name
    }

    fn complete(&self, _request: Request) -> BoxFuture<'_, LlmResult<Response>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = {
            let mut responses = self.responses.lock().expect("lock");
            if responses.len() > 1 {
                responses.pop()
            } else {
                responses.last().cloned()
            }
        };
        Box::pin(async move {
            response.ok_or(LlmError::Configuration {
                message: "scripted adapter has no responses".into(),
            })
        })
    }

    fn stream(
        &self,
        request: Request,
    ) -> BoxFuture<'_, LlmResult<BoxStream<'_, LlmResult<StreamEvent>>>> {
        let response_future = self.complete(request);
        Box::pin(async move {
            let response = response_future.await?;
            let events: Vec<LlmResult<StreamEvent>> = vec![
                Ok(StreamEvent::stream_start()),
                Ok(StreamEvent::text_delta(response.text())),
                Ok(StreamEvent::finish_with_response(response)),
            ];
            Ok(Box::pin(futures::stream::iter(events)) as BoxStream<'_, LlmResult<StreamEvent>>)
        })
    }
}
