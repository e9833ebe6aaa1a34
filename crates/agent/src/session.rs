//! The agent session and its model↔tool loop.
//!
//! A [`Session`] owns the conversation: it accepts user input, drives
//! alternating model calls and tool rounds, injects steering, detects
//! loops, supervises subagents, and emits typed events for every step.
//!
//! # Testing
//!
//! The [`ModelClient`] trait abstracts the LLM call. Production code wraps
//! the real [`orrery_models::Client`]; tests inject mocks that script
//! responses.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use orrery_models::{
    AbortSignal, ContentPart, LlmError, Message, Request, Response, RetryConfig, Role, ToolCall,
    ToolChoice, ToolResult, retry,
};
use serde_json::Value;

use crate::error::{AgentError, AgentResult};
use crate::events::{self, EventEmitter, EventReceiver};
use crate::execution::ExecutionEnvironment;
use crate::loop_detector;
use crate::profile::ProviderProfile;
use crate::prompts;
use crate::registry::ToolRegistry;
use crate::subagents::SubagentManager;
use crate::truncation::{TruncationConfig, truncate_tool_output};
use crate::types::{SessionConfig, SessionState, Turn, now_timestamp};

// ---------------------------------------------------------------------------
// ModelClient
// ---------------------------------------------------------------------------

/// Abstraction over the LLM client, for testability.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: Request) -> Result<Response, LlmError>;
}

/// Production implementation over [`orrery_models::Client`].
pub struct ClientAdapter {
    client: orrery_models::Client,
}

impl ClientAdapter {
    pub fn new(client: orrery_models::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ModelClient for ClientAdapter {
    async fn complete(&self, request: Request) -> Result<Response, LlmError> {
        self.client.complete(request).await
    }
}

// ---------------------------------------------------------------------------
// Steering queue
// ---------------------------------------------------------------------------

/// A shareable steering queue.
///
/// Shared so that a supervisor can inject messages into a child session
/// while its submit is in flight; the loop drains it between rounds.
#[derive(Debug, Clone, Default)]
pub struct SteeringQueue {
    inner: Arc<StdMutex<VecDeque<String>>>,
}

impl SteeringQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: impl Into<String>) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(message.into());
    }

    /// Take everything queued so far, in order.
    #[must_use]
    pub fn drain(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A long-lived, single-owner agent session.
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    history: Vec<Turn>,
    profile: Box<dyn ProviderProfile>,
    execution_env: Arc<dyn ExecutionEnvironment>,
    client: Arc<dyn ModelClient>,
    events: EventEmitter,
    steering: SteeringQueue,
    followup_queue: VecDeque<String>,
    abort_signal: Option<AbortSignal>,
    retry_config: RetryConfig,
    truncation_config: TruncationConfig,
    /// Sliding window of recent tool-call signatures for loop detection.
    tool_call_signatures: VecDeque<String>,
    subagents: SubagentManager,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("history_len", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a top-level session. Emits `SESSION_START` once.
    pub fn new(
        profile: Box<dyn ProviderProfile>,
        execution_env: Arc<dyn ExecutionEnvironment>,
        client: Arc<dyn ModelClient>,
        config: SessionConfig,
    ) -> (Self, EventReceiver) {
        Self::new_at_depth(profile, execution_env, client, config, 0)
    }

    /// Create a session at a given subagent depth. Depth 0 is top-level;
    /// children get depth + 1 and inherit the depth budget, not a global
    /// counter.
    pub fn new_at_depth(
        mut profile: Box<dyn ProviderProfile>,
        execution_env: Arc<dyn ExecutionEnvironment>,
        client: Arc<dyn ModelClient>,
        config: SessionConfig,
        current_depth: u32,
    ) -> (Self, EventReceiver) {
        let (emitter, receiver) = events::channel();
        emitter.emit_session_start();

        // Sessions that may spawn children advertise the subagent tools.
        if current_depth < config.max_subagent_depth {
            profile.register_subagent_tools();
        }

        let truncation_config = TruncationConfig {
            tool_output_limits: config.tool_output_limits.clone(),
            tool_line_limits: config.tool_line_limits.clone(),
        };

        let subagents = SubagentManager::new(
            Arc::clone(&execution_env),
            Arc::clone(&client),
            emitter.clone(),
            current_depth,
            config.max_subagent_depth,
        );

        let session = Self {
            config,
            state: SessionState::Idle,
            history: Vec::new(),
            profile,
            execution_env,
            client,
            events: emitter,
            steering: SteeringQueue::new(),
            followup_queue: VecDeque::new(),
            abort_signal: None,
            retry_config: RetryConfig::default(),
            truncation_config,
            tool_call_signatures: VecDeque::new(),
            subagents,
        };
        (session, receiver)
    }

    // -- Public contract --

    /// Drive the loop for one input, to natural completion or a limit.
    ///
    /// A closed session rejects the submit; a concurrent submit (observable
    /// through re-entrancy) fails with "already processing". LLM failures
    /// close the session and are reported through events, not as an `Err`.
    pub async fn submit(&mut self, input: &str) -> AgentResult<()> {
        match self.state {
            SessionState::Closed => return Err(AgentError::SessionClosed),
            SessionState::Processing => return Err(AgentError::AlreadyProcessing),
            SessionState::Idle => {}
        }
        self.state = SessionState::Processing;
        self.process_input(input).await
    }

    /// Queue an out-of-band instruction for injection before the next
    /// model call. Non-blocking.
    pub fn steer(&mut self, message: impl Into<String>) {
        self.steering.push(message);
    }

    /// Queue an input to submit after the current one fully completes.
    pub fn follow_up(&mut self, message: impl Into<String>) {
        self.followup_queue.push_back(message.into());
    }

    /// The shared steering queue; supervisors hold this to inject while a
    /// submit is in flight.
    #[must_use]
    pub fn steering_handle(&self) -> SteeringQueue {
        self.steering.clone()
    }

    /// Change the reasoning effort for subsequent rounds.
    pub fn set_reasoning_effort(&mut self, effort: Option<crate::types::ReasoningEffort>) {
        self.config.reasoning_effort = effort;
    }

    /// Close the session. Idempotent; emits `SESSION_END` exactly once.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            self.subagents.close_all();
            self.state = SessionState::Closed;
            self.events.emit_session_end(self.state);
        }
    }

    pub fn set_abort_signal(&mut self, signal: AbortSignal) {
        self.abort_signal = Some(signal);
    }

    pub fn set_retry_config(&mut self, config: RetryConfig) {
        self.retry_config = config;
    }

    // -- Getters --

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        self.events.session_id()
    }

    /// Count of user and assistant turns; the unit `max_turns` limits.
    #[must_use]
    pub fn counted_turns(&self) -> u32 {
        self.history
            .iter()
            .filter(|t| t.counts_toward_turn_limit())
            .count() as u32
    }

    // -- The loop --

    async fn process_input(&mut self, input: &str) -> AgentResult<()> {
        self.history.push(Turn::user(input));
        self.events.emit_user_input(input);
        self.drain_steering();

        // Project docs are computed once per submitted input.
        let system_prompt =
            match prompts::build_system_prompt(self.profile.as_ref(), &*self.execution_env).await {
                Ok(prompt) => prompt,
                Err(err) => {
                    tracing::warn!("failed to build system prompt: {err}");
                    self.profile.base_instructions().to_string()
                }
            };

        let mut round: u32 = 0;

        loop {
            if self.is_aborted() {
                self.close();
                return Ok(());
            }

            if self.config.max_turns > 0 && self.counted_turns() >= self.config.max_turns {
                self.events.emit_turn_limit("max_turns", self.counted_turns());
                break;
            }
            if round >= self.config.max_tool_rounds_per_input {
                self.events
                    .emit_turn_limit("max_tool_rounds_per_input", round);
                break;
            }

            self.check_context_usage(&system_prompt);

            let request = self.build_request(&system_prompt);
            self.events.emit_llm_call_start(self.profile.model(), round);

            let completion = {
                let client = Arc::clone(&self.client);
                let retry_config = self.retry_config.clone();
                let call = retry(&retry_config, || client.complete(request.clone()));
                match &self.abort_signal {
                    Some(signal) => {
                        tokio::select! {
                            result = call => Some(result),
                            () = signal.cancelled() => None,
                        }
                    }
                    None => Some(call.await),
                }
            };

            let response = match completion {
                None => {
                    self.close();
                    return Ok(());
                }
                Some(Ok(response)) => response,
                Some(Err(err)) => {
                    // Retries are exhausted inside the retry wrapper; an
                    // error here is final. Report it through events and
                    // close without throwing.
                    self.events.emit_error(err.code(), &err.to_string());
                    self.subagents.close_all();
                    self.state = SessionState::Closed;
                    self.events.emit_session_end(self.state);
                    return Ok(());
                }
            };

            self.events.emit_llm_call_end(&response.id, round);

            let text = response.text();
            let tool_calls = response.tool_calls();
            let reasoning = response.reasoning();
            self.events
                .emit_assistant_text_end(&text, reasoning.as_deref());
            self.history.push(Turn::Assistant {
                content: text,
                tool_calls: tool_calls.clone(),
                reasoning,
                usage: response.usage.clone(),
                response_id: Some(response.id.clone()),
                timestamp: now_timestamp(),
            });

            if tool_calls.is_empty() {
                self.events.emit_turn_complete("natural");
                break;
            }

            round += 1;

            let Some(results) = self.execute_tool_calls(&tool_calls).await else {
                // Abort observed mid-execution: in-flight results are
                // dropped rather than appended.
                self.close();
                return Ok(());
            };
            self.history.push(Turn::tool_results(results));

            self.drain_steering();

            if self.config.enable_loop_detection {
                self.check_loop_detection(&tool_calls);
            }
        }

        if let Some(followup) = self.followup_queue.pop_front() {
            return Box::pin(self.process_input(&followup)).await;
        }

        self.state = SessionState::Idle;
        Ok(())
    }

    // -- Request building --

    fn build_request(&self, system_prompt: &str) -> Request {
        let mut messages = vec![Message::system(system_prompt)];
        messages.extend(self.history_as_messages());

        let mut request = Request::new(self.profile.model(), messages);
        request.provider = Some(self.profile.id().to_string());
        request.tools = Some(self.profile.tools());
        request.tool_choice = Some(ToolChoice::Auto);
        request.reasoning_effort = self
            .config
            .reasoning_effort
            .map(|e| e.as_str().to_string());
        if let Some(options) = self.profile.provider_options() {
            request.provider_options = Some(options);
        }
        request
    }

    /// Convert history to provider messages.
    ///
    /// Steering turns become user-role messages; to the model, steering
    /// is indistinguishable from the user. A batch of N tool results
    /// becomes N consecutive tool-role messages.
    fn history_as_messages(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        for turn in &self.history {
            match turn {
                Turn::User { content, .. } | Turn::Steering { content, .. } => {
                    messages.push(Message::user(content.as_str()));
                }
                Turn::System { content, .. } => {
                    messages.push(Message::system(content.as_str()));
                }
                Turn::Assistant {
                    content,
                    tool_calls,
                    ..
                } => {
                    if tool_calls.is_empty() {
                        messages.push(Message::assistant(content.as_str()));
                    } else {
                        let mut parts = Vec::new();
                        if !content.is_empty() {
                            parts.push(ContentPart::text(content.as_str()));
                        }
                        for tc in tool_calls {
                            parts.push(ContentPart::tool_call(
                                tc.id.clone(),
                                tc.name.clone(),
                                tc.arguments.clone(),
                            ));
                        }
                        messages.push(Message::new(Role::Assistant, parts));
                    }
                }
                Turn::ToolResults { results, .. } => {
                    for result in results {
                        messages.push(Message::tool_result(
                            result.tool_call_id.clone(),
                            result.content.clone(),
                            result.is_error,
                        ));
                    }
                }
            }
        }
        messages
    }

    // -- Steering --

    fn drain_steering(&mut self) {
        for message in self.steering.drain() {
            self.events.emit_steering_injected(&message);
            self.history.push(Turn::steering(message));
        }
    }

    // -- Tool execution --

    /// Execute one round of tool calls. Returns `None` when the abort
    /// signal fires mid-round; results are in input order regardless of
    /// execution strategy.
    async fn execute_tool_calls(&mut self, tool_calls: &[ToolCall]) -> Option<Vec<ToolResult>> {
        let abort = self.abort_signal.clone();

        let work = async {
            let has_subagent_call = tool_calls
                .iter()
                .any(|tc| SubagentManager::is_subagent_tool(&tc.name));

            if has_subagent_call {
                // Subagent calls need &mut the manager; run the whole
                // round sequentially.
                let mut results = Vec::with_capacity(tool_calls.len());
                for tc in tool_calls {
                    if SubagentManager::is_subagent_tool(&tc.name) {
                        results.push(self.execute_subagent_tool(tc).await);
                    } else {
                        results.push(
                            execute_tool(
                                tc,
                                self.profile.tool_registry(),
                                &*self.execution_env,
                                &self.events,
                                &self.truncation_config,
                            )
                            .await,
                        );
                    }
                }
                results
            } else if self.profile.supports_parallel_tool_calls() && tool_calls.len() > 1 {
                let registry = self.profile.tool_registry();
                let env = &*self.execution_env;
                let events = &self.events;
                let truncation = &self.truncation_config;
                let futures: Vec<_> = tool_calls
                    .iter()
                    .map(|tc| execute_tool(tc, registry, env, events, truncation))
                    .collect();
                futures::future::join_all(futures).await
            } else {
                let mut results = Vec::with_capacity(tool_calls.len());
                for tc in tool_calls {
                    results.push(
                        execute_tool(
                            tc,
                            self.profile.tool_registry(),
                            &*self.execution_env,
                            &self.events,
                            &self.truncation_config,
                        )
                        .await,
                    );
                }
                results
            }
        };

        match abort {
            Some(signal) => {
                tokio::select! {
                    results = work => Some(results),
                    () = signal.cancelled() => None,
                }
            }
            None => Some(work.await),
        }
    }

    async fn execute_subagent_tool(&mut self, tool_call: &ToolCall) -> ToolResult {
        self.events
            .emit_tool_call_start(&tool_call.name, &tool_call.id, &tool_call.arguments);

        let result = self
            .subagents
            .execute(
                &tool_call.name,
                tool_call.arguments.clone(),
                self.profile.as_ref(),
                &self.config,
            )
            .await;

        match result {
            Ok(output) => {
                self.events.emit_tool_call_end(&tool_call.id, &output);
                let truncated =
                    truncate_tool_output(&output, &tool_call.name, &self.truncation_config);
                ToolResult {
                    tool_call_id: tool_call.id.clone(),
                    content: Value::String(truncated),
                    is_error: false,
                }
            }
            Err(err) => {
                let message = err.to_string();
                self.events.emit_tool_call_end_error(&tool_call.id, &message);
                ToolResult {
                    tool_call_id: tool_call.id.clone(),
                    content: Value::String(message),
                    is_error: true,
                }
            }
        }
    }

    // -- Context usage --

    /// Warn when the estimated prompt size crosses 80% of the profile's
    /// context window. Heuristic: one token per four characters.
    fn check_context_usage(&self, system_prompt: &str) {
        let mut chars: u64 = system_prompt.len() as u64;
        for turn in &self.history {
            match turn {
                Turn::User { content, .. }
                | Turn::Steering { content, .. }
                | Turn::System { content, .. } => chars += content.len() as u64,
                Turn::Assistant {
                    content,
                    tool_calls,
                    reasoning,
                    ..
                } => {
                    chars += content.len() as u64;
                    for tc in tool_calls {
                        chars += tc.name.len() as u64;
                        chars += tc.arguments.to_string().len() as u64;
                    }
                    if let Some(reasoning) = reasoning {
                        chars += reasoning.len() as u64;
                    }
                }
                Turn::ToolResults { results, .. } => {
                    for result in results {
                        chars += match &result.content {
                            Value::String(s) => s.len() as u64,
                            _ => 100,
                        };
                    }
                }
            }
        }

        let approx_tokens = chars / 4;
        let window = self.profile.context_window_size();
        if window > 0 && approx_tokens * 10 > window * 8 {
            let pct = approx_tokens * 100 / window;
            let mut data = serde_json::Map::new();
            data.insert("approx_tokens".into(), Value::Number(approx_tokens.into()));
            data.insert("context_window_size".into(), Value::Number(window.into()));
            data.insert("percent".into(), Value::Number(pct.into()));
            self.events.emit_warning(
                &format!("Context usage at ~{pct}% of the context window"),
                data,
            );
        }
    }

    // -- Loop detection --

    fn check_loop_detection(&mut self, round_calls: &[ToolCall]) {
        let window = self.config.loop_detection_window as usize;
        for tc in round_calls {
            self.tool_call_signatures
                .push_back(loop_detector::tool_call_signature(tc));
            while self.tool_call_signatures.len() > window {
                self.tool_call_signatures.pop_front();
            }
        }

        let signatures: Vec<String> = self.tool_call_signatures.iter().cloned().collect();
        if let Some(message) = loop_detector::detect_loop(&signatures, window) {
            self.events.emit_loop_detection(&message);
            self.history.push(Turn::steering(message));
        }
    }

    // -- Helpers --

    fn is_aborted(&self) -> bool {
        self.abort_signal.as_ref().is_some_and(AbortSignal::is_aborted)
    }
}

// ---------------------------------------------------------------------------
// Tool execution (free function, usable without &mut Session)
// ---------------------------------------------------------------------------

/// Execute one tool call: start event, registry dispatch, end event with
/// the untruncated output, truncated content for the model.
async fn execute_tool(
    tool_call: &ToolCall,
    registry: &ToolRegistry,
    env: &dyn ExecutionEnvironment,
    events: &EventEmitter,
    truncation: &TruncationConfig,
) -> ToolResult {
    events.emit_tool_call_start(&tool_call.name, &tool_call.id, &tool_call.arguments);

    // Arguments that failed to parse from a raw string never reach the
    // executor.
    if let Some(parse_error) = &tool_call.parse_error {
        let message = format!("invalid tool arguments: {parse_error}");
        events.emit_tool_call_end_error(&tool_call.id, &message);
        return ToolResult {
            tool_call_id: tool_call.id.clone(),
            content: Value::String(message),
            is_error: true,
        };
    }

    let dispatch = registry
        .dispatch(&tool_call.name, tool_call.arguments.clone(), env)
        .await;

    if dispatch.is_error {
        events.emit_tool_call_end_error(&tool_call.id, &dispatch.output);
    } else {
        events.emit_tool_call_end(&tool_call.id, &dispatch.output);
    }

    let truncated = truncate_tool_output(&dispatch.output, &tool_call.name, truncation);
    ToolResult {
        tool_call_id: tool_call.id.clone(),
        content: Value::String(truncated),
        is_error: dispatch.is_error,
    }
}
