//! High-level generation: a self-contained tool-calling loop over
//! [`Client::complete`].
//!
//! This is independent of any session machinery; callers that want
//! conversation history, steering, or events use the agent layer instead.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::cancel::{AbortController, AbortSignal};
use crate::client::Client;
use crate::error::{LlmError, LlmResult};
use crate::provider::BoxFuture;
use crate::retry::{RetryConfig, retry};
use crate::types::finish::{FinishReason, Reason};
use crate::types::message::Message;
use crate::types::request::Request;
use crate::types::response::Response;
use crate::types::tool::{ToolChoice, ToolDefinition, ToolResult};
use crate::types::usage::Usage;

type ToolExecutorFn = Arc<dyn Fn(Value) -> BoxFuture<'static, LlmResult<Value>> + Send + Sync>;

/// A tool offered to the model.
///
/// An *active* tool carries an executor and is run by the loop when
/// called; a *passive* tool is definition-only; a call to it ends the
/// loop so the caller can handle it.
#[derive(Clone)]
pub struct Tool {
    pub definition: ToolDefinition,
    executor: Option<ToolExecutorFn>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.definition.name)
            .field("active", &self.executor.is_some())
            .finish()
    }
}

impl Tool {
    /// A tool the loop executes itself.
    pub fn active<F, Fut>(definition: ToolDefinition, executor: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = LlmResult<Value>> + Send + 'static,
    {
        Self {
            definition,
            executor: Some(Arc::new(move |args| Box::pin(executor(args)))),
        }
    }

    /// A definition-only tool.
    #[must_use]
    pub fn passive(definition: ToolDefinition) -> Self {
        Self {
            definition,
            executor: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.executor.is_some()
    }
}

/// One model round: the response, plus the tool results produced from it
/// (empty for the final round).
#[derive(Debug, Clone)]
pub struct StepResult {
    pub response: Response,
    pub tool_results: Vec<ToolResult>,
}

/// The outcome of [`generate`].
#[derive(Debug, Clone)]
pub struct GenerateResult {
    /// Text of the final response.
    pub text: String,
    /// The final response.
    pub response: Response,
    /// Every round, in order.
    pub steps: Vec<StepResult>,
    pub finish_reason: FinishReason,
    /// Usage summed across all rounds.
    pub usage: Usage,
}

type StopPredicate = Box<dyn Fn(&StepResult) -> bool + Send + Sync>;

/// Options for [`generate`]. Build with the fluent methods and pass to
/// [`generate`].
pub struct GenerateOptions<'a> {
    model: String,
    prompt: Option<String>,
    messages: Option<Vec<Message>>,
    system: Option<String>,
    provider: Option<String>,
    tools: Vec<Tool>,
    tool_choice: Option<ToolChoice>,
    max_tool_rounds: u32,
    stop_when: Option<StopPredicate>,
    abort: Option<AbortSignal>,
    timeout: Option<Duration>,
    retry: RetryConfig,
    client: Option<&'a Client>,
}

impl<'a> GenerateOptions<'a> {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: None,
            messages: None,
            system: None,
            provider: None,
            tools: Vec::new(),
            tool_choice: None,
            max_tool_rounds: 8,
            stop_when: None,
            abort: None,
            timeout: None,
            retry: RetryConfig::default(),
            client: None,
        }
    }

    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    #[must_use]
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    /// Maximum tool-execution rounds. Zero means a single model call with
    /// no tool execution; calls come back to the caller unexecuted.
    #[must_use]
    pub fn max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Stop the loop early when the predicate returns true for a step.
    #[must_use]
    pub fn stop_when(mut self, predicate: impl Fn(&StepResult) -> bool + Send + Sync + 'static) -> Self {
        self.stop_when = Some(Box::new(predicate));
        self
    }

    #[must_use]
    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }

    /// Overall wall-clock limit, enforced by aborting.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn client(mut self, client: &'a Client) -> Self {
        self.client = Some(client);
        self
    }
}

/// Await abort on any of the given signals; pends forever when none.
async fn wait_abort(signals: &[AbortSignal]) {
    if signals.is_empty() {
        futures::future::pending::<()>().await;
    }
    let futures: Vec<_> = signals.iter().map(|s| Box::pin(s.cancelled())).collect();
    futures::future::select_all(futures).await;
}

/// Run the generation loop.
pub async fn generate(options: GenerateOptions<'_>) -> LlmResult<GenerateResult> {
    let client = options.client.ok_or_else(|| LlmError::Configuration {
        message: "generate requires a client".into(),
    })?;

    // Standardize the conversation input.
    let mut messages = match (&options.prompt, &options.messages) {
        (Some(_), Some(_)) => {
            return Err(LlmError::Configuration {
                message: "set prompt or messages, not both".into(),
            });
        }
        (Some(prompt), None) => vec![Message::user(prompt.clone())],
        (None, Some(messages)) => messages.clone(),
        (None, None) => {
            return Err(LlmError::Configuration {
                message: "generate requires a prompt or messages".into(),
            });
        }
    };
    if let Some(system) = &options.system {
        messages.insert(0, Message::system(system.clone()));
    }

    // The timeout is just an abort on a timer.
    let mut signals = Vec::new();
    if let Some(signal) = &options.abort {
        signals.push(signal.clone());
    }
    if let Some(timeout) = options.timeout {
        let controller = AbortController::new();
        signals.push(controller.signal());
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            controller.abort();
        });
    }

    let definitions: Vec<ToolDefinition> =
        options.tools.iter().map(|t| t.definition.clone()).collect();

    let mut steps: Vec<StepResult> = Vec::new();
    let mut total_usage = Usage::default();
    let mut executed_rounds: u32 = 0;

    loop {
        if signals.iter().any(AbortSignal::is_aborted) {
            return Err(LlmError::Abort {
                message: "generation aborted".into(),
            });
        }

        let mut request = Request::new(options.model.clone(), messages.clone());
        request.provider = options.provider.clone();
        if !definitions.is_empty() {
            request.tools = Some(definitions.clone());
            request.tool_choice = Some(options.tool_choice.clone().unwrap_or(ToolChoice::Auto));
        }

        let response = tokio::select! {
            result = retry(&options.retry, || client.complete(request.clone())) => result?,
            () = wait_abort(&signals) => {
                return Err(LlmError::Abort {
                    message: "generation aborted".into(),
                });
            }
        };
        total_usage += response.usage.clone();

        let tool_calls = response.tool_calls();
        let wants_tools = response.finish_reason.reason == Reason::ToolCalls && !tool_calls.is_empty();
        let every_call_active = tool_calls.iter().all(|tc| {
            options
                .tools
                .iter()
                .any(|t| t.definition.name == tc.name && t.is_active())
        });

        if !(wants_tools && every_call_active && executed_rounds < options.max_tool_rounds) {
            let step = StepResult {
                response: response.clone(),
                tool_results: Vec::new(),
            };
            steps.push(step);
            return Ok(GenerateResult {
                text: response.text(),
                finish_reason: response.finish_reason.clone(),
                response,
                steps,
                usage: total_usage,
            });
        }

        // Execute all calls of the round concurrently, preserving input
        // order in the results.
        let executions = tool_calls.iter().map(|tc| {
            let tool = options
                .tools
                .iter()
                .find(|t| t.definition.name == tc.name)
                .and_then(|t| t.executor.clone());
            let args = tc.arguments.clone();
            let id = tc.id.clone();
            async move {
                let content = match tool {
                    Some(executor) => executor(args).await,
                    None => Err(LlmError::InvalidToolCall {
                        message: "no executor".into(),
                    }),
                };
                match content {
                    Ok(value) => ToolResult {
                        tool_call_id: id,
                        content: value,
                        is_error: false,
                    },
                    Err(err) => ToolResult {
                        tool_call_id: id,
                        content: Value::String(err.to_string()),
                        is_error: true,
                    },
                }
            }
        });
        let tool_results = futures::future::join_all(executions).await;

        messages.push(response.message.clone());
        for result in &tool_results {
            messages.push(Message::tool_result(
                result.tool_call_id.clone(),
                result.content.clone(),
                result.is_error,
            ));
        }

        let step = StepResult {
            response,
            tool_results,
        };
        let stop = options.stop_when.as_ref().is_some_and(|p| p(&step));
        if stop {
            let response = step.response.clone();
            steps.push(step);
            return Ok(GenerateResult {
                text: response.text(),
                finish_reason: response.finish_reason.clone(),
                response,
                steps,
                usage: total_usage,
            });
        }
        steps.push(step);
        executed_rounds += 1;
    }
}
