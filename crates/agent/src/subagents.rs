//! Subagent supervision.
//!
//! A subagent is a child [`Session`] running in a background task,
//! sharing the parent's execution environment and LLM client. The parent
//! model drives it through four tools (`spawn_agent`, `send_input`,
//! `wait`, `close_agent`) whose calls the session layer intercepts and
//! routes here. Depth limiting is inherited: each child manager gets the
//! parent's depth plus one, with no global counter.

use std::collections::HashMap;
use std::sync::Arc;

use orrery_models::{AbortController, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::oneshot;

use crate::error::{AgentError, AgentResult};
use crate::events::EventEmitter;
use crate::execution::ExecutionEnvironment;
use crate::profile::ProviderProfile;
use crate::registry::{RegisteredTool, ToolRegistry, intercepted_executor};
use crate::session::{ModelClient, Session, SteeringQueue};
use crate::types::{SessionConfig, SessionState, Turn};

pub const TOOL_SPAWN_AGENT: &str = "spawn_agent";
pub const TOOL_SEND_INPUT: &str = "send_input";
pub const TOOL_WAIT: &str = "wait";
pub const TOOL_CLOSE_AGENT: &str = "close_agent";

const SUBAGENT_TOOLS: &[&str] = &[TOOL_SPAWN_AGENT, TOOL_SEND_INPUT, TOOL_WAIT, TOOL_CLOSE_AGENT];

/// Default turn budget for a child when the model does not pass one.
const DEFAULT_CHILD_MAX_TURNS: u32 = 50;

/// Lifecycle state of a subagent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    Running,
    Completed,
    Failed,
}

impl SubagentStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// What a finished subagent produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubagentResult {
    /// Concatenation of the child's assistant-turn texts.
    pub output: String,
    pub success: bool,
    pub turns_used: u32,
}

/// A handle to one spawned subagent.
struct SubagentHandle {
    status: SubagentStatus,
    /// The child's shared steering queue; `send_input` pushes here while
    /// the child runs.
    steering: SteeringQueue,
    abort: AbortController,
    result_rx: Option<oneshot::Receiver<SubagentResult>>,
    cached_result: Option<SubagentResult>,
}

impl SubagentHandle {
    fn record(&mut self, result: SubagentResult) {
        self.status = if result.success {
            SubagentStatus::Completed
        } else {
            SubagentStatus::Failed
        };
        self.cached_result = Some(result);
    }
}

/// Owns every subagent spawned by one session.
pub struct SubagentManager {
    agents: HashMap<String, SubagentHandle>,
    execution_env: Arc<dyn ExecutionEnvironment>,
    client: Arc<dyn ModelClient>,
    events: EventEmitter,
    current_depth: u32,
    max_depth: u32,
    next_id: u32,
}

impl std::fmt::Debug for SubagentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubagentManager")
            .field("agents", &self.agents.len())
            .field("current_depth", &self.current_depth)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl SubagentManager {
    pub fn new(
        execution_env: Arc<dyn ExecutionEnvironment>,
        client: Arc<dyn ModelClient>,
        events: EventEmitter,
        current_depth: u32,
        max_depth: u32,
    ) -> Self {
        Self {
            agents: HashMap::new(),
            execution_env,
            client,
            events,
            current_depth,
            max_depth,
            next_id: 0,
        }
    }

    /// Whether a tool name belongs to the subagent surface and must be
    /// intercepted before regular dispatch.
    #[must_use]
    pub fn is_subagent_tool(name: &str) -> bool {
        SUBAGENT_TOOLS.contains(&name)
    }

    /// Route one intercepted tool call. Every tool answers with JSON.
    pub async fn execute(
        &mut self,
        tool_name: &str,
        args: Value,
        parent_profile: &dyn ProviderProfile,
        parent_config: &SessionConfig,
    ) -> AgentResult<String> {
        match tool_name {
            TOOL_SPAWN_AGENT => self.spawn(args, parent_profile, parent_config),
            TOOL_SEND_INPUT => self.send_input(&args),
            TOOL_WAIT => self.wait(&args).await,
            TOOL_CLOSE_AGENT => self.close_agent(&args),
            _ => Err(AgentError::UnknownTool {
                name: tool_name.to_string(),
            }),
        }
    }

    /// Spawn a child session and start its task in the background.
    /// Returns immediately with the running handle's id.
    fn spawn(
        &mut self,
        args: Value,
        parent_profile: &dyn ProviderProfile,
        parent_config: &SessionConfig,
    ) -> AgentResult<String> {
        if self.current_depth >= self.max_depth {
            return Err(AgentError::ValidationError {
                reason: format!(
                    "maximum subagent depth ({}) reached; cannot spawn deeper",
                    self.max_depth
                ),
            });
        }

        let task = require_str(&args, "task")?.to_string();
        let working_dir = args.get("working_dir").and_then(Value::as_str);
        let model_override = args.get("model").and_then(Value::as_str);
        let max_turns = args
            .get("max_turns")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_CHILD_MAX_TURNS, |v| {
                u32::try_from(v).unwrap_or(u32::MAX)
            });

        let child_profile = parent_profile.child_profile(model_override);
        let child_config = parent_config.for_child(max_turns, self.max_depth);

        let (mut session, _receiver) = Session::new_at_depth(
            child_profile,
            Arc::clone(&self.execution_env),
            Arc::clone(&self.client),
            child_config,
            self.current_depth + 1,
        );

        let abort = AbortController::new();
        session.set_abort_signal(abort.signal());
        let steering = session.steering_handle();

        let mut task_text = task;
        if let Some(dir) = working_dir {
            task_text.push_str(&format!("\n\nScope your work to the subdirectory: {dir}"));
        }

        self.next_id += 1;
        let agent_id = format!("agent-{}", self.next_id);
        self.events.emit_subagent_spawn(&agent_id);

        let (result_tx, result_rx) = oneshot::channel();
        let events = self.events.clone();
        let task_agent_id = agent_id.clone();
        tokio::spawn(async move {
            // submit() reports LLM failures by closing the session, so a
            // successful resolution with a short output is common; the
            // success flag comes from the final session state.
            let submit_result = session.submit(&task_text).await;
            let mut result = collect_result(&session);
            if let Err(err) = submit_result {
                result.success = false;
                if result.output.is_empty() {
                    result.output = err.to_string();
                }
            }
            events.emit_subagent_complete(&task_agent_id, result.success);
            let _ = result_tx.send(result);
        });

        self.agents.insert(
            agent_id.clone(),
            SubagentHandle {
                status: SubagentStatus::Running,
                steering,
                abort,
                result_rx: Some(result_rx),
                cached_result: None,
            },
        );

        Ok(json!({
            "agent_id": agent_id,
            "status": "running",
        })
        .to_string())
    }

    /// Inject a message into a running child's steering queue.
    fn send_input(&mut self, args: &Value) -> AgentResult<String> {
        let agent_id = require_str(args, "agent_id")?;
        let message = require_str(args, "message")?;

        let handle = self.handle_mut(agent_id)?;
        if handle.status != SubagentStatus::Running {
            return Err(AgentError::Subagent {
                message: format!(
                    "agent {agent_id} is {} and cannot accept input",
                    handle.status.as_str()
                ),
            });
        }
        handle.steering.push(message);

        Ok(json!({
            "agent_id": agent_id,
            "status": "running",
            "delivered": true,
        })
        .to_string())
    }

    /// Await the child's completion and return its accumulated result.
    async fn wait(&mut self, args: &Value) -> AgentResult<String> {
        let agent_id = require_str(args, "agent_id")?.to_string();
        let handle = self.handle_mut(&agent_id)?;

        if handle.cached_result.is_none() {
            let rx = handle.result_rx.take().ok_or_else(|| AgentError::Subagent {
                message: format!("agent {agent_id} result already consumed"),
            })?;
            let result = rx.await.map_err(|_| AgentError::Subagent {
                message: format!("agent {agent_id} task ended without a result"),
            })?;
            handle.record(result);
        }

        let status = handle.status;
        let result = handle
            .cached_result
            .as_ref()
            .ok_or_else(|| AgentError::Subagent {
                message: format!("agent {agent_id} has no result"),
            })?;

        Ok(json!({
            "agent_id": agent_id,
            "status": status.as_str(),
            "output": result.output,
            "success": result.success,
            "turns_used": result.turns_used,
        })
        .to_string())
    }

    /// Abort the child and acknowledge closure. The child terminates at
    /// its next poll point; the handle is marked completed immediately.
    fn close_agent(&mut self, args: &Value) -> AgentResult<String> {
        let agent_id = require_str(args, "agent_id")?;
        let handle = self.handle_mut(agent_id)?;

        handle.abort.abort();
        if handle.status == SubagentStatus::Running {
            handle.status = SubagentStatus::Completed;
        }

        Ok(json!({
            "agent_id": agent_id,
            "status": handle.status.as_str(),
            "closed": true,
        })
        .to_string())
    }

    /// Abort every child. Called on session close; never blocks.
    pub fn close_all(&mut self) {
        for handle in self.agents.values_mut() {
            handle.abort.abort();
            if handle.status == SubagentStatus::Running {
                handle.status = SubagentStatus::Completed;
            }
        }
    }

    fn handle_mut(&mut self, agent_id: &str) -> AgentResult<&mut SubagentHandle> {
        self.agents
            .get_mut(agent_id)
            .ok_or_else(|| AgentError::Subagent {
                message: format!("unknown agent_id: {agent_id}"),
            })
    }
}

/// Gather a finished (or aborted) child's result from its session.
fn collect_result(session: &Session) -> SubagentResult {
    let output: String = session
        .history()
        .iter()
        .filter_map(|turn| match turn {
            Turn::Assistant { content, .. } if !content.is_empty() => Some(content.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    SubagentResult {
        output,
        success: session.state() != SessionState::Closed,
        turns_used: session.counted_turns(),
    }
}

fn require_str<'a>(args: &'a Value, key: &str) -> AgentResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::ValidationError {
            reason: format!("missing required string parameter: {key}"),
        })
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

pub fn spawn_agent_definition() -> ToolDefinition {
    ToolDefinition {
        name: TOOL_SPAWN_AGENT.into(),
        description: "Spawn a subagent to handle a scoped task autonomously.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "Natural-language task for the subagent."
                },
                "working_dir": {
                    "type": "string",
                    "description": "Optional subdirectory to scope the agent to."
                },
                "model": {
                    "type": "string",
                    "description": "Optional model override (default: parent's model)."
                },
                "max_turns": {
                    "type": "integer",
                    "description": "Turn budget for the subagent (default: 50)."
                }
            },
            "required": ["task"]
        }),
        strict: false,
    }
}

pub fn send_input_definition() -> ToolDefinition {
    ToolDefinition {
        name: TOOL_SEND_INPUT.into(),
        description: "Send a steering message to a running subagent.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string", "description": "Subagent to steer."},
                "message": {"type": "string", "description": "Message to inject."}
            },
            "required": ["agent_id", "message"]
        }),
        strict: false,
    }
}

pub fn wait_definition() -> ToolDefinition {
    ToolDefinition {
        name: TOOL_WAIT.into(),
        description: "Wait for a subagent to complete and return its result.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string", "description": "Subagent to wait for."}
            },
            "required": ["agent_id"]
        }),
        strict: false,
    }
}

pub fn close_agent_definition() -> ToolDefinition {
    ToolDefinition {
        name: TOOL_CLOSE_AGENT.into(),
        description: "Terminate a subagent.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string", "description": "Subagent to terminate."}
            },
            "required": ["agent_id"]
        }),
        strict: false,
    }
}

/// Register the four subagent tools.
///
/// Executors are placeholders; the session intercepts these calls before
/// dispatch. Registration exists so the definitions reach the model.
pub fn register_subagent_tools(registry: &mut ToolRegistry) {
    for definition in [
        spawn_agent_definition(),
        send_input_definition(),
        wait_definition(),
        close_agent_definition(),
    ] {
        registry.register(RegisteredTool::new(definition, intercepted_executor()));
    }
}
