//! Core session domain types: configuration, lifecycle state, turns, and
//! session events.

use std::collections::HashMap;

use orrery_models::{ToolCall, ToolResult, Usage};
use serde::{Deserialize, Serialize};

/// Current UTC time as an RFC 3339 string.
#[must_use]
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Reasoning effort requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    None,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Configuration for an agent session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum user+assistant turns across the session (0 = unlimited).
    #[serde(default)]
    pub max_turns: u32,

    /// Maximum tool rounds for a single submitted input.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds_per_input: u32,

    /// Command timeout applied when a tool passes none.
    #[serde(default = "default_command_timeout_ms")]
    pub default_command_timeout_ms: u64,

    /// Hard cap on any command timeout.
    #[serde(default = "default_max_command_timeout_ms")]
    pub max_command_timeout_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Per-tool character limit overrides for output truncation.
    #[serde(default)]
    pub tool_output_limits: HashMap<String, usize>,

    /// Per-tool line limit overrides for output truncation.
    #[serde(default)]
    pub tool_line_limits: HashMap<String, usize>,

    #[serde(default = "default_true")]
    pub enable_loop_detection: bool,

    /// Window of recent tool-call signatures checked for repetition.
    #[serde(default = "default_loop_detection_window")]
    pub loop_detection_window: u32,

    /// Maximum subagent nesting (0 disables spawning).
    #[serde(default = "default_max_subagent_depth")]
    pub max_subagent_depth: u32,
}

fn default_max_tool_rounds() -> u32 {
    50
}
fn default_command_timeout_ms() -> u64 {
    10_000
}
fn default_max_command_timeout_ms() -> u64 {
    600_000
}
fn default_true() -> bool {
    true
}
fn default_loop_detection_window() -> u32 {
    6
}
fn default_max_subagent_depth() -> u32 {
    1
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 0,
            max_tool_rounds_per_input: default_max_tool_rounds(),
            default_command_timeout_ms: default_command_timeout_ms(),
            max_command_timeout_ms: default_max_command_timeout_ms(),
            reasoning_effort: None,
            tool_output_limits: HashMap::new(),
            tool_line_limits: HashMap::new(),
            enable_loop_detection: true,
            loop_detection_window: default_loop_detection_window(),
            max_subagent_depth: default_max_subagent_depth(),
        }
    }
}

impl SessionConfig {
    /// Derive a subagent session config: behavioral settings are
    /// inherited, per-child limits are overridden, session-specific
    /// settings reset.
    #[must_use]
    pub fn for_child(&self, max_turns: u32, max_subagent_depth: u32) -> Self {
        Self {
            max_turns,
            max_subagent_depth,
            max_tool_rounds_per_input: self.max_tool_rounds_per_input,
            default_command_timeout_ms: self.default_command_timeout_ms,
            max_command_timeout_ms: self.max_command_timeout_ms,
            tool_output_limits: self.tool_output_limits.clone(),
            tool_line_limits: self.tool_line_limits.clone(),
            enable_loop_detection: self.enable_loop_detection,
            loop_detection_window: self.loop_detection_window,
            reasoning_effort: None,
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Waiting for input.
    #[default]
    Idle,
    /// A submit is in flight.
    Processing,
    /// Terminated; rejects further submits.
    Closed,
}

/// One entry in the append-only conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    /// User-submitted input.
    User { content: String, timestamp: String },

    /// A model response.
    Assistant {
        content: String,
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
        #[serde(default)]
        usage: Usage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        timestamp: String,
    },

    /// Results of one tool round, in call order.
    ToolResults {
        results: Vec<ToolResult>,
        timestamp: String,
    },

    /// An out-of-band instruction injected between rounds. Presented to
    /// the model as user-role input.
    Steering { content: String, timestamp: String },

    /// A system message added mid-conversation.
    System { content: String, timestamp: String },
}

impl Turn {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
            timestamp: now_timestamp(),
        }
    }

    #[must_use]
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self::ToolResults {
            results,
            timestamp: now_timestamp(),
        }
    }

    #[must_use]
    pub fn steering(content: impl Into<String>) -> Self {
        Self::Steering {
            content: content.into(),
            timestamp: now_timestamp(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
            timestamp: now_timestamp(),
        }
    }

    /// Whether this turn counts toward the `max_turns` limit.
    #[must_use]
    pub fn counts_toward_turn_limit(&self) -> bool {
        matches!(self, Self::User { .. } | Self::Assistant { .. })
    }
}

/// Result of a shell command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u64,
}

/// One entry in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Name relative to the listed directory; nested entries are
    /// `parent/child`-prefixed.
    pub name: String,
    pub is_dir: bool,
    /// Size in bytes; `None` for directories and failed stats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Options for the grep operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepOptions {
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default = "default_max_grep_results")]
    pub max_results: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob_filter: Option<String>,
}

fn default_max_grep_results() -> u32 {
    100
}

impl Default for GrepOptions {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            max_results: default_max_grep_results(),
            glob_filter: None,
        }
    }
}

/// Kinds of events a session emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    SessionStart,
    SessionEnd,
    UserInput,
    SteeringInjected,
    LlmCallStart,
    LlmCallEnd,
    AssistantTextEnd,
    ToolCallStart,
    ToolCallEnd,
    TurnComplete,
    TurnLimit,
    LoopDetection,
    Warning,
    Error,
    SubagentSpawn,
    SubagentComplete,
}

/// A typed session event with a payload map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: EventKind,
    pub timestamp: String,
    pub session_id: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}
