//! # orrery-agent
//!
//! The agentic session loop: a [`Session`] drives a conversation through
//! alternating model calls and tool executions, with steering, loop
//! detection, subagent supervision, output truncation, and cancellation.
//! Built on [`orrery_models`] for LLM communication.
//!
//! ## Main modules
//!
//! - [`session`]: the [`Session`] loop, [`ModelClient`] abstraction, and
//!   shared [`SteeringQueue`].
//! - [`types`]: configuration, lifecycle state, [`Turn`] history entries,
//!   and session events.
//! - [`events`]: emitter/receiver pair for typed session events.
//! - [`registry`]: tool name → (definition, executor) with schema-lite
//!   argument validation.
//! - [`execution`]: the [`ExecutionEnvironment`] contract and the local
//!   implementation.
//! - [`subagents`]: depth-limited child-session supervision and its four
//!   tools.
//! - [`truncation`], [`loop_detector`], [`project_docs`], [`prompts`]:
//!   output limits, repetition detection, instruction-file discovery, and
//!   system-prompt assembly.

pub mod error;
pub mod events;
pub mod execution;
pub mod loop_detector;
pub mod profile;
pub mod project_docs;
pub mod prompts;
pub mod registry;
pub mod session;
pub mod subagents;
pub mod truncation;
pub mod types;

pub use error::{AgentError, AgentResult};
pub use events::{EventEmitter, EventReceiver, channel, channel_with_id};
pub use execution::{EnvPolicy, ExecutionEnvironment, LocalEnvironment, filter_env_vars};
pub use profile::{BaseProfile, ProviderProfile};
pub use registry::{DispatchResult, RegisteredTool, ToolRegistry, ValidationOutcome, tool_fn};
pub use session::{ClientAdapter, ModelClient, Session, SteeringQueue};
pub use subagents::{SubagentManager, SubagentResult, SubagentStatus};
pub use truncation::{TruncationConfig, TruncationMode, truncate_tool_output};
pub use types::{
    DirEntry, EventKind, ExecResult, GrepOptions, ReasoningEffort, SessionConfig, SessionEvent,
    SessionState, Turn,
};
