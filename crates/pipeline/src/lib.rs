//! # orrery-pipeline
//!
//! A DOT-graph pipeline engine for multi-stage agent workflows. A
//! [`Graph`] of typed nodes is interpreted over a shared dotted-key
//! [`Context`]: each visited node dispatches to a [`Handler`] under a
//! retry policy, the next edge is chosen by a deterministic 5-step
//! priority, state checkpoints after every recorded completion, and goal
//! gates decide whether the pipeline may terminate.
//!
//! ## Main modules
//!
//! - [`graph`]: the validated graph AST (the DOT parser is an external
//!   collaborator).
//! - [`engine`]: [`run`](engine::run), [`EngineConfig`], [`RunResult`].
//! - [`context`]: the dotted-key store with progressive-prefix lookup.
//! - [`edge_selection`] / [`condition`]: routing.
//! - [`retry`]: per-stage retry policies with backoff.
//! - [`checkpoint`] / [`resume`] / [`run_dir`]: persistence.
//! - [`handlers`]: start/exit/conditional pass-throughs, codergen,
//!   wait-human, tool, parallel, and fan-in.
//! - [`interviewer`]: the human-in-the-loop abstraction.
//! - [`events`]: synchronous run events.

pub mod checkpoint;
pub mod condition;
pub mod context;
pub mod edge_selection;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod handler;
pub mod handlers;
pub mod interviewer;
pub mod resume;
pub mod retry;
pub mod run_dir;
pub mod types;

pub use checkpoint::Checkpoint;
pub use condition::evaluate_condition;
pub use context::Context;
pub use edge_selection::{normalize_label, select_edge};
pub use engine::{EngineConfig, RunResult, retry_target_for, run};
pub use error::{PipelineError, PipelineResult};
pub use events::{CollectingEmitter, EventEmitter, NoOpEmitter, ObserverEmitter, PipelineEvent};
pub use graph::{AttrValue, Edge, Graph, Node, shape_handler_type};
pub use handler::{Handler, HandlerRegistry};
pub use interviewer::{
    Answer, AutoApproveInterviewer, Interviewer, Question, QuestionOption, QueueInterviewer,
};
pub use retry::{BackoffConfig, RetryPolicy, build_retry_policy, default_should_retry};
pub use run_dir::{Manifest, RunDirectory};
pub use types::{Outcome, AttrDuration, StageStatus};
