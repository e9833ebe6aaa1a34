//! The pipeline execution engine.
//!
//! Interprets a [`Graph`] over a shared [`Context`]: dispatch each node to
//! its handler under the retry policy, select the outgoing edge with the
//! 5-step priority, checkpoint after every recorded completion, and
//! enforce goal gates at the terminal node.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::checkpoint::Checkpoint;
use crate::context::Context;
use crate::edge_selection::select_edge;
use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventEmitter, NoOpEmitter, PipelineEvent};
use crate::graph::{Graph, Node};
use crate::handler::HandlerRegistry;
use crate::resume;
use crate::retry::{build_retry_policy, execute_with_retry};
use crate::run_dir::{Manifest, RunDirectory};
use crate::types::{Outcome, StageStatus};

/// Configuration for one pipeline run.
pub struct EngineConfig {
    /// The run directory: manifest, checkpoint, and per-node stage dirs
    /// live directly underneath.
    pub logs_root: PathBuf,
    pub registry: HandlerRegistry,
    pub emitter: Arc<dyn EventEmitter>,
    /// Restore from `<logs_root>/checkpoint.json` when present.
    pub resume_from_checkpoint: bool,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("logs_root", &self.logs_root)
            .field("registry", &self.registry)
            .field("resume_from_checkpoint", &self.resume_from_checkpoint)
            .finish_non_exhaustive()
    }
}

impl EngineConfig {
    /// Default configuration: built-in handlers, no event subscriber.
    ///
    /// `parallel` and `wait.human` need runtime dependencies and are
    /// registered by the caller; see
    /// [`HandlerRegistry::with_defaults`].
    #[must_use]
    pub fn new(logs_root: impl Into<PathBuf>) -> Self {
        Self {
            logs_root: logs_root.into(),
            registry: HandlerRegistry::with_defaults(),
            emitter: Arc::new(NoOpEmitter),
            resume_from_checkpoint: false,
        }
    }
}

/// The outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// FAIL when the last recorded outcome failed, else SUCCESS.
    pub status: StageStatus,
    pub completed_nodes: Vec<String>,
    pub node_outcomes: IndexMap<String, Outcome>,
    /// Snapshot of the context at finalization.
    pub final_context: IndexMap<String, Value>,
    pub logs_root: PathBuf,
}

/// Mutable traversal state.
struct LoopState {
    current_node_id: String,
    completed_nodes: Vec<String>,
    node_outcomes: IndexMap<String, Outcome>,
    node_retries: IndexMap<String, u32>,
    stage_index: usize,
    last_outcome: Outcome,
}

impl LoopState {
    fn starting_at(node_id: impl Into<String>) -> Self {
        Self {
            current_node_id: node_id.into(),
            completed_nodes: Vec::new(),
            node_outcomes: IndexMap::new(),
            node_retries: IndexMap::new(),
            stage_index: 0,
            last_outcome: Outcome::success(),
        }
    }
}

/// Run a pipeline graph to completion.
pub async fn run(graph: &Graph, config: EngineConfig) -> PipelineResult<RunResult> {
    // Resume path: restore state and route from the checkpointed node.
    if config.resume_from_checkpoint {
        let checkpoint_path = config.logs_root.join("checkpoint.json");
        if checkpoint_path.exists() {
            return run_resumed(graph, config, &checkpoint_path).await;
        }
        // No checkpoint: fall through to a fresh run.
    }

    let start = graph.find_start_node()?;
    let run_dir = init_run_dir(graph, &config.logs_root)?;
    let context = init_context(graph);

    config.emitter.emit(PipelineEvent::PipelineStarted {
        pipeline_name: graph.name.clone(),
    });

    let state = LoopState::starting_at(start.id.clone());
    execute_loop(graph, &config, run_dir, context, state).await
}

async fn run_resumed(
    graph: &Graph,
    config: EngineConfig,
    checkpoint_path: &Path,
) -> PipelineResult<RunResult> {
    let restored = resume::restore(checkpoint_path, graph)?;

    config.emitter.emit(PipelineEvent::PipelineStarted {
        pipeline_name: graph.name.clone(),
    });

    let Some(next_node_id) = restored.next_node_id else {
        // Edge selection from the checkpointed node found nothing more to
        // run: the pipeline was already complete.
        let final_context = restored.context.snapshot();
        config.emitter.emit(PipelineEvent::PipelineCompleted {
            pipeline_name: graph.name.clone(),
            outcome: Outcome::success(),
        });
        return Ok(RunResult {
            status: StageStatus::Success,
            completed_nodes: restored.completed_nodes,
            node_outcomes: restored.node_outcomes,
            final_context,
            logs_root: config.logs_root.clone(),
        });
    };

    let run_dir = RunDirectory::open(&config.logs_root);
    let state = LoopState {
        current_node_id: next_node_id,
        stage_index: restored.completed_nodes.len(),
        completed_nodes: restored.completed_nodes,
        node_outcomes: restored.node_outcomes,
        node_retries: restored.node_retries,
        last_outcome: Outcome::success(),
    };
    execute_loop(graph, &config, run_dir, restored.context, state).await
}

/// Create the run directory and write its manifest.
fn init_run_dir(graph: &Graph, logs_root: &Path) -> PipelineResult<RunDirectory> {
    let run_dir = RunDirectory::create(logs_root)?;
    run_dir.write_manifest(&Manifest::for_graph(graph))?;
    Ok(run_dir)
}

/// A fresh context seeded from graph attributes.
fn init_context(graph: &Graph) -> Context {
    let context = Context::new();
    if let Some(goal) = graph.get_attr("goal") {
        context.set("goal", Value::String(goal.to_string_value()));
    }
    for (key, value) in &graph.attrs {
        context.set(format!("graph.{key}"), Value::String(value.to_string_value()));
    }
    context
}

/// A unique directory for a loop restart:
/// `<logs_root>_restart_<epoch_ms>`, with a numeric suffix when two
/// restarts land in the same millisecond.
fn restart_logs_root(base: &Path) -> PathBuf {
    let epoch_ms = chrono::Utc::now().timestamp_millis();
    let candidate = PathBuf::from(format!("{}_restart_{epoch_ms}", base.display()));
    if !candidate.exists() {
        return candidate;
    }
    let mut counter = 2;
    loop {
        let suffixed = PathBuf::from(format!("{}_restart_{epoch_ms}_{counter}", base.display()));
        if !suffixed.exists() {
            return suffixed;
        }
        counter += 1;
    }
}

#[allow(clippy::too_many_lines)]
async fn execute_loop(
    graph: &Graph,
    config: &EngineConfig,
    mut run_dir: RunDirectory,
    mut context: Context,
    mut state: LoopState,
) -> PipelineResult<RunResult> {
    loop {
        let node = graph
            .get_node(&state.current_node_id)
            .ok_or_else(|| PipelineError::NodeNotFound {
                node_id: state.current_node_id.clone(),
            })?;

        context.set("current_node", Value::String(node.id.clone()));

        // Terminal: enforce goal gates, then finalize without running a
        // handler.
        if node.is_terminal() {
            if let Some(failed_gate) = failing_goal_gate(graph, &state.node_outcomes) {
                match gate_retry_target(graph, &failed_gate) {
                    Some(target) => {
                        state.current_node_id = target;
                        continue;
                    }
                    None => {
                        config.emitter.emit(PipelineEvent::PipelineFailed {
                            pipeline_name: graph.name.clone(),
                            reason: format!("goal gate unsatisfied: {failed_gate}"),
                        });
                        return Err(PipelineError::GoalGateUnsatisfied {
                            node_id: failed_gate,
                        });
                    }
                }
            }
            break;
        }

        config.emitter.emit(PipelineEvent::StageStarted {
            node_id: node.id.clone(),
            stage_index: state.stage_index,
        });

        let mut outcome = execute_node(node, graph, config, &run_dir, &context, state.stage_index)
            .await?;

        // auto_status: a node that manages its own status file gets a
        // synthesized SUCCESS when the file is absent.
        if node.get_bool("auto_status") && !run_dir.status_path(&node.id).exists() {
            outcome = Outcome::success().with_note("auto_status: synthesized");
        }

        // SKIPPED leaves no trace: no completion record, no checkpoint.
        if outcome.status == StageStatus::Skipped {
            config.emitter.emit(PipelineEvent::StageCompleted {
                node_id: node.id.clone(),
                stage_index: state.stage_index,
                outcome: outcome.clone(),
            });
            match select_edge(&node.id, &outcome, &context, graph) {
                None => break,
                Some(edge) => {
                    config.emitter.emit(PipelineEvent::EdgeSelected {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                    });
                    state.current_node_id = edge.to.clone();
                    state.stage_index += 1;
                    continue;
                }
            }
        }

        state.completed_nodes.push(node.id.clone());
        state.node_outcomes.insert(node.id.clone(), outcome.clone());
        state.last_outcome = outcome.clone();

        if outcome.status == StageStatus::Fail {
            config.emitter.emit(PipelineEvent::StageFailed {
                node_id: node.id.clone(),
                stage_index: state.stage_index,
                reason: outcome.failure_reason.clone(),
            });
        } else {
            config.emitter.emit(PipelineEvent::StageCompleted {
                node_id: node.id.clone(),
                stage_index: state.stage_index,
                outcome: outcome.clone(),
            });
        }

        // Apply handler updates before edge selection so conditions see
        // them; `outcome` and `preferred_label` always overwrite stale
        // values from earlier stages.
        if !outcome.context_updates.is_empty() {
            context.apply_updates(&outcome.context_updates);
        }
        context.set("outcome", Value::String(outcome.status.as_str().to_string()));
        context.set(
            "preferred_label",
            Value::String(outcome.preferred_label.clone()),
        );

        save_checkpoint(&run_dir, &context, node, &mut state)?;
        config.emitter.emit(PipelineEvent::CheckpointSaved {
            node_id: node.id.clone(),
        });

        // A handler-directed jump bypasses edge selection entirely (the
        // parallel handler routing to its fan-in node).
        if let Some(target) = &outcome.jump_to {
            if graph.get_node(target).is_none() {
                return Err(PipelineError::NodeNotFound {
                    node_id: target.clone(),
                });
            }
            state.current_node_id = target.clone();
            state.stage_index += 1;
            continue;
        }

        let Some(edge) = select_edge(&node.id, &outcome, &context, graph) else {
            if outcome.status == StageStatus::Fail {
                config.emitter.emit(PipelineEvent::PipelineFailed {
                    pipeline_name: graph.name.clone(),
                    reason: outcome.failure_reason.clone(),
                });
                return Err(PipelineError::StageFailedNoRoute {
                    node_id: node.id.clone(),
                });
            }
            break;
        };

        config.emitter.emit(PipelineEvent::EdgeSelected {
            from: edge.from.clone(),
            to: edge.to.clone(),
        });

        if edge.is_loop_restart() {
            // Restart discards the accumulated run: fresh context, fresh
            // state, fresh logs directory; only the graph survives.
            let restart_root = restart_logs_root(&config.logs_root);
            run_dir = init_run_dir(graph, &restart_root)?;
            context = init_context(graph);
            state = LoopState::starting_at(edge.to.clone());
            continue;
        }

        if graph.get_node(&edge.to).is_none() {
            return Err(PipelineError::NodeNotFound {
                node_id: edge.to.clone(),
            });
        }
        state.current_node_id = edge.to.clone();
        state.stage_index += 1;
    }

    // Finalize.
    let status = if state.last_outcome.status == StageStatus::Fail {
        StageStatus::Fail
    } else {
        StageStatus::Success
    };
    if status == StageStatus::Fail {
        config.emitter.emit(PipelineEvent::PipelineFailed {
            pipeline_name: graph.name.clone(),
            reason: state.last_outcome.failure_reason.clone(),
        });
    } else {
        config.emitter.emit(PipelineEvent::PipelineCompleted {
            pipeline_name: graph.name.clone(),
            outcome: state.last_outcome.clone(),
        });
    }

    Ok(RunResult {
        status,
        completed_nodes: state.completed_nodes,
        node_outcomes: state.node_outcomes,
        final_context: context.snapshot(),
        logs_root: run_dir.root().to_path_buf(),
    })
}

/// Resolve and run a node's handler under its retry policy.
async fn execute_node(
    node: &Node,
    graph: &Graph,
    config: &EngineConfig,
    run_dir: &RunDirectory,
    context: &Context,
    stage_index: usize,
) -> PipelineResult<Outcome> {
    let handler = config
        .registry
        .resolve(node)
        .ok_or_else(|| PipelineError::HandlerFailed {
            node_id: node.id.clone(),
            reason: format!("no handler registered for type '{}'", node.handler_type()),
        })?;

    let policy = build_retry_policy(node, graph);
    Ok(execute_with_retry(
        &handler,
        node,
        context,
        graph,
        run_dir.root(),
        &policy,
        config.emitter.as_ref(),
        stage_index,
    )
    .await)
}

/// Persist the checkpoint for a just-recorded completion.
fn save_checkpoint(
    run_dir: &RunDirectory,
    context: &Context,
    node: &Node,
    state: &mut LoopState,
) -> PipelineResult<()> {
    // Sync the node's retry counter out of the context.
    if let Some(count) = context.get_i64(&format!("internal.retry_count.{}", node.id)) {
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        state.node_retries.insert(node.id.clone(), count as u32);
    }

    let statuses: IndexMap<String, String> = state
        .node_outcomes
        .iter()
        .map(|(id, outcome)| (id.clone(), outcome.status.as_str().to_string()))
        .collect();

    Checkpoint::capture(
        context,
        node.id.clone(),
        state.completed_nodes.clone(),
        state.node_retries.clone(),
        statuses,
    )
    .save(&run_dir.checkpoint_path())
}

/// The first visited goal-gate node whose final outcome is not a success,
/// in execution order.
fn failing_goal_gate(graph: &Graph, node_outcomes: &IndexMap<String, Outcome>) -> Option<String> {
    for (node_id, outcome) in node_outcomes {
        let Some(node) = graph.get_node(node_id) else {
            continue;
        };
        if node.get_bool("goal_gate") && !outcome.status.is_success() {
            return Some(node_id.clone());
        }
    }
    None
}

/// Retry target for a failed gate: node `retry_target`, node
/// `fallback_retry_target`, graph `retry_target`, graph
/// `fallback_retry_target`; first candidate that names a real node.
fn gate_retry_target(graph: &Graph, failed_node_id: &str) -> Option<String> {
    let node = graph.get_node(failed_node_id)?;
    retry_target_for(node, graph)
}

/// The 4-level retry target chain.
#[must_use]
pub fn retry_target_for(node: &Node, graph: &Graph) -> Option<String> {
    let candidates = [
        node.get_str("retry_target"),
        node.get_str("fallback_retry_target"),
        graph.get_str("retry_target"),
        graph.get_str("fallback_retry_target"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|target| graph.get_node(target).is_some())
        .map(String::from)
}
