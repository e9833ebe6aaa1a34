//! Checkpoint resume.

use std::path::Path;

use indexmap::IndexMap;

use crate::checkpoint::Checkpoint;
use crate::context::Context;
use crate::edge_selection::select_edge;
use crate::error::{PipelineError, PipelineResult};
use crate::graph::Graph;
use crate::types::{Outcome, StageStatus};

/// State restored from a checkpoint.
#[derive(Debug)]
pub struct RestoredRun {
    pub context: Context,
    pub completed_nodes: Vec<String>,
    pub node_retries: IndexMap<String, u32>,
    pub node_outcomes: IndexMap<String, Outcome>,
    /// The node to execute next, chosen by edge selection from the
    /// checkpointed node. `None` means the run was already complete.
    pub next_node_id: Option<String>,
}

/// Load a checkpoint and compute where execution continues.
///
/// The checkpoint's `current_node` must exist in the graph. The next node
/// comes from edge selection at `current_node` using its recorded outcome
/// (assumed SUCCESS when the checkpoint predates outcome recording); no
/// selectable edge means the run already finished.
pub fn restore(checkpoint_path: &Path, graph: &Graph) -> PipelineResult<RestoredRun> {
    let checkpoint = Checkpoint::load(checkpoint_path)?;

    if graph.get_node(&checkpoint.current_node).is_none() {
        return Err(PipelineError::NodeNotFound {
            node_id: checkpoint.current_node.clone(),
        });
    }

    let context = checkpoint.restore_context();
    for (node_id, count) in &checkpoint.node_retries {
        context.set(
            format!("internal.retry_count.{node_id}"),
            serde_json::Value::Number((*count).into()),
        );
    }

    // Rebuild outcome records from the persisted status strings so goal
    // gates are enforced accurately after resume.
    let mut node_outcomes = IndexMap::new();
    for node_id in &checkpoint.completed_nodes {
        let status = checkpoint
            .node_outcomes
            .get(node_id)
            .map_or("success", String::as_str);
        node_outcomes.insert(node_id.clone(), outcome_from_status(status));
    }

    let current_outcome = node_outcomes
        .get(&checkpoint.current_node)
        .cloned()
        .unwrap_or_else(Outcome::success);
    let next_node_id = select_edge(&checkpoint.current_node, &current_outcome, &context, graph)
        .map(|edge| edge.to.clone());

    Ok(RestoredRun {
        context,
        completed_nodes: checkpoint.completed_nodes,
        node_retries: checkpoint.node_retries,
        node_outcomes,
        next_node_id,
    })
}

/// Reconstruct an outcome carrying just the persisted status. Unknown
/// strings conservatively count as failures so gates cannot pass
/// vacuously on corrupted checkpoints.
fn outcome_from_status(status: &str) -> Outcome {
    match status {
        "success" => Outcome::success(),
        "partial_success" => Outcome::partial_success(),
        "retry" => Outcome::retry("restored from checkpoint"),
        "skipped" => Outcome::skipped(),
        "fail" => Outcome::fail("restored from checkpoint"),
        _ => Outcome {
            status: StageStatus::Fail,
            failure_reason: format!("unknown status in checkpoint: {status}"),
            ..Outcome::success()
        },
    }
}
