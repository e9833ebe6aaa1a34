//! Parallel handler: fan execution out across the node's outgoing branch
//! edges.
//!
//! Each branch runs through a [`BranchExecutor`] on its own deep clone of
//! the context, so branches never see each other's writes; only the
//! combined `parallel.results` payload lands back in the shared context.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Semaphore;

use crate::context::Context;
use crate::error::PipelineResult;
use crate::events::{EventEmitter, PipelineEvent};
use crate::graph::{AttrValue, Edge, Graph, Node};
use crate::handler::Handler;
use crate::types::{Outcome, StageStatus};

/// Default in-flight branch cap when the node sets no `max_parallel`.
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// What one branch produced.
#[derive(Debug, Clone)]
pub struct BranchOutcome {
    /// Target node id of the branch edge.
    pub branch: String,
    pub outcome: Outcome,
    /// Optional quality score, consumed by fan-in ranking.
    pub score: Option<f64>,
}

/// Executes one branch: receives the branch's entry node and an isolated
/// context clone.
#[async_trait]
pub trait BranchExecutor: Send + Sync {
    async fn run(&self, branch_node: &Node, context: &Context, graph: &Graph) -> BranchOutcome;
}

/// Join policy over branch outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinPolicy {
    /// SUCCESS iff every branch succeeded; PARTIAL_SUCCESS when any
    /// failed.
    WaitAll,
    /// SUCCESS as soon as any branch succeeded, else FAIL.
    FirstSuccess,
    /// SUCCESS if any branch succeeded, else FAIL.
    Any,
}

impl JoinPolicy {
    fn parse(s: Option<&str>) -> Self {
        match s {
            Some("wait_all") => Self::WaitAll,
            Some("first_success") => Self::FirstSuccess,
            _ => Self::Any,
        }
    }
}

/// Handler for parallel (component) nodes.
pub struct ParallelHandler {
    executor: Option<Arc<dyn BranchExecutor>>,
    emitter: Arc<dyn EventEmitter>,
}

impl std::fmt::Debug for ParallelHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelHandler")
            .field("simulation", &self.executor.is_none())
            .finish_non_exhaustive()
    }
}

impl ParallelHandler {
    /// Simulation mode: every branch succeeds with a note.
    #[must_use]
    pub fn simulation(emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            executor: None,
            emitter,
        }
    }

    #[must_use]
    pub fn new(executor: Arc<dyn BranchExecutor>, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            executor: Some(executor),
            emitter,
        }
    }
}

#[async_trait]
impl Handler for ParallelHandler {
    async fn handle(
        &self,
        node: &Node,
        context: &Context,
        graph: &Graph,
        _logs_root: &Path,
    ) -> PipelineResult<Outcome> {
        let branches = graph.outgoing_edges(&node.id);
        if branches.is_empty() {
            return Ok(Outcome::fail("parallel node has no outgoing edges"));
        }

        let join = JoinPolicy::parse(node.get_str("join_policy"));
        let fail_fast = node.get_str("error_policy") == Some("fail_fast");
        let max_parallel = node
            .get_attr("max_parallel")
            .and_then(AttrValue::as_i64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_PARALLEL)
            .max(1);

        self.emitter.emit(PipelineEvent::ParallelStarted {
            node_id: node.id.clone(),
        });

        let results = self
            .run_branches(node, &branches, context, graph, max_parallel, fail_fast)
            .await;

        self.emitter.emit(PipelineEvent::ParallelCompleted {
            node_id: node.id.clone(),
        });

        // Publish the combined results for the fan-in stage.
        let results_json: Vec<Value> = results
            .iter()
            .map(|br| {
                let mut entry = json!({
                    "branch": br.branch,
                    "outcome": br.outcome.status.as_str(),
                });
                if !br.outcome.notes.is_empty() {
                    entry["notes"] = Value::String(br.outcome.notes.clone());
                }
                if let Some(score) = br.score {
                    if let Some(number) = serde_json::Number::from_f64(score) {
                        entry["score"] = Value::Number(number);
                    }
                }
                entry
            })
            .collect();
        context.set("parallel.results", Value::Array(results_json));

        let mut outcome = join_outcome(&results, join);

        // Route straight to the fan-in node: selecting an edge from here
        // would re-enter an already-executed branch.
        outcome.jump_to = find_fan_in(graph, &branches);

        Ok(outcome)
    }
}

impl ParallelHandler {
    /// Run branches in batches of `max_parallel`. With `fail_fast`, a FAIL
    /// in the current batch stops scheduling further batches; the current
    /// batch always drains.
    async fn run_branches(
        &self,
        node: &Node,
        branches: &[&Edge],
        context: &Context,
        graph: &Graph,
        max_parallel: usize,
        fail_fast: bool,
    ) -> Vec<BranchOutcome> {
        let semaphore = Arc::new(Semaphore::new(max_parallel));
        let mut results = Vec::with_capacity(branches.len());

        for batch in branches.chunks(max_parallel) {
            let futures: Vec<_> = batch
                .iter()
                .enumerate()
                .map(|(index, edge)| {
                    let branch_context = context.deep_clone();
                    let semaphore = Arc::clone(&semaphore);
                    let emitter = Arc::clone(&self.emitter);
                    let executor = self.executor.clone();
                    let parent_id = node.id.clone();
                    let target = edge.to.clone();

                    async move {
                        let _permit = semaphore.acquire().await;
                        emitter.emit(PipelineEvent::ParallelBranchStarted {
                            node_id: parent_id.clone(),
                            branch_index: index,
                        });

                        let branch_outcome = run_branch(
                            executor.as_deref(),
                            &target,
                            &branch_context,
                            graph,
                        )
                        .await;

                        if branch_outcome.outcome.status == StageStatus::Fail {
                            emitter.emit(PipelineEvent::ParallelBranchFailed {
                                node_id: parent_id,
                                branch_index: index,
                                reason: branch_outcome.outcome.failure_reason.clone(),
                            });
                        } else {
                            emitter.emit(PipelineEvent::ParallelBranchCompleted {
                                node_id: parent_id,
                                branch_index: index,
                            });
                        }
                        branch_outcome
                    }
                })
                .collect();

            let batch_results = futures::future::join_all(futures).await;
            let batch_failed = batch_results
                .iter()
                .any(|br| br.outcome.status == StageStatus::Fail);
            results.extend(batch_results);

            if fail_fast && batch_failed {
                break;
            }
        }
        results
    }
}

/// Run one branch through the executor, or simulate without one.
async fn run_branch(
    executor: Option<&dyn BranchExecutor>,
    target: &str,
    context: &Context,
    graph: &Graph,
) -> BranchOutcome {
    let Some(node) = graph.get_node(target) else {
        return BranchOutcome {
            branch: target.to_string(),
            outcome: Outcome::fail(format!("branch target '{target}' not in graph")),
            score: None,
        };
    };

    match executor {
        Some(executor) => executor.run(node, context, graph).await,
        None => BranchOutcome {
            branch: target.to_string(),
            outcome: Outcome::success().with_note(format!("Simulated branch '{target}'")),
            score: None,
        },
    }
}

/// Combine branch outcomes per the join policy.
fn join_outcome(results: &[BranchOutcome], join: JoinPolicy) -> Outcome {
    let succeeded = results
        .iter()
        .filter(|br| br.outcome.status.is_success())
        .count();
    let failed = results.len() - succeeded;

    match join {
        JoinPolicy::WaitAll => {
            if failed == 0 {
                Outcome::success()
            } else {
                Outcome::partial_success()
                    .with_note(format!("{succeeded} branches succeeded, {failed} failed"))
            }
        }
        JoinPolicy::FirstSuccess | JoinPolicy::Any => {
            if succeeded > 0 {
                Outcome::success()
            } else {
                Outcome::fail("no branch succeeded")
            }
        }
    }
}

/// Find the fan-in node downstream of the branches: the first node with
/// handler type `fan_in` reachable from any branch target.
fn find_fan_in(graph: &Graph, branches: &[&Edge]) -> Option<String> {
    use std::collections::{HashSet, VecDeque};

    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = branches.iter().map(|e| e.to.clone()).collect();

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        if let Some(node) = graph.get_node(&current) {
            if node.handler_type() == "fan_in" {
                return Some(current);
            }
        }
        for edge in graph.outgoing_edges(&current) {
            if !visited.contains(&edge.to) {
                queue.push_back(edge.to.clone());
            }
        }
    }
    None
}
