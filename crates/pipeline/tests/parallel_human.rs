//! Parallel fan-out, fan-in consolidation, and the wait-human gate.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use orrery_pipeline::handlers::{BranchExecutor, BranchOutcome, ParallelHandler, WaitHumanHandler};
use orrery_pipeline::{
    Answer, Context, Edge, EngineConfig, Graph, Handler, Node, NoOpEmitter, Outcome,
    QueueInterviewer, StageStatus, run,
};
use serde_json::json;

fn parallel_graph() -> Graph {
    Graph::new("fanout")
        .node(Node::new("start").attr("shape", "Mdiamond"))
        .node(Node::new("split").attr("shape", "component"))
        .node(Node::new("b1"))
        .node(Node::new("b2"))
        .node(Node::new("merge").attr("shape", "tripleoctagon"))
        .node(Node::new("exit").attr("shape", "Msquare"))
        .edge(Edge::new("start", "split"))
        .edge(Edge::new("split", "b1"))
        .edge(Edge::new("split", "b2"))
        .edge(Edge::new("b1", "merge"))
        .edge(Edge::new("b2", "merge"))
        .edge(Edge::new("merge", "exit"))
}

#[tokio::test]
async fn simulated_parallel_run_reaches_fan_in() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = EngineConfig::new(dir.path().join("run"));
    config
        .registry
        .register("parallel", ParallelHandler::simulation(Arc::new(NoOpEmitter)));

    let result = run(&parallel_graph(), config).await.expect("run");

    assert_eq!(result.status, StageStatus::Success);
    // The engine jumped from the parallel node straight to the fan-in;
    // branch entries never execute as top-level stages.
    assert_eq!(result.completed_nodes, vec!["start", "split", "merge"]);
    // Lexically smallest branch wins among equal simulated successes.
    assert_eq!(
        result.final_context.get("parallel.fan_in.best_id"),
        Some(&json!("b1"))
    );
    let results = result
        .final_context
        .get("parallel.results")
        .and_then(serde_json::Value::as_array)
        .expect("results array");
    assert_eq!(results.len(), 2);
}

/// Branch executor with per-branch scripted outcomes and scores.
struct TableExecutor;

#[async_trait]
impl BranchExecutor for TableExecutor {
    async fn run(&self, branch_node: &Node, context: &Context, _graph: &Graph) -> BranchOutcome {
        // Branch isolation: writes land in the clone, never the parent.
        context.set("branch.touched", json!(branch_node.id.clone()));
        match branch_node.id.as_str() {
            "b1" => BranchOutcome {
                branch: "b1".into(),
                outcome: Outcome::success(),
                score: Some(0.3),
            },
            "b2" => BranchOutcome {
                branch: "b2".into(),
                outcome: Outcome::success(),
                score: Some(0.9),
            },
            other => BranchOutcome {
                branch: other.to_string(),
                outcome: Outcome::fail("unexpected branch"),
                score: None,
            },
        }
    }
}

#[tokio::test]
async fn fan_in_prefers_higher_scores() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = EngineConfig::new(dir.path().join("run"));
    config.registry.register(
        "parallel",
        ParallelHandler::new(Arc::new(TableExecutor), Arc::new(NoOpEmitter)),
    );

    let result = run(&parallel_graph(), config).await.expect("run");
    assert_eq!(
        result.final_context.get("parallel.fan_in.best_id"),
        Some(&json!("b2"))
    );
    // Branch-local writes never leak into the shared context.
    assert!(!result.final_context.contains_key("branch.touched"));
}

struct FailingBranches;

#[async_trait]
impl BranchExecutor for FailingBranches {
    async fn run(&self, branch_node: &Node, _context: &Context, _graph: &Graph) -> BranchOutcome {
        BranchOutcome {
            branch: branch_node.id.clone(),
            outcome: if branch_node.id == "b1" {
                Outcome::fail("branch one broke")
            } else {
                Outcome::success()
            },
            score: None,
        }
    }
}

#[tokio::test]
async fn wait_all_reports_partial_success_on_mixed_branches() {
    let handler = ParallelHandler::new(Arc::new(FailingBranches), Arc::new(NoOpEmitter));
    let graph = parallel_graph();
    let node = Node::new("split")
        .attr("shape", "component")
        .attr("join_policy", "wait_all");
    let dir = tempfile::tempdir().expect("tempdir");

    let outcome = handler
        .handle(&node, &Context::new(), &graph, dir.path())
        .await
        .expect("handle");
    assert_eq!(outcome.status, StageStatus::PartialSuccess);
}

struct AllFailBranches;

#[async_trait]
impl BranchExecutor for AllFailBranches {
    async fn run(&self, branch_node: &Node, _context: &Context, _graph: &Graph) -> BranchOutcome {
        BranchOutcome {
            branch: branch_node.id.clone(),
            outcome: Outcome::fail("no luck"),
            score: None,
        }
    }
}

#[tokio::test]
async fn any_join_fails_when_every_branch_fails() {
    let handler = ParallelHandler::new(Arc::new(AllFailBranches), Arc::new(NoOpEmitter));
    let graph = parallel_graph();
    let node = Node::new("split").attr("shape", "component");
    let dir = tempfile::tempdir().expect("tempdir");

    let context = Context::new();
    let outcome = handler
        .handle(&node, &context, &graph, dir.path())
        .await
        .expect("handle");
    assert_eq!(outcome.status, StageStatus::Fail);

    // And the downstream fan-in agrees.
    let fan_in = orrery_pipeline::handlers::FanInHandler;
    let fan_outcome = fan_in
        .handle(&Node::new("merge"), &context, &graph, dir.path())
        .await
        .expect("fan in");
    assert_eq!(fan_outcome.status, StageStatus::Fail);
}

#[tokio::test]
async fn fan_in_without_results_fails() {
    let fan_in = orrery_pipeline::handlers::FanInHandler;
    let dir = tempfile::tempdir().expect("tempdir");
    let outcome = fan_in
        .handle(
            &Node::new("merge"),
            &Context::new(),
            &Graph::new("g"),
            dir.path(),
        )
        .await
        .expect("handle");
    assert_eq!(outcome.status, StageStatus::Fail);
}

#[tokio::test]
async fn fan_in_rejects_malformed_results_string() {
    let fan_in = orrery_pipeline::handlers::FanInHandler;
    let dir = tempfile::tempdir().expect("tempdir");
    let context = Context::new();
    context.set("parallel.results", json!("{not json"));
    let outcome = fan_in
        .handle(&Node::new("merge"), &context, &Graph::new("g"), dir.path())
        .await
        .expect("handle");
    assert_eq!(outcome.status, StageStatus::Fail);
    assert!(outcome.failure_reason.contains("malformed"));
}

// ── Wait-human ───────────────────────────────────────────────────────

fn gate_graph() -> Graph {
    Graph::new("gated")
        .node(Node::new("gate").attr("shape", "hexagon").attr("label", "Proceed?"))
        .node(Node::new("ship"))
        .node(Node::new("fix"))
        .edge(Edge::new("gate", "ship").attr("label", "[S] Ship it"))
        .edge(Edge::new("gate", "fix").attr("label", "[F] Fix first"))
}

async fn gate_outcome(answers: Vec<Answer>, node: Node) -> Outcome {
    let handler = WaitHumanHandler::new(Arc::new(QueueInterviewer::new(answers)));
    let dir = tempfile::tempdir().expect("tempdir");
    handler
        .handle(&node, &Context::new(), &gate_graph(), dir.path())
        .await
        .expect("handle")
}

#[tokio::test]
async fn answer_matches_by_key_then_label_then_target() {
    let by_key = gate_outcome(vec![Answer::Value("s".into())], Node::new("gate")).await;
    assert_eq!(by_key.suggested_next_ids, vec!["ship".to_string()]);

    let by_label = gate_outcome(
        vec![Answer::Value("[F] Fix first".into())],
        Node::new("gate"),
    )
    .await;
    assert_eq!(by_label.suggested_next_ids, vec!["fix".to_string()]);

    let by_target = gate_outcome(vec![Answer::Value("fix".into())], Node::new("gate")).await;
    assert_eq!(by_target.suggested_next_ids, vec!["fix".to_string()]);

    // Anything unmatched falls back to the first choice.
    let fallback = gate_outcome(vec![Answer::Value("???".into())], Node::new("gate")).await;
    assert_eq!(fallback.suggested_next_ids, vec!["ship".to_string()]);
}

#[tokio::test]
async fn timeout_uses_default_choice_or_retries() {
    let with_default = gate_outcome(
        vec![Answer::Timeout],
        Node::new("gate").attr("default_choice", "F"),
    )
    .await;
    assert_eq!(with_default.suggested_next_ids, vec!["fix".to_string()]);

    let without_default = gate_outcome(vec![Answer::Timeout], Node::new("gate")).await;
    assert_eq!(without_default.status, StageStatus::Retry);
}

#[tokio::test]
async fn skipped_answer_fails_the_gate() {
    let outcome = gate_outcome(vec![Answer::Skipped], Node::new("gate")).await;
    assert_eq!(outcome.status, StageStatus::Fail);
}

#[tokio::test]
async fn human_gate_routes_the_engine_via_suggested_ids() {
    let graph = Graph::new("flow")
        .node(Node::new("start").attr("shape", "Mdiamond"))
        .node(Node::new("gate").attr("shape", "hexagon"))
        .node(Node::new("ship"))
        .node(Node::new("fix"))
        .node(Node::new("exit").attr("shape", "Msquare"))
        .edge(Edge::new("start", "gate"))
        .edge(Edge::new("gate", "ship").attr("label", "[S] Ship"))
        .edge(Edge::new("gate", "fix").attr("label", "[F] Fix"))
        .edge(Edge::new("ship", "exit"))
        .edge(Edge::new("fix", "exit"));

    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = EngineConfig::new(dir.path().join("run"));
    config.registry.register(
        "wait.human",
        WaitHumanHandler::new(Arc::new(QueueInterviewer::new(vec![Answer::Value(
            "F".into(),
        )]))),
    );

    let result = run(&graph, config).await.expect("run");
    assert!(result.completed_nodes.contains(&"fix".to_string()));
    assert!(!result.completed_nodes.contains(&"ship".to_string()));
}
