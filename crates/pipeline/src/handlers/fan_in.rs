//! Fan-in handler: consolidate parallel branch results and pick a winner.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::Context;
use crate::error::PipelineResult;
use crate::graph::{Graph, Node};
use crate::handler::Handler;
use crate::types::{Outcome, StageStatus};

/// Reads `parallel.results` and selects the best branch by status rank,
/// then score, then lexical branch id.
#[derive(Debug, Clone, Copy, Default)]
pub struct FanInHandler;

/// Rank a branch status; lower is better. Unknown strings rank with FAIL.
fn status_rank(status: &str) -> u32 {
    match status {
        "success" => 0,
        "partial_success" => 1,
        _ => 3,
    }
}

#[async_trait]
impl Handler for FanInHandler {
    async fn handle(
        &self,
        _node: &Node,
        context: &Context,
        _graph: &Graph,
        _logs_root: &Path,
    ) -> PipelineResult<Outcome> {
        // Results may be stored structured or as a JSON-encoded string;
        // a string that fails to parse is a failure, not a silent skip.
        let results = match context.get("parallel.results") {
            Some(Value::String(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    return Ok(Outcome::fail(format!("malformed parallel results: {err}")));
                }
            },
            other => other,
        };
        let Some(candidates) = results.as_ref().and_then(Value::as_array) else {
            return Ok(Outcome::fail("no parallel results to evaluate"));
        };
        if candidates.is_empty() {
            return Ok(Outcome::fail("no parallel results to evaluate"));
        }

        let all_failed = candidates.iter().all(|c| {
            status_rank(c.get("outcome").and_then(Value::as_str).unwrap_or("fail")) >= 3
        });
        if all_failed {
            return Ok(Outcome::fail("all parallel branches failed"));
        }

        // Rank, then higher score, then lexically smaller branch id.
        let best = candidates.iter().min_by(|a, b| {
            let rank_a = status_rank(a.get("outcome").and_then(Value::as_str).unwrap_or("fail"));
            let rank_b = status_rank(b.get("outcome").and_then(Value::as_str).unwrap_or("fail"));
            let score_a = a.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            let score_b = b.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            let id_a = a.get("branch").and_then(Value::as_str).unwrap_or("");
            let id_b = b.get("branch").and_then(Value::as_str).unwrap_or("");

            rank_a
                .cmp(&rank_b)
                .then_with(|| score_b.total_cmp(&score_a))
                .then_with(|| id_a.cmp(id_b))
        });

        let Some(best) = best else {
            return Ok(Outcome::fail("no parallel results to evaluate"));
        };
        let best_id = best.get("branch").and_then(Value::as_str).unwrap_or("unknown");
        let best_status = best.get("outcome").and_then(Value::as_str).unwrap_or("fail");

        let mut outcome = Outcome::success()
            .with_note(format!("selected best branch: {best_id}"))
            .with_update(
                "parallel.fan_in.best_id",
                Value::String(best_id.to_string()),
            );
        if best_status != "success" {
            outcome.status = StageStatus::PartialSuccess;
        }
        Ok(outcome)
    }
}
