//! Codergen handler: the LLM bridge.
//!
//! A pluggable [`CodergenBackend`] performs the model call; without one
//! the handler runs in simulation mode, which keeps graph wiring testable
//! with no network.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::context::Context;
use crate::error::PipelineResult;
use crate::graph::{Graph, Node};
use crate::handler::Handler;
use crate::run_dir::RunDirectory;
use crate::types::Outcome;

/// What a backend produced for one stage.
pub enum CodergenOutput {
    /// Plain model text; the handler builds the outcome.
    Text(String),
    /// A complete outcome, used as-is.
    FullOutcome(Outcome),
}

/// The LLM behind codergen nodes.
#[async_trait]
pub trait CodergenBackend: Send + Sync {
    async fn run(
        &self,
        node: &Node,
        prompt: &str,
        context: &Context,
    ) -> PipelineResult<CodergenOutput>;
}

/// Handler for codergen (box) nodes.
pub struct CodergenHandler {
    backend: Option<Arc<dyn CodergenBackend>>,
}

impl CodergenHandler {
    /// Simulation mode: every stage answers with a placeholder.
    #[must_use]
    pub fn simulation() -> Self {
        Self { backend: None }
    }

    #[must_use]
    pub fn with_backend(backend: Arc<dyn CodergenBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }
}

impl std::fmt::Debug for CodergenHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodergenHandler")
            .field("simulation", &self.backend.is_none())
            .finish()
    }
}

/// Length cap for the `last_output` context value; the full text lives in
/// `last_output_full`.
const LAST_OUTPUT_LIMIT: usize = 200;

#[async_trait]
impl Handler for CodergenHandler {
    async fn handle(
        &self,
        node: &Node,
        context: &Context,
        _graph: &Graph,
        logs_root: &Path,
    ) -> PipelineResult<Outcome> {
        // The prompt attribute wins; the label is the fallback.
        let raw_prompt = node.get_str("prompt").unwrap_or_else(|| node.label());
        let prompt = expand_runtime_variables(raw_prompt, context);

        let run_dir = RunDirectory::open(logs_root);
        let stage_dir = run_dir.node_dir(&node.id);
        std::fs::create_dir_all(&stage_dir)?;
        std::fs::write(stage_dir.join("prompt.md"), &prompt)?;

        let output = match &self.backend {
            None => CodergenOutput::Text(format!("[Simulated] Response for stage: {}", node.id)),
            Some(backend) => match backend.run(node, &prompt, context).await {
                Ok(output) => output,
                Err(error) => {
                    let outcome = Outcome::fail(format!("backend error: {error}"));
                    run_dir.write_status(&node.id, &outcome)?;
                    return Ok(outcome);
                }
            },
        };

        let outcome = match output {
            CodergenOutput::FullOutcome(outcome) => outcome,
            CodergenOutput::Text(text) => {
                std::fs::write(stage_dir.join("response.md"), &text)?;
                text_outcome(&node.id, &text)
            }
        };
        run_dir.write_status(&node.id, &outcome)?;
        Ok(outcome)
    }
}

/// Success outcome for a text response, with the standard context
/// updates.
fn text_outcome(node_id: &str, text: &str) -> Outcome {
    let mut updates = IndexMap::new();
    updates.insert("last_stage".to_string(), Value::String(node_id.to_string()));
    updates.insert(
        "last_output".to_string(),
        Value::String(clip(text, LAST_OUTPUT_LIMIT)),
    );
    updates.insert(
        "last_output_full".to_string(),
        Value::String(text.to_string()),
    );

    Outcome {
        context_updates: updates,
        notes: format!("codergen completed for '{node_id}'"),
        ..Outcome::success()
    }
}

/// Clip to a char boundary at or under `limit` bytes, with ellipsis.
fn clip(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let mut end = limit;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Expand runtime variables from the context into a prompt.
///
/// Runs at execution time, not parse time, so each stage sees the outputs
/// of the stages before it.
fn expand_runtime_variables(prompt: &str, context: &Context) -> String {
    let mut result = prompt.to_string();
    if result.contains("$goal") {
        result = result.replace("$goal", &context.get_string("goal"));
    }
    if result.contains("$last_stage") {
        result = result.replace("$last_stage", &context.get_string("last_stage"));
    }
    if result.contains("$last_outcome") {
        result = result.replace("$last_outcome", &context.get_string("outcome"));
    }
    if result.contains("$last_output") {
        result = result.replace("$last_output", &context.get_string("last_output_full"));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variables_expand_from_context() {
        let context = Context::new();
        context.set("goal", json!("ship"));
        context.set("last_stage", json!("plan"));
        context.set("last_output_full", json!("the plan"));
        let expanded =
            expand_runtime_variables("Goal: $goal. After $last_stage: $last_output", &context);
        assert_eq!(expanded, "Goal: ship. After plan: the plan");
    }

    #[test]
    fn clip_respects_char_boundaries() {
        let clipped = clip("ééééé", 3);
        assert!(clipped.starts_with('é'));
        assert!(clipped.ends_with("..."));
    }
}
