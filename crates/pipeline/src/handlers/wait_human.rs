//! Wait-human handler: block until a human picks an outgoing edge.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::context::Context;
use crate::error::PipelineResult;
use crate::events::{EventEmitter, NoOpEmitter, PipelineEvent};
use crate::graph::{AttrValue, Graph, Node};
use crate::handler::Handler;
use crate::interviewer::{Answer, Interviewer, Question, QuestionOption};
use crate::types::{Outcome, AttrDuration, StageStatus};

/// Presents the node's outgoing edges as choices and routes by the
/// answer via `suggested_next_ids`.
pub struct WaitHumanHandler {
    interviewer: Arc<dyn Interviewer>,
    emitter: Arc<dyn EventEmitter>,
}

impl std::fmt::Debug for WaitHumanHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitHumanHandler").finish_non_exhaustive()
    }
}

impl WaitHumanHandler {
    #[must_use]
    pub fn new(interviewer: Arc<dyn Interviewer>) -> Self {
        Self {
            interviewer,
            emitter: Arc::new(NoOpEmitter),
        }
    }

    #[must_use]
    pub fn with_emitter(interviewer: Arc<dyn Interviewer>, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            interviewer,
            emitter,
        }
    }
}

/// Parse an accelerator key from a choice label: `[K] …`, `K) …`,
/// `K - …`, else the first character, uppercased.
#[must_use]
pub fn parse_accelerator_key(label: &str) -> String {
    let trimmed = label.trim();

    if let Some(rest) = trimmed.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let key = &rest[..end];
            if !key.is_empty() {
                return key.to_uppercase();
            }
        }
    }

    let bytes = trimmed.as_bytes();
    if trimmed.len() >= 2 && bytes.get(1) == Some(&b')') {
        return trimmed[..1].to_uppercase();
    }
    if trimmed.len() >= 4 && bytes.get(1..4) == Some(b" - ".as_slice()) {
        return trimmed[..1].to_uppercase();
    }

    trimmed
        .chars()
        .next()
        .map(|c| c.to_uppercase().to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
struct Choice {
    key: String,
    label: String,
    target: String,
}

#[async_trait]
impl Handler for WaitHumanHandler {
    async fn handle(
        &self,
        node: &Node,
        _context: &Context,
        graph: &Graph,
        _logs_root: &Path,
    ) -> PipelineResult<Outcome> {
        let edges = graph.outgoing_edges(&node.id);
        let choices: Vec<Choice> = edges
            .iter()
            .map(|edge| {
                let label = if edge.label().is_empty() {
                    edge.to.clone()
                } else {
                    edge.label().to_string()
                };
                Choice {
                    key: parse_accelerator_key(&label),
                    label,
                    target: edge.to.clone(),
                }
            })
            .collect();

        if choices.is_empty() {
            return Ok(Outcome::fail("no outgoing edges for human gate"));
        }

        let question = Question {
            text: node.label().to_string(),
            options: choices
                .iter()
                .map(|c| QuestionOption {
                    key: c.key.clone(),
                    label: c.label.clone(),
                    target: c.target.clone(),
                })
                .collect(),
            stage: node.id.clone(),
            timeout_seconds: node
                .get_attr("timeout")
                .and_then(AttrValue::as_duration_attr)
                .map(|d| AttrDuration::as_duration(d).as_secs_f64()),
        };

        self.emitter.emit(PipelineEvent::InterviewQuestionAsked {
            node_id: node.id.clone(),
        });
        let answer = self.interviewer.ask(&question);

        match answer {
            Answer::Timeout => {
                self.emitter.emit(PipelineEvent::InterviewTimedOut {
                    node_id: node.id.clone(),
                });
                // A timed-out gate resolves to its default choice; a node
                // without a usable default asks the engine to retry.
                if let Some(default) = node.get_str("default_choice") {
                    if let Some(choice) = find_default_choice(default, &choices) {
                        return Ok(choice_outcome(choice));
                    }
                }
                Ok(Outcome::retry("human gate timed out with no default"))
            }
            Answer::Skipped => Ok(Outcome::fail("human skipped the gate")),
            Answer::Value(value) => {
                self.emitter.emit(PipelineEvent::InterviewAnswerReceived {
                    node_id: node.id.clone(),
                });
                let choice = match_answer(&value, &choices)
                    .or_else(|| choices.first())
                    .map(choice_outcome);
                match choice {
                    Some(outcome) => Ok(outcome),
                    None => Ok(Outcome::fail("no choices available")),
                }
            }
        }
    }
}

/// Build the success outcome for a selected choice.
fn choice_outcome(choice: &Choice) -> Outcome {
    let mut updates = IndexMap::new();
    updates.insert(
        "human.gate.selected".to_string(),
        serde_json::Value::String(choice.key.clone()),
    );
    updates.insert(
        "human.gate.label".to_string(),
        serde_json::Value::String(choice.label.clone()),
    );

    Outcome {
        status: StageStatus::Success,
        suggested_next_ids: vec![choice.target.clone()],
        context_updates: updates,
        ..Outcome::success()
    }
}

/// Answer precedence: exact value (key), then label text, then target id.
fn match_answer<'c>(value: &str, choices: &'c [Choice]) -> Option<&'c Choice> {
    choices
        .iter()
        .find(|c| c.key.eq_ignore_ascii_case(value))
        .or_else(|| choices.iter().find(|c| c.label.eq_ignore_ascii_case(value)))
        .or_else(|| choices.iter().find(|c| c.target == value))
}

/// Default-choice resolution: key first, then label.
fn find_default_choice<'c>(default: &str, choices: &'c [Choice]) -> Option<&'c Choice> {
    choices
        .iter()
        .find(|c| c.key.eq_ignore_ascii_case(default))
        .or_else(|| {
            choices
                .iter()
                .find(|c| c.label.eq_ignore_ascii_case(default))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accelerator_patterns() {
        assert_eq!(parse_accelerator_key("[Y] Yes"), "Y");
        assert_eq!(parse_accelerator_key("n) No"), "N");
        assert_eq!(parse_accelerator_key("r - Retry"), "R");
        assert_eq!(parse_accelerator_key("quit"), "Q");
        assert_eq!(parse_accelerator_key(""), "");
    }
}
