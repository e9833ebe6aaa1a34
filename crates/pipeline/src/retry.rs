//! Stage retry policy and execution.

use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::PipelineError;
use crate::events::{EventEmitter, PipelineEvent};
use crate::graph::{Graph, Node};
use crate::handler::Handler;
use crate::types::{Outcome, StageStatus};

/// Backoff parameters for stage retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 200,
            multiplier: 2.0,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}

/// Classifier deciding whether a handler error is worth retrying.
pub type ShouldRetryFn = Arc<dyn Fn(&PipelineError) -> bool + Send + Sync>;

/// A stage retry policy: attempt budget, backoff, and error classifier.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Attempts including the first (so `max_retries + 1`).
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
    pub should_retry: ShouldRetryFn,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffConfig::default(),
            should_retry: Arc::new(default_should_retry),
        }
    }
}

/// Message-based retry classification for handler errors.
///
/// Retry on rate limits, timeouts, network trouble, and 5xx server
/// errors; never on auth or validation problems; anything unrecognized
/// defaults to retry.
#[must_use]
pub fn default_should_retry(error: &PipelineError) -> bool {
    let message = error.to_string().to_lowercase();

    if message.contains("401")
        || message.contains("403")
        || message.contains("400")
        || message.contains("validation")
    {
        return false;
    }
    if message.contains("rate limit")
        || message.contains("429")
        || message.contains("timeout")
        || message.contains("timed out")
        || message.contains("network")
        || message.contains("econnrefused")
        || (message.contains('5') && message.contains("server error"))
    {
        return true;
    }
    true
}

/// Delay before retry `attempt` (1-based): `min(initial · mult^(n-1),
/// max)` with optional ±50% jitter. Zero stays zero; no sleep.
#[must_use]
pub fn delay_for_attempt(attempt: u32, backoff: &BackoffConfig) -> std::time::Duration {
    #[allow(clippy::cast_precision_loss)]
    let base = (backoff.initial_delay_ms as f64)
        * backoff.multiplier.powi(attempt.saturating_sub(1) as i32);
    #[allow(clippy::cast_precision_loss)]
    let capped = base.min(backoff.max_delay_ms as f64);
    let final_ms = if backoff.jitter && capped > 0.0 {
        capped * rand::rng().random_range(0.5..1.5)
    } else {
        capped
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    std::time::Duration::from_millis(final_ms.max(0.0) as u64)
}

/// Effective retry budget for a node: node `max_retries` when > 0, else
/// the graph's `default_max_retry` when > 0, else no retries.
#[must_use]
pub fn build_retry_policy(node: &Node, graph: &Graph) -> RetryPolicy {
    let node_retries = node.get_i64("max_retries").unwrap_or(0);
    let graph_retries = graph
        .get_attr("default_max_retry")
        .and_then(crate::graph::AttrValue::as_i64)
        .unwrap_or(0);

    let max_retries = if node_retries > 0 {
        node_retries
    } else if graph_retries > 0 {
        graph_retries
    } else {
        0
    };
    let max_retries = max_retries.clamp(0, i64::from(u32::MAX)) as u32;

    RetryPolicy {
        max_attempts: max_retries.saturating_add(1),
        ..RetryPolicy::default()
    }
}

/// Run a handler under a retry policy.
///
/// - SUCCESS / PARTIAL_SUCCESS reset the node's retry counter and return.
/// - RETRY consumes an attempt: the counter is recorded in the context as
///   `internal.retry_count.<id>`, a retrying event fires, and the backoff
///   delay elapses. Exhausted retries return PARTIAL_SUCCESS when the node
///   has `allow_partial`, else FAIL.
/// - FAIL and SKIPPED return as-is; they are control flow, not errors.
/// - Handler errors retry when the policy's classifier approves and
///   attempts remain; otherwise they become FAIL outcomes with the
///   stringified error.
#[allow(clippy::too_many_arguments)]
pub async fn execute_with_retry(
    handler: &Arc<dyn Handler>,
    node: &Node,
    context: &Context,
    graph: &Graph,
    logs_root: &Path,
    policy: &RetryPolicy,
    emitter: &dyn EventEmitter,
    stage_index: usize,
) -> Outcome {
    let allow_partial = node.get_bool("allow_partial");
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let outcome = match handler.handle(node, context, graph, logs_root).await {
            Ok(outcome) => outcome,
            Err(error) => {
                if (policy.should_retry)(&error) && attempt < policy.max_attempts {
                    note_retry(context, &node.id, attempt, policy, emitter, stage_index).await;
                    continue;
                }
                return Outcome::fail(format!("handler error: {error}"));
            }
        };

        match outcome.status {
            StageStatus::Success | StageStatus::PartialSuccess => {
                reset_retry_count(context, &node.id);
                return outcome;
            }
            StageStatus::Retry => {
                if attempt < policy.max_attempts {
                    note_retry(context, &node.id, attempt, policy, emitter, stage_index).await;
                    continue;
                }
                if allow_partial {
                    reset_retry_count(context, &node.id);
                    return Outcome {
                        status: StageStatus::PartialSuccess,
                        notes: "retries exhausted, partial accepted".into(),
                        ..outcome
                    };
                }
                return Outcome::fail("max retries exceeded");
            }
            StageStatus::Fail | StageStatus::Skipped => return outcome,
        }
    }
}

/// Record the retry, emit the event, sleep the backoff.
async fn note_retry(
    context: &Context,
    node_id: &str,
    attempt: u32,
    policy: &RetryPolicy,
    emitter: &dyn EventEmitter,
    stage_index: usize,
) {
    context.set(
        format!("internal.retry_count.{node_id}"),
        serde_json::Value::Number(attempt.into()),
    );
    emitter.emit(PipelineEvent::StageRetrying {
        node_id: node_id.to_string(),
        stage_index,
        attempt,
        max_attempts: policy.max_attempts,
    });
    let delay = delay_for_attempt(attempt, &policy.backoff);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn reset_retry_count(context: &Context, node_id: &str) {
    context.set(
        format!("internal.retry_count.{node_id}"),
        serde_json::Value::Number(0.into()),
    );
}
