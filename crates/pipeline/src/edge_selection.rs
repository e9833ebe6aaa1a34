//! Edge selection: the deterministic 5-step priority.
//!
//! 1. Condition-matching edges; best by weight, lexical target tiebreak.
//! 2. Preferred-label match, after accelerator-prefix normalization.
//! 3. Suggested next ids, first match in order.
//! 4. Unconditional edges by weight, lexical tiebreak.
//! 5. Fallback: any edge by weight, lexical tiebreak.
//!
//! `None` only when the node has no outgoing edges at all.

use crate::condition::evaluate_condition;
use crate::context::Context;
use crate::graph::{Edge, Graph};
use crate::types::Outcome;

/// Pick the next edge out of `node_id`.
#[must_use]
pub fn select_edge<'g>(
    node_id: &str,
    outcome: &Outcome,
    context: &Context,
    graph: &'g Graph,
) -> Option<&'g Edge> {
    let edges = graph.outgoing_edges(node_id);
    if edges.is_empty() {
        return None;
    }

    // Step 1: condition matches.
    let matching: Vec<&Edge> = edges
        .iter()
        .filter(|e| {
            let condition = e.condition();
            !condition.is_empty() && evaluate_condition(condition, outcome, context)
        })
        .copied()
        .collect();
    if let Some(edge) = best_by_weight(&matching) {
        return Some(edge);
    }

    // Step 2: preferred label.
    if !outcome.preferred_label.is_empty() {
        let wanted = normalize_label(&outcome.preferred_label);
        if let Some(edge) = edges.iter().find(|e| normalize_label(e.label()) == wanted) {
            return Some(edge);
        }
    }

    // Step 3: suggested next ids, in the outcome's order.
    for suggested in &outcome.suggested_next_ids {
        if let Some(edge) = edges.iter().find(|e| &e.to == suggested) {
            return Some(edge);
        }
    }

    // Step 4: unconditional edges by weight.
    let unconditional: Vec<&Edge> = edges
        .iter()
        .filter(|e| e.condition().is_empty())
        .copied()
        .collect();
    if let Some(edge) = best_by_weight(&unconditional) {
        return Some(edge);
    }

    // Step 5: anything at all.
    best_by_weight(&edges)
}

/// Normalize a label for matching: trim, lowercase, and strip accelerator
/// prefixes (`[K] …`, `K) …`, `K - …`).
#[must_use]
pub fn normalize_label(label: &str) -> String {
    let lowered = label.trim().to_lowercase();

    if let Some(rest) = lowered
        .strip_prefix('[')
        .and_then(|s| s.split_once("] "))
        .map(|(_, rest)| rest)
    {
        return rest.to_string();
    }

    let bytes = lowered.as_bytes();
    if lowered.len() >= 3 && bytes.get(1) == Some(&b')') && bytes.get(2) == Some(&b' ') {
        return lowered[3..].to_string();
    }
    if lowered.len() >= 4 && bytes.get(1..4) == Some(b" - ".as_slice()) {
        return lowered[4..].to_string();
    }

    lowered
}

/// Highest weight wins; equal weights break toward the lexically smaller
/// target id.
fn best_by_weight<'g>(edges: &[&'g Edge]) -> Option<&'g Edge> {
    let mut best: Option<&Edge> = None;
    for &edge in edges {
        match best {
            None => best = Some(edge),
            Some(current) => {
                if edge.weight() > current.weight()
                    || (edge.weight() == current.weight() && edge.to < current.to)
                {
                    best = Some(edge);
                }
            }
        }
    }
    best
}
