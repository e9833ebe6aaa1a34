//! Edge condition expressions.
//!
//! ```text
//! ConditionExpr ::= Clause ( '&&' Clause )*
//! Clause        ::= Key '=' Literal | Key '!=' Literal | Key
//! ```
//!
//! All clauses are AND-combined; empty clauses are skipped; a bare key is
//! a truthy (non-empty) check. `outcome` and `preferred_label` resolve
//! from the stage outcome, everything else from the context; missing keys
//! compare as empty strings. Quoted literals are unquoted, so
//! `label="Fix"` and `label=Fix` are the same.

use crate::context::Context;
use crate::types::Outcome;

/// Evaluate a condition against an outcome and context. Empty conditions
/// are true.
#[must_use]
pub fn evaluate_condition(condition: &str, outcome: &Outcome, context: &Context) -> bool {
    let condition = condition.trim();
    if condition.is_empty() {
        return true;
    }

    for clause in condition.split("&&") {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        if !evaluate_clause(clause, outcome, context) {
            return false;
        }
    }
    true
}

fn evaluate_clause(clause: &str, outcome: &Outcome, context: &Context) -> bool {
    // `!=` first, since it contains `=`.
    if let Some((key, value)) = clause.split_once("!=") {
        return resolve_key(key.trim(), outcome, context) != strip_quotes(value.trim());
    }
    if let Some((key, value)) = clause.split_once('=') {
        return resolve_key(key.trim(), outcome, context) == strip_quotes(value.trim());
    }
    // Bare key: truthy check.
    !resolve_key(clause, outcome, context).is_empty()
}

fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Resolve a clause key to its comparison string.
fn resolve_key(key: &str, outcome: &Outcome, context: &Context) -> String {
    if key == "outcome" {
        return outcome.status.as_str().to_string();
    }
    if key == "preferred_label" {
        return outcome.preferred_label.clone();
    }
    if let Some(path) = key.strip_prefix("context.") {
        // A literal "context.x" key takes precedence, then the bare path.
        if let Some(value) = context.get(key) {
            return value_to_string(&value);
        }
        return context.get_string(path);
    }
    context.get_string(key)
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
