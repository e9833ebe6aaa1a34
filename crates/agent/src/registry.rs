//! Tool registry: name → (definition, executor) with lightweight argument
//! validation and a dispatch surface that never throws.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use indexmap::IndexMap;
use orrery_models::ToolDefinition;
use serde_json::Value;

use crate::error::{AgentError, AgentResult};
use crate::execution::ExecutionEnvironment;

/// Async executor for one tool: arguments plus the execution environment
/// in, textual-or-structured output out.
pub type ToolExecutorFn = Box<
    dyn Fn(
            Value,
            &dyn ExecutionEnvironment,
        ) -> Pin<Box<dyn Future<Output = AgentResult<String>> + Send + '_>>
        + Send
        + Sync,
>;

/// The envelope every dispatch returns. Failures of any kind (unknown
/// tool, invalid arguments, executor errors) collapse into
/// `is_error: true` instead of escaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub output: String,
    pub is_error: bool,
}

/// Result of validating a call's arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub error: Option<String>,
}

impl ValidationOutcome {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

/// A definition paired with its executor.
pub struct RegisteredTool {
    definition: ToolDefinition,
    executor: ToolExecutorFn,
}

impl RegisteredTool {
    pub fn new(definition: ToolDefinition, executor: ToolExecutorFn) -> Self {
        Self {
            definition,
            executor,
        }
    }

    #[must_use]
    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    pub async fn execute(
        &self,
        args: Value,
        env: &dyn ExecutionEnvironment,
    ) -> AgentResult<String> {
        (self.executor)(args, env).await
    }
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

/// Insertion-ordered map of tool name to registered tool.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, RegisteredTool>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later registration of the same name replaces the
    /// earlier one in place, keeping its position in the ordering.
    pub fn register(&mut self, tool: RegisteredTool) {
        self.tools.insert(tool.definition.name.clone(), tool);
    }

    /// Remove a tool. Returns whether it existed.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.shift_remove(name).is_some()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All definitions, in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    /// All names, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate a call's arguments against the declared parameter schema.
    ///
    /// The check is deliberately lighter than full JSON Schema:
    /// - Unknown tool: invalid, `"Unknown tool: <name>"`.
    /// - Absent or non-object schema: accept.
    /// - Every `required` key must be present.
    /// - Present keys declared in `properties` must match the declared
    ///   type; `integer` only accepts integral numbers, never floats.
    /// - Properties not declared in the schema are silently allowed.
    #[must_use]
    pub fn validate(&self, name: &str, args: &Value) -> ValidationOutcome {
        let Some(tool) = self.tools.get(name) else {
            return ValidationOutcome::invalid(format!("Unknown tool: {name}"));
        };

        let schema = &tool.definition.parameters;
        let Some(schema_obj) = schema.as_object() else {
            return ValidationOutcome::ok();
        };

        if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if args.get(key).is_none() {
                    return ValidationOutcome::invalid(format!(
                        "missing required parameter: {key}"
                    ));
                }
            }
        }

        if let Some(properties) = schema_obj.get("properties").and_then(Value::as_object) {
            for (key, prop) in properties {
                let Some(value) = args.get(key) else {
                    continue;
                };
                let Some(expected) = prop.get("type").and_then(Value::as_str) else {
                    continue;
                };
                if !type_matches(expected, value) {
                    return ValidationOutcome::invalid(format!(
                        "parameter '{key}' expected type {expected}"
                    ));
                }
            }
        }

        ValidationOutcome::ok()
    }

    /// Execute a call end to end: resolve, validate, run. Executor errors
    /// never escape; everything becomes a [`DispatchResult`].
    pub async fn dispatch(
        &self,
        name: &str,
        args: Value,
        env: &dyn ExecutionEnvironment,
    ) -> DispatchResult {
        let outcome = self.validate(name, &args);
        if !outcome.valid {
            return DispatchResult {
                output: outcome.error.unwrap_or_else(|| "invalid arguments".into()),
                is_error: true,
            };
        }

        let Some(tool) = self.tools.get(name) else {
            return DispatchResult {
                output: format!("Unknown tool: {name}"),
                is_error: true,
            };
        };

        match tool.execute(args, env).await {
            Ok(output) => DispatchResult {
                output,
                is_error: false,
            },
            Err(err) => DispatchResult {
                output: err.to_string(),
                is_error: true,
            },
        }
    }
}

/// Schema-lite type check for a declared property type.
fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unrecognized declared types don't block the call.
        _ => true,
    }
}

/// Convenience for registering a closure-backed tool.
pub fn tool_fn<F>(definition: ToolDefinition, f: F) -> RegisteredTool
where
    F: for<'a> Fn(
            Value,
            &'a dyn ExecutionEnvironment,
        ) -> Pin<Box<dyn Future<Output = AgentResult<String>> + Send + 'a>>
        + Send
        + Sync
        + 'static,
{
    RegisteredTool::new(definition, Box::new(f))
}

/// An executor that always fails; used for tools that the session layer
/// intercepts before dispatch (the subagent tools).
pub(crate) fn intercepted_executor() -> ToolExecutorFn {
    Box::new(|_args, _env| {
        Box::pin(async {
            Err(AgentError::Io {
                message: "tool call should be intercepted by the session layer".into(),
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool(name: &str, parameters: Value) -> RegisteredTool {
        tool_fn(
            ToolDefinition {
                name: name.into(),
                description: "echo".into(),
                parameters,
                strict: false,
            },
            |args, _env| Box::pin(async move { Ok(args.to_string()) }),
        )
    }

    #[test]
    fn validate_unknown_tool() {
        let registry = ToolRegistry::new();
        let outcome = registry.validate("bogus", &json!({}));
        assert!(!outcome.valid);
        assert_eq!(outcome.error.as_deref(), Some("Unknown tool: bogus"));
    }

    #[test]
    fn validate_accepts_when_schema_not_object() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("t", json!({"type": "object"})));
        assert!(registry.validate("t", &json!({"extra": 1})).valid);
    }

    #[test]
    fn validate_checks_required_and_types() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool(
            "t",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "count": {"type": "integer"}
                },
                "required": ["path"]
            }),
        ));

        assert!(!registry.validate("t", &json!({})).valid);
        assert!(registry.validate("t", &json!({"path": "/x"})).valid);
        assert!(!registry.validate("t", &json!({"path": 5})).valid);
        assert!(registry.validate("t", &json!({"path": "/x", "count": 3})).valid);
        // A float is not an integer.
        assert!(!registry.validate("t", &json!({"path": "/x", "count": 3.5})).valid);
        // Extra properties are fine.
        assert!(registry.validate("t", &json!({"path": "/x", "other": true})).valid);
    }

    #[test]
    fn reregistration_replaces_and_keeps_single_name() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("t", json!({"type": "object"})));
        registry.register(echo_tool("t", json!({"type": "object"})));
        assert_eq!(registry.names(), vec!["t"]);
        assert_eq!(registry.len(), 1);
    }
}
