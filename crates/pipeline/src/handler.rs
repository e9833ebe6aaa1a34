//! The handler contract and the type-string registry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::PipelineResult;
use crate::graph::{Graph, Node};
use crate::types::Outcome;

/// Executes one pipeline node.
///
/// `logs_root` is the run directory; a handler owns
/// `<logs_root>/<node_id>/` for its artifacts (`status.json`,
/// `prompt.md`, `response.md`, …).
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        node: &Node,
        context: &Context,
        graph: &Graph,
        logs_root: &Path,
    ) -> PipelineResult<Outcome>;
}

/// Maps handler type strings to implementations.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
    default: Option<Arc<dyn Handler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.handlers.keys().collect::<Vec<_>>())
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            default: None,
        }
    }

    /// A registry with the dependency-free built-ins: start, exit,
    /// conditional, codergen (simulation), tool, and fan_in.
    ///
    /// `parallel` (needs the registry and an emitter) and `wait.human`
    /// (needs an interviewer) are registered explicitly by the caller.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("start", crate::handlers::StartHandler);
        registry.register("exit", crate::handlers::ExitHandler);
        registry.register("conditional", crate::handlers::ConditionalHandler);
        registry.register("codergen", crate::handlers::CodergenHandler::simulation());
        registry.register("tool", crate::handlers::ToolHandler);
        registry.register("fan_in", crate::handlers::FanInHandler);
        registry
    }

    /// Register a handler, replacing any previous one for the type.
    pub fn register(&mut self, handler_type: impl Into<String>, handler: impl Handler + 'static) {
        self.handlers.insert(handler_type.into(), Arc::new(handler));
    }

    /// Fallback used when no type matches.
    pub fn set_default(&mut self, handler: impl Handler + 'static) {
        self.default = Some(Arc::new(handler));
    }

    /// Resolve a node's handler from its `handler_type()` (explicit
    /// `type`, else shape mapping), falling back to the default.
    #[must_use]
    pub fn resolve(&self, node: &Node) -> Option<Arc<dyn Handler>> {
        if let Some(handler) = self.handlers.get(node.handler_type()) {
            return Some(Arc::clone(handler));
        }
        self.default.clone()
    }
}
