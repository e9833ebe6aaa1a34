//! Provider profiles.
//!
//! A [`ProviderProfile`] bundles everything that binds a session to a
//! model family: the model id, the tool registry, the system prompt base,
//! provider options, and capability flags.

use std::collections::HashMap;
use std::fmt;

use orrery_models::ToolDefinition;
use serde_json::Value;

use crate::registry::ToolRegistry;

/// The session's view of a provider binding.
pub trait ProviderProfile: fmt::Debug + Send + Sync {
    /// Provider identifier (`"openai"`, `"anthropic"`, `"gemini"`, …).
    fn id(&self) -> &str;

    /// Model identifier.
    fn model(&self) -> &str;

    fn tool_registry(&self) -> &ToolRegistry;

    fn tool_registry_mut(&mut self) -> &mut ToolRegistry;

    /// Base system-prompt text for this model family.
    fn base_instructions(&self) -> &str;

    /// Assemble the system prompt: base instructions, then environment
    /// context, then project instructions. Tool schemas travel on the
    /// request's `tools` field, not in the prompt.
    fn build_system_prompt(&self, environment_context: &str, project_docs: &str) -> String {
        let mut prompt = self.base_instructions().to_string();
        if !environment_context.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(environment_context);
        }
        if !project_docs.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(project_docs);
        }
        prompt
    }

    /// All tool definitions, registration-ordered.
    fn tools(&self) -> Vec<ToolDefinition> {
        self.tool_registry().definitions()
    }

    /// Provider-specific request options, if any.
    fn provider_options(&self) -> Option<HashMap<String, Value>> {
        None
    }

    fn supports_reasoning(&self) -> bool;

    fn supports_streaming(&self) -> bool;

    fn supports_parallel_tool_calls(&self) -> bool;

    /// Context window size in tokens, for usage estimation.
    fn context_window_size(&self) -> u64;

    /// Register the subagent tools into this profile's registry. The
    /// session calls this when its depth allows spawning.
    fn register_subagent_tools(&mut self) {
        crate::subagents::register_subagent_tools(self.tool_registry_mut());
    }

    /// Derive the profile for a child session, optionally on a different
    /// model. The child starts from the provider's base tool set; parent
    /// custom tools are not copied (their executors cannot be cloned).
    fn child_profile(&self, model_override: Option<&str>) -> Box<dyn ProviderProfile>;
}

/// A configurable profile useful for tests, embedders, and as the base
/// for subagent children.
pub struct BaseProfile {
    id: String,
    model: String,
    base_instructions: String,
    registry: ToolRegistry,
    provider_options: Option<HashMap<String, Value>>,
    supports_reasoning: bool,
    supports_streaming: bool,
    supports_parallel_tool_calls: bool,
    context_window_size: u64,
}

impl fmt::Debug for BaseProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseProfile")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("tools", &self.registry.names())
            .finish_non_exhaustive()
    }
}

impl BaseProfile {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            base_instructions: "You are a capable coding agent.".into(),
            registry: ToolRegistry::new(),
            provider_options: None,
            supports_reasoning: false,
            supports_streaming: true,
            supports_parallel_tool_calls: false,
            context_window_size: 200_000,
        }
    }

    #[must_use]
    pub fn with_base_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.base_instructions = instructions.into();
        self
    }

    #[must_use]
    pub fn with_parallel_tool_calls(mut self, supported: bool) -> Self {
        self.supports_parallel_tool_calls = supported;
        self
    }

    #[must_use]
    pub fn with_reasoning(mut self, supported: bool) -> Self {
        self.supports_reasoning = supported;
        self
    }

    #[must_use]
    pub fn with_context_window(mut self, tokens: u64) -> Self {
        self.context_window_size = tokens;
        self
    }

    #[must_use]
    pub fn with_provider_options(mut self, options: HashMap<String, Value>) -> Self {
        self.provider_options = Some(options);
        self
    }
}

impl ProviderProfile for BaseProfile {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn tool_registry(&self) -> &ToolRegistry {
        &self.registry
    }

    fn tool_registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    fn base_instructions(&self) -> &str {
        &self.base_instructions
    }

    fn provider_options(&self) -> Option<HashMap<String, Value>> {
        self.provider_options.clone()
    }

    fn supports_reasoning(&self) -> bool {
        self.supports_reasoning
    }

    fn supports_streaming(&self) -> bool {
        self.supports_streaming
    }

    fn supports_parallel_tool_calls(&self) -> bool {
        self.supports_parallel_tool_calls
    }

    fn context_window_size(&self) -> u64 {
        self.context_window_size
    }

    fn child_profile(&self, model_override: Option<&str>) -> Box<dyn ProviderProfile> {
        Box::new(
            Self::new(self.id.clone(), model_override.unwrap_or(&self.model))
                .with_base_instructions(self.base_instructions.clone())
                .with_parallel_tool_calls(self.supports_parallel_tool_calls)
                .with_reasoning(self.supports_reasoning)
                .with_context_window(self.context_window_size),
        )
    }
}
