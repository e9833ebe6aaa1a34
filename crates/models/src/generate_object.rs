//! Structured-object generation.
//!
//! Providers that accept a JSON-schema response format get the native
//! path: force the format and parse the text. Providers that do not get
//! tool-based extraction: a single synthetic required tool whose
//! parameters are the schema, one round, and the call's arguments are the
//! object. Either way the result is validated against the schema before
//! being returned.

use serde_json::Value;

use crate::client::Client;
use crate::error::{LlmError, LlmResult};
use crate::retry::{RetryConfig, retry};
use crate::types::message::Message;
use crate::types::request::Request;
use crate::types::response::Response;
use crate::types::response_format::ResponseFormat;
use crate::types::tool::{ToolChoice, ToolDefinition};
use crate::types::usage::Usage;

/// Name of the synthetic extraction tool.
const EXTRACTION_TOOL: &str = "emit_object";

/// Options for [`generate_object`].
pub struct GenerateObjectOptions<'a> {
    model: String,
    prompt: Option<String>,
    messages: Option<Vec<Message>>,
    system: Option<String>,
    provider: Option<String>,
    schema: Value,
    retry: RetryConfig,
    client: Option<&'a Client>,
}

impl<'a> GenerateObjectOptions<'a> {
    #[must_use]
    pub fn new(model: impl Into<String>, schema: Value) -> Self {
        Self {
            model: model.into(),
            prompt: None,
            messages: None,
            system: None,
            provider: None,
            schema,
            retry: RetryConfig::default(),
            client: None,
        }
    }

    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    #[must_use]
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn client(mut self, client: &'a Client) -> Self {
        self.client = Some(client);
        self
    }
}

/// The outcome of [`generate_object`].
#[derive(Debug, Clone)]
pub struct GenerateObjectResult {
    pub object: Value,
    pub response: Response,
    pub usage: Usage,
}

/// Generate a JSON value conforming to the options' schema.
pub async fn generate_object(options: GenerateObjectOptions<'_>) -> LlmResult<GenerateObjectResult> {
    let client = options.client.ok_or_else(|| LlmError::Configuration {
        message: "generate_object requires a client".into(),
    })?;

    let mut messages = match (&options.prompt, &options.messages) {
        (Some(_), Some(_)) => {
            return Err(LlmError::Configuration {
                message: "set prompt or messages, not both".into(),
            });
        }
        (Some(prompt), None) => vec![Message::user(prompt.clone())],
        (None, Some(messages)) => messages.clone(),
        (None, None) => {
            return Err(LlmError::Configuration {
                message: "generate_object requires a prompt or messages".into(),
            });
        }
    };
    if let Some(system) = &options.system {
        messages.insert(0, Message::system(system.clone()));
    }

    let mut request = Request::new(options.model.clone(), messages);
    request.provider = options.provider.clone();

    let native = client.supports_structured_output(options.provider.as_deref());
    if native {
        request.response_format = Some(ResponseFormat::json_schema(options.schema.clone(), true));
    } else {
        request.tools = Some(vec![ToolDefinition {
            name: EXTRACTION_TOOL.into(),
            description: "Return the final result as a structured object.".into(),
            parameters: options.schema.clone(),
            strict: true,
        }]);
        request.tool_choice = Some(ToolChoice::Required);
    }

    let response = retry(&options.retry, || client.complete(request.clone())).await?;
    let usage = response.usage.clone();

    let object = if native {
        extract_from_text(&response)
    } else {
        extract_from_tool_call(&response)
    };

    let object = object.ok_or_else(|| LlmError::NoObjectGenerated {
        message: "response contained no parsable object".into(),
    })?;

    validate_against_schema(&object, &options.schema)?;

    Ok(GenerateObjectResult {
        object,
        response,
        usage,
    })
}

/// Native path: the response text is the JSON document.
fn extract_from_text(response: &Response) -> Option<Value> {
    serde_json::from_str(response.text().trim()).ok()
}

/// Extraction path: the synthetic tool's arguments are the object.
fn extract_from_tool_call(response: &Response) -> Option<Value> {
    response
        .tool_calls()
        .into_iter()
        .find(|tc| tc.name == EXTRACTION_TOOL && tc.parse_error.is_none())
        .map(|tc| tc.arguments)
}

/// Validate the parsed object against the schema. A schema that fails to
/// compile skips validation rather than blocking the result.
fn validate_against_schema(object: &Value, schema: &Value) -> LlmResult<()> {
    let Ok(validator) = jsonschema::validator_for(schema) else {
        return Ok(());
    };
    let errors: Vec<String> = validator.iter_errors(object).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(LlmError::NoObjectGenerated {
            message: format!("object failed schema validation: {}", errors.join("; ")),
        })
    }
}
