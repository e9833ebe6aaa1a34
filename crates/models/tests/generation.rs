//! generate() and generate_object() behavior.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use orrery_models::{
    AbortController, Client, GenerateObjectOptions, GenerateOptions, LlmError, Message, Reason,
    Tool, ToolDefinition, generate, generate_object,
};
use serde_json::json;

use common::{MockAdapter, ScriptedAdapter, make_response, make_tool_call_response};

fn weather_tool(calls: Arc<AtomicU32>) -> Tool {
    Tool::active(
        ToolDefinition {
            name: "get_weather".into(),
            description: "Get the weather".into(),
            parameters: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
            strict: false,
        },
        move |_args| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!("72F and sunny"))
            }
        },
    )
}

#[tokio::test]
async fn simple_prompt_generates_text() {
    let client = Client::builder()
        .add_provider(MockAdapter::with_text("mock", "Hello!"))
        .build()
        .expect("build");

    let result = generate(
        GenerateOptions::new("test-model")
            .prompt("Say hello")
            .client(&client),
    )
    .await
    .expect("generate");

    assert_eq!(result.text, "Hello!");
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.finish_reason.reason, Reason::Stop);
}

#[tokio::test]
async fn prompt_and_messages_together_rejected() {
    let client = Client::builder()
        .add_provider(MockAdapter::with_text("mock", "x"))
        .build()
        .expect("build");

    let err = generate(
        GenerateOptions::new("test-model")
            .prompt("a")
            .messages(vec![Message::user("b")])
            .client(&client),
    )
    .await
    .expect_err("must reject");
    assert!(matches!(err, LlmError::Configuration { .. }));
}

#[tokio::test]
async fn tool_round_executes_and_loops() {
    let adapter = ScriptedAdapter::new(
        "mock",
        vec![
            make_tool_call_response("mock", &[("c1", "get_weather", json!({"city": "NYC"}))]),
            make_response("mock", "Sunny in NYC."),
        ],
    );
    let client = Client::builder().add_provider(adapter).build().expect("build");

    let executions = Arc::new(AtomicU32::new(0));
    let result = generate(
        GenerateOptions::new("test-model")
            .prompt("weather?")
            .tool(weather_tool(Arc::clone(&executions)))
            .client(&client),
    )
    .await
    .expect("generate");

    assert_eq!(result.text, "Sunny in NYC.");
    assert_eq!(result.steps.len(), 2);
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(result.steps[0].tool_results.len(), 1);
    assert!(!result.steps[0].tool_results[0].is_error);
    // Usage accumulates across both rounds.
    assert_eq!(result.usage.input_tokens, 30);
}

#[tokio::test]
async fn max_tool_rounds_zero_returns_calls_unexecuted() {
    let adapter = ScriptedAdapter::new(
        "mock",
        vec![make_tool_call_response(
            "mock",
            &[("c1", "get_weather", json!({"city": "NYC"}))],
        )],
    );
    let client = Client::builder().add_provider(adapter).build().expect("build");

    let executions = Arc::new(AtomicU32::new(0));
    let result = generate(
        GenerateOptions::new("test-model")
            .prompt("weather?")
            .tool(weather_tool(Arc::clone(&executions)))
            .max_tool_rounds(0)
            .client(&client),
    )
    .await
    .expect("generate");

    assert_eq!(result.finish_reason.reason, Reason::ToolCalls);
    assert_eq!(result.response.tool_calls().len(), 1);
    assert_eq!(executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn passive_tool_call_ends_the_loop() {
    let adapter = ScriptedAdapter::new(
        "mock",
        vec![make_tool_call_response(
            "mock",
            &[("c1", "get_weather", json!({}))],
        )],
    );
    let client = Client::builder().add_provider(adapter).build().expect("build");

    let result = generate(
        GenerateOptions::new("test-model")
            .prompt("weather?")
            .tool(Tool::passive(ToolDefinition {
                name: "get_weather".into(),
                description: "Get the weather".into(),
                parameters: json!({"type": "object"}),
                strict: false,
            }))
            .client(&client),
    )
    .await
    .expect("generate");

    assert_eq!(result.response.tool_calls().len(), 1);
    assert_eq!(result.steps.len(), 1);
}

#[tokio::test]
async fn abort_signal_cancels_generation() {
    let client = Client::builder()
        .add_provider(MockAdapter::with_text("mock", "never"))
        .build()
        .expect("build");

    let controller = AbortController::new();
    controller.abort();

    let err = generate(
        GenerateOptions::new("test-model")
            .prompt("hi")
            .abort_signal(controller.signal())
            .client(&client),
    )
    .await
    .expect_err("must abort");
    assert!(matches!(err, LlmError::Abort { .. }));
}

// ── generate_object ──────────────────────────────────────────────────

#[tokio::test]
async fn object_via_native_schema_path() {
    let client = Client::builder()
        .add_provider(MockAdapter::with_text("mock", r#"{"city": "NYC", "temp": 72}"#))
        .build()
        .expect("build");

    let schema = json!({
        "type": "object",
        "properties": {"city": {"type": "string"}, "temp": {"type": "integer"}},
        "required": ["city"]
    });

    let result = generate_object(
        GenerateObjectOptions::new("test-model", schema)
            .prompt("weather json")
            .client(&client),
    )
    .await
    .expect("object");
    assert_eq!(result.object["city"], "NYC");
}

/// An adapter that reports no structured-output support and answers with
/// the synthetic extraction tool.
struct ToolPathAdapter;

impl orrery_models::ProviderAdapter for ToolPathAdapter {
    fn name(&self) -> &str {
        "toolpath"
    }

    fn supports_structured_output(&self) -> bool {
        false
    }

    fn complete(
        &self,
        request: orrery_models::Request,
    ) -> orrery_models::BoxFuture<'_, orrery_models::LlmResult<orrery_models::Response>> {
        // The extraction tool must be the only required tool.
        let tool_name = request
            .tools
            .as_ref()
            .and_then(|tools| tools.first())
            .map(|t| t.name.clone())
            .unwrap_or_default();
        Box::pin(async move {
            Ok(make_tool_call_response(
                "toolpath",
                &[("c1", tool_name.as_str(), json!({"city": "NYC"}))],
            ))
        })
    }

    fn stream(
        &self,
        _request: orrery_models::Request,
    ) -> orrery_models::BoxFuture<
        '_,
        orrery_models::LlmResult<
            orrery_models::BoxStream<'_, orrery_models::LlmResult<orrery_models::StreamEvent>>,
        >,
    > {
        Box::pin(async {
            Err(LlmError::Configuration {
                message: "no streaming".into(),
            })
        })
    }
}

#[tokio::test]
async fn object_via_tool_extraction_path() {
    let client = Client::builder()
        .add_provider(ToolPathAdapter)
        .build()
        .expect("build");

    let schema = json!({
        "type": "object",
        "properties": {"city": {"type": "string"}},
        "required": ["city"]
    });

    let result = generate_object(
        GenerateObjectOptions::new("test-model", schema)
            .prompt("weather json")
            .client(&client),
    )
    .await
    .expect("object");
    assert_eq!(result.object["city"], "NYC");
}

#[tokio::test]
async fn unparsable_output_is_no_object_generated() {
    let client = Client::builder()
        .add_provider(MockAdapter::with_text("mock", "not json at all"))
        .build()
        .expect("build");

    let err = generate_object(
        GenerateObjectOptions::new("test-model", json!({"type": "object"}))
            .prompt("json please")
            .client(&client),
    )
    .await
    .expect_err("must fail");
    assert!(matches!(err, LlmError::NoObjectGenerated { .. }));
}
