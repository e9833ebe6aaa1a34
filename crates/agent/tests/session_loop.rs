//! The session loop: turn recording, tool rounds, steering, limits,
//! events, and error handling.

mod common;

use std::sync::Arc;

use orrery_agent::{
    BaseProfile, EventKind, LocalEnvironment, ProviderProfile, Session, SessionConfig,
    SessionState, Turn, tool_fn,
};
use orrery_models::{AbortController, ErrorDetails, LlmError, RetryConfig, ToolDefinition};
use serde_json::json;

use common::{
    FailingClient, ScriptedClient, profile_with_read_tool, text_response, tool_call_response,
};

fn test_env() -> (tempfile::TempDir, Arc<LocalEnvironment>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = Arc::new(LocalEnvironment::new(dir.path()));
    (dir, env)
}

fn session_with(
    profile: BaseProfile,
    client: Arc<ScriptedClient>,
    config: SessionConfig,
) -> (tempfile::TempDir, Session, orrery_agent::EventReceiver) {
    let (dir, env) = test_env();
    let (session, receiver) = Session::new(Box::new(profile), env, client, config);
    (dir, session, receiver)
}

#[tokio::test]
async fn natural_completion_records_user_and_assistant() {
    let client = Arc::new(ScriptedClient::new(vec![text_response("Hello!")]));
    let (_dir, mut session, mut receiver) = session_with(
        BaseProfile::new("anthropic", "test-model"),
        Arc::clone(&client),
        SessionConfig::default(),
    );

    session.submit("hi").await.expect("submit");

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(client.call_count(), 1);

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert!(matches!(&history[0], Turn::User { content, .. } if content == "hi"));
    assert!(matches!(&history[1], Turn::Assistant { content, .. } if content == "Hello!"));

    let kinds: Vec<EventKind> = receiver.drain().into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds[0], EventKind::SessionStart);
    assert!(kinds.contains(&EventKind::UserInput));
    assert!(kinds.contains(&EventKind::LlmCallStart));
    assert!(kinds.contains(&EventKind::LlmCallEnd));
    assert!(kinds.contains(&EventKind::AssistantTextEnd));
    assert!(kinds.contains(&EventKind::TurnComplete));
}

#[tokio::test]
async fn one_tool_round_matches_call_ids_in_order() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_call_response(&[("t1", "read_file", json!({"file_path": "/x"}))]),
        text_response("OK"),
    ]));
    let (_dir, mut session, _receiver) = session_with(
        profile_with_read_tool(),
        Arc::clone(&client),
        SessionConfig::default(),
    );

    session.submit("read /x").await.expect("submit");

    assert_eq!(client.call_count(), 2);
    let tool_turns: Vec<&Turn> = session
        .history()
        .iter()
        .filter(|t| matches!(t, Turn::ToolResults { .. }))
        .collect();
    assert_eq!(tool_turns.len(), 1);
    let Turn::ToolResults { results, .. } = tool_turns[0] else {
        panic!("expected tool results");
    };
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tool_call_id, "t1");
    assert!(!results[0].is_error);
    assert_eq!(results[0].content, json!("contents of /x"));
}

#[tokio::test]
async fn unknown_tool_becomes_error_result() {
    let client = Arc::new(ScriptedClient::new(vec![
        tool_call_response(&[("t1", "bogus", json!({}))]),
        text_response("done"),
    ]));
    let (_dir, mut session, _receiver) = session_with(
        BaseProfile::new("anthropic", "test-model"),
        client,
        SessionConfig::default(),
    );

    session.submit("go").await.expect("submit");

    let Some(Turn::ToolResults { results, .. }) = session
        .history()
        .iter()
        .find(|t| matches!(t, Turn::ToolResults { .. }))
    else {
        panic!("expected tool results");
    };
    assert!(results[0].is_error);
    assert!(
        results[0]
            .content
            .as_str()
            .is_some_and(|s| s.contains("Unknown tool: bogus"))
    );
}

#[tokio::test]
async fn steering_is_injected_before_the_model_call() {
    let client = Arc::new(ScriptedClient::new(vec![text_response("ack")]));
    let (_dir, mut session, mut receiver) = session_with(
        BaseProfile::new("anthropic", "test-model"),
        client,
        SessionConfig::default(),
    );

    session.steer("prefer small diffs");
    session.submit("hi").await.expect("submit");

    let history = session.history();
    assert!(matches!(&history[0], Turn::User { .. }));
    assert!(
        matches!(&history[1], Turn::Steering { content, .. } if content == "prefer small diffs")
    );

    // STEERING_INJECTED precedes the round's LLM_CALL_START.
    let kinds: Vec<EventKind> = receiver.drain().into_iter().map(|e| e.kind).collect();
    let steer_at = kinds
        .iter()
        .position(|k| *k == EventKind::SteeringInjected)
        .expect("steering event");
    let llm_at = kinds
        .iter()
        .position(|k| *k == EventKind::LlmCallStart)
        .expect("llm event");
    assert!(steer_at < llm_at);
}

#[tokio::test]
async fn follow_up_runs_after_completion() {
    let client = Arc::new(ScriptedClient::new(vec![
        text_response("first"),
        text_response("second"),
    ]));
    let (_dir, mut session, _receiver) = session_with(
        BaseProfile::new("anthropic", "test-model"),
        Arc::clone(&client),
        SessionConfig::default(),
    );

    session.follow_up("and then?");
    session.submit("hi").await.expect("submit");

    assert_eq!(client.call_count(), 2);
    let users: Vec<&str> = session
        .history()
        .iter()
        .filter_map(|t| match t {
            Turn::User { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(users, vec!["hi", "and then?"]);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn max_turns_halts_with_turn_limit_event() {
    // The script always asks for another tool round; the turn budget has
    // to stop it.
    let client = Arc::new(ScriptedClient::new(vec![tool_call_response(&[(
        "t1",
        "read_file",
        json!({"file_path": "/x"}),
    )])]));
    let config = SessionConfig {
        max_turns: 4,
        ..SessionConfig::default()
    };
    let (_dir, mut session, mut receiver) =
        session_with(profile_with_read_tool(), client, config);

    session.submit("go").await.expect("submit");

    assert!(session.counted_turns() <= 4);
    let kinds: Vec<EventKind> = receiver.drain().into_iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::TurnLimit));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn llm_failure_closes_session_without_erroring() {
    let client = Arc::new(FailingClient {
        error: LlmError::Authentication {
            message: "bad key".into(),
            details: ErrorDetails::default(),
        },
    });
    let (_dir, env) = test_env();
    let (mut session, mut receiver) = Session::new(
        Box::new(BaseProfile::new("anthropic", "test-model")),
        env,
        client,
        SessionConfig::default(),
    );
    session.set_retry_config(RetryConfig::none());

    let result = session.submit("hi").await;
    assert!(result.is_ok(), "LLM failures are reported via events");
    assert_eq!(session.state(), SessionState::Closed);

    let kinds: Vec<EventKind> = receiver.drain().into_iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::Error));
    assert_eq!(kinds.last(), Some(&EventKind::SessionEnd));

    // A closed session rejects further submits.
    assert!(session.submit("again").await.is_err());
}

#[tokio::test]
async fn double_close_emits_session_end_once() {
    let client = Arc::new(ScriptedClient::new(vec![text_response("x")]));
    let (_dir, mut session, mut receiver) = session_with(
        BaseProfile::new("anthropic", "test-model"),
        client,
        SessionConfig::default(),
    );

    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Closed);

    let ends = receiver
        .drain()
        .into_iter()
        .filter(|e| e.kind == EventKind::SessionEnd)
        .count();
    assert_eq!(ends, 1);
}

#[tokio::test]
async fn abort_mid_tool_execution_drops_results() {
    // A slow tool plus an abort that fires while it runs: the session
    // closes and the in-flight results never reach history.
    let mut profile = BaseProfile::new("anthropic", "test-model");
    profile.tool_registry_mut().register(tool_fn(
        ToolDefinition {
            name: "slow".into(),
            description: "Sleep".into(),
            parameters: json!({"type": "object"}),
            strict: false,
        },
        |_args, _env| {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                Ok("too late".to_string())
            })
        },
    ));

    let client = Arc::new(ScriptedClient::new(vec![
        tool_call_response(&[("t1", "slow", json!({}))]),
        text_response("never reached"),
    ]));
    let (_dir, env) = test_env();
    let (mut session, _receiver) = Session::new(
        Box::new(profile),
        env,
        client,
        SessionConfig::default(),
    );

    let controller = AbortController::new();
    session.set_abort_signal(controller.signal());
    let trigger = controller.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.abort();
    });

    session.submit("go").await.expect("submit");

    assert_eq!(session.state(), SessionState::Closed);
    assert!(
        !session
            .history()
            .iter()
            .any(|t| matches!(t, Turn::ToolResults { .. })),
        "aborted tool results must be dropped"
    );
}

#[tokio::test]
async fn parallel_execution_keeps_results_in_input_order() {
    let mut profile = BaseProfile::new("anthropic", "test-model").with_parallel_tool_calls(true);
    for (name, delay_ms) in [("slow_tool", 80u64), ("fast_tool", 1u64)] {
        profile.tool_registry_mut().register(tool_fn(
            ToolDefinition {
                name: name.into(),
                description: "timed".into(),
                parameters: json!({"type": "object"}),
                strict: false,
            },
            move |_args, _env| {
                Box::pin(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    Ok(format!("done:{delay_ms}"))
                })
            },
        ));
    }

    let client = Arc::new(ScriptedClient::new(vec![
        tool_call_response(&[
            ("a", "slow_tool", json!({})),
            ("b", "fast_tool", json!({})),
        ]),
        text_response("ok"),
    ]));
    let (_dir, env) = test_env();
    let (mut session, _receiver) = Session::new(
        Box::new(profile),
        env,
        client,
        SessionConfig::default(),
    );

    session.submit("go").await.expect("submit");

    let Some(Turn::ToolResults { results, .. }) = session
        .history()
        .iter()
        .find(|t| matches!(t, Turn::ToolResults { .. }))
    else {
        panic!("expected tool results");
    };
    let ids: Vec<&str> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"], "input order regardless of completion order");
}

#[tokio::test]
async fn repeated_identical_calls_trigger_loop_detection() {
    let client = Arc::new(ScriptedClient::new(vec![tool_call_response(&[(
        "t1",
        "read_file",
        json!({"file_path": "/same"}),
    )])]));
    let config = SessionConfig {
        loop_detection_window: 6,
        max_tool_rounds_per_input: 8,
        ..SessionConfig::default()
    };
    let (_dir, mut session, mut receiver) =
        session_with(profile_with_read_tool(), client, config);

    session.submit("go").await.expect("submit");

    assert!(
        session.history().iter().any(|t| matches!(
            t,
            Turn::Steering { content, .. } if content.starts_with("Loop detected")
        )),
        "a loop steering turn must be appended"
    );
    let kinds: Vec<EventKind> = receiver.drain().into_iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::LoopDetection));
}
