//! Subagent supervision: spawn, wait, send_input, close, depth limits.

mod common;

use std::sync::Arc;

use orrery_agent::{
    BaseProfile, LocalEnvironment, ProviderProfile, SessionConfig, SubagentManager, channel_with_id,
};
use serde_json::{Value, json};

use common::{ScriptedClient, text_response};

fn manager_at_depth(
    client: Arc<ScriptedClient>,
    depth: u32,
    max_depth: u32,
) -> (tempfile::TempDir, SubagentManager) {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = Arc::new(LocalEnvironment::new(dir.path()));
    let (emitter, _receiver) = channel_with_id("parent".into());
    (
        dir,
        SubagentManager::new(env, client, emitter, depth, max_depth),
    )
}

fn parent_profile() -> BaseProfile {
    BaseProfile::new("anthropic", "test-model")
}

fn parse(output: &str) -> Value {
    serde_json::from_str(output).expect("tool output is JSON")
}

#[tokio::test]
async fn spawn_then_wait_returns_child_output() {
    let client = Arc::new(ScriptedClient::new(vec![text_response("child says hi")]));
    let (_dir, mut manager) = manager_at_depth(client, 0, 1);
    let profile = parent_profile();
    let config = SessionConfig::default();

    let spawned = manager
        .execute("spawn_agent", json!({"task": "do a thing"}), &profile, &config)
        .await
        .expect("spawn");
    let spawned = parse(&spawned);
    assert_eq!(spawned["status"], "running");
    let agent_id = spawned["agent_id"].as_str().expect("id").to_string();

    let waited = manager
        .execute("wait", json!({"agent_id": agent_id}), &profile, &config)
        .await
        .expect("wait");
    let waited = parse(&waited);
    assert_eq!(waited["status"], "completed");
    assert_eq!(waited["success"], true);
    assert_eq!(waited["output"], "child says hi");
    assert!(waited["turns_used"].as_u64().expect("turns") >= 1);
}

#[tokio::test]
async fn depth_budget_refuses_deeper_spawns() {
    let client = Arc::new(ScriptedClient::new(vec![text_response("x")]));
    let (_dir, mut manager) = manager_at_depth(client, 1, 1);
    let profile = parent_profile();
    let config = SessionConfig::default();

    let err = manager
        .execute("spawn_agent", json!({"task": "too deep"}), &profile, &config)
        .await
        .expect_err("depth limit");
    assert!(err.to_string().contains("depth"));
}

#[tokio::test]
async fn wait_unknown_agent_errors() {
    let client = Arc::new(ScriptedClient::new(vec![text_response("x")]));
    let (_dir, mut manager) = manager_at_depth(client, 0, 1);
    let profile = parent_profile();
    let config = SessionConfig::default();

    let err = manager
        .execute("wait", json!({"agent_id": "agent-99"}), &profile, &config)
        .await
        .expect_err("unknown id");
    assert!(err.to_string().contains("unknown agent_id"));
}

#[tokio::test]
async fn send_input_requires_running_agent() {
    let client = Arc::new(ScriptedClient::new(vec![text_response("done")]));
    let (_dir, mut manager) = manager_at_depth(client, 0, 1);
    let profile = parent_profile();
    let config = SessionConfig::default();

    let spawned = parse(
        &manager
            .execute("spawn_agent", json!({"task": "t"}), &profile, &config)
            .await
            .expect("spawn"),
    );
    let agent_id = spawned["agent_id"].as_str().expect("id").to_string();

    // While the handle is running, steering is accepted.
    let delivered = manager
        .execute(
            "send_input",
            json!({"agent_id": agent_id, "message": "focus"}),
            &profile,
            &config,
        )
        .await;
    // The child may have already finished its (single-response) task, in
    // which case delivery is refused; both are valid sequences here, but
    // the error must name the state.
    if let Err(err) = delivered {
        assert!(err.to_string().contains("cannot accept input"));
    }

    // After wait, the agent is definitely not running.
    manager
        .execute("wait", json!({"agent_id": agent_id}), &profile, &config)
        .await
        .expect("wait");
    let refused = manager
        .execute(
            "send_input",
            json!({"agent_id": agent_id, "message": "late"}),
            &profile,
            &config,
        )
        .await
        .expect_err("not running");
    assert!(refused.to_string().contains("cannot accept input"));
}

#[tokio::test]
async fn close_agent_acknowledges_and_aborts() {
    let client = Arc::new(ScriptedClient::new(vec![text_response("slowish")]));
    let (_dir, mut manager) = manager_at_depth(client, 0, 1);
    let profile = parent_profile();
    let config = SessionConfig::default();

    let spawned = parse(
        &manager
            .execute("spawn_agent", json!({"task": "t"}), &profile, &config)
            .await
            .expect("spawn"),
    );
    let agent_id = spawned["agent_id"].as_str().expect("id").to_string();

    let closed = parse(
        &manager
            .execute("close_agent", json!({"agent_id": agent_id}), &profile, &config)
            .await
            .expect("close"),
    );
    assert_eq!(closed["closed"], true);
    assert_eq!(closed["status"], "completed");
}

#[tokio::test]
async fn spawn_requires_a_task() {
    let client = Arc::new(ScriptedClient::new(vec![text_response("x")]));
    let (_dir, mut manager) = manager_at_depth(client, 0, 1);
    let profile = parent_profile();
    let config = SessionConfig::default();

    let err = manager
        .execute("spawn_agent", json!({}), &profile, &config)
        .await
        .expect_err("missing task");
    assert!(err.to_string().contains("task"));
}

#[tokio::test]
async fn subagent_tools_registered_only_when_depth_allows() {
    // Depth headroom: the profile advertises the four tools.
    let dir = tempfile::tempdir().expect("tempdir");
    let env = Arc::new(LocalEnvironment::new(dir.path()));
    let client = Arc::new(ScriptedClient::new(vec![text_response("x")]));

    let (session, _rx) = orrery_agent::Session::new(
        Box::new(parent_profile()),
        Arc::clone(&env) as Arc<dyn orrery_agent::ExecutionEnvironment>,
        Arc::clone(&client) as Arc<dyn orrery_agent::ModelClient>,
        SessionConfig::default(),
    );
    drop(session);

    let mut profile = parent_profile();
    profile.register_subagent_tools();
    let names = profile.tool_registry().names();
    for tool in ["spawn_agent", "send_input", "wait", "close_agent"] {
        assert!(names.contains(&tool));
    }
}
