//! Instruction-file discovery and the 32 KiB budget.

use orrery_agent::project_docs::{MAX_PROJECT_DOCS_BYTES, discover_project_docs};
use orrery_agent::{ExecutionEnvironment, LocalEnvironment};

fn env_in(dir: &tempfile::TempDir) -> LocalEnvironment {
    LocalEnvironment::new(dir.path())
}

#[tokio::test]
async fn loads_provider_specific_files_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);
    env.write_file("AGENTS.md", "universal rules").await.expect("write");
    env.write_file("CLAUDE.md", "anthropic rules").await.expect("write");
    env.write_file("GEMINI.md", "gemini rules").await.expect("write");

    let docs = discover_project_docs(&env, "anthropic").await.expect("docs");
    assert_eq!(docs, "universal rules\n\nanthropic rules");

    let gemini = discover_project_docs(&env, "gemini").await.expect("docs");
    assert!(gemini.contains("gemini rules"));
    assert!(!gemini.contains("anthropic rules"));

    let unknown = discover_project_docs(&env, "other").await.expect("docs");
    assert_eq!(unknown, "universal rules");
}

#[tokio::test]
async fn missing_files_are_skipped_silently() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);
    let docs = discover_project_docs(&env, "anthropic").await.expect("docs");
    assert!(docs.is_empty());
}

#[tokio::test]
async fn oversized_docs_are_cut_at_the_budget_with_a_marker() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);
    env.write_file("AGENTS.md", &"a".repeat(MAX_PROJECT_DOCS_BYTES + 500))
        .await
        .expect("write");

    let docs = discover_project_docs(&env, "anthropic").await.expect("docs");
    assert!(docs.contains("truncated at 32KB"));
    // The kept prefix never exceeds the budget.
    let body = docs.split('\n').next().expect("prefix");
    assert!(body.len() <= MAX_PROJECT_DOCS_BYTES);
}

#[tokio::test]
async fn exactly_at_budget_gets_no_marker() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);
    env.write_file("AGENTS.md", &"a".repeat(MAX_PROJECT_DOCS_BYTES))
        .await
        .expect("write");

    let docs = discover_project_docs(&env, "anthropic").await.expect("docs");
    assert_eq!(docs.len(), MAX_PROJECT_DOCS_BYTES);
    assert!(!docs.contains("truncated"));
}

#[tokio::test]
async fn second_file_beyond_budget_appends_remaining_prefix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);
    env.write_file("AGENTS.md", &"a".repeat(MAX_PROJECT_DOCS_BYTES - 100))
        .await
        .expect("write");
    env.write_file("CLAUDE.md", &"b".repeat(500)).await.expect("write");

    let docs = discover_project_docs(&env, "anthropic").await.expect("docs");
    assert!(docs.contains("truncated at 32KB"));
    // Some of the second file made it in before the cut.
    assert!(docs.contains('b'));
}
