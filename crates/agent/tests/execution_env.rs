//! The local execution environment: files, listings, commands, search.

use orrery_agent::{ExecutionEnvironment, GrepOptions, LocalEnvironment};

fn env_in(dir: &tempfile::TempDir) -> LocalEnvironment {
    LocalEnvironment::new(dir.path())
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);

    env.write_file("notes/todo.txt", "alpha\nbeta\ngamma")
        .await
        .expect("write creates parents");
    let content = env.read_file("notes/todo.txt", None, None).await.expect("read");
    assert_eq!(content, "alpha\nbeta\ngamma");
    assert!(env.file_exists("notes/todo.txt").await);
}

#[tokio::test]
async fn read_slices_lines_with_offset_and_limit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);
    let body = (1..=10).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
    env.write_file("big.txt", &body).await.expect("write");

    let slice = env
        .read_file("big.txt", Some(3), Some(2))
        .await
        .expect("read slice");
    assert_eq!(slice, "line3\nline4");

    // Limit defaults to 2000 when only the offset is given.
    let tail = env.read_file("big.txt", Some(9), None).await.expect("read tail");
    assert_eq!(tail, "line9\nline10");
}

#[tokio::test]
async fn read_missing_file_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);
    assert!(env.read_file("ghost.txt", None, None).await.is_err());
    assert!(!env.file_exists("ghost.txt").await);
}

#[tokio::test]
async fn list_directory_depths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);
    env.write_file("top.txt", "x").await.expect("write");
    env.write_file("sub/inner.txt", "y").await.expect("write");

    let shallow = env.list_directory(".", 1).await.expect("depth 1");
    let names: Vec<&str> = shallow.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"top.txt"));
    assert!(names.contains(&"sub"));
    assert!(!names.iter().any(|n| n.contains("inner")));

    let deep = env.list_directory(".", 2).await.expect("depth 2");
    assert!(
        deep.iter()
            .any(|e| e.name == "sub/inner.txt" && !e.is_dir && e.size == Some(1)),
        "nested entries carry parent-prefixed names"
    );

    assert!(env.list_directory(".", 0).await.expect("depth 0").is_empty());
    assert!(env.list_directory(".", -1).await.expect("negative").is_empty());
}

#[tokio::test]
async fn exec_command_captures_output_and_exit_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);

    let result = env.exec_command("echo hello && exit 3", 5_000, None, None).await;
    assert_eq!(result.stdout.trim(), "hello");
    assert_eq!(result.exit_code, 3);
    assert!(!result.timed_out);
}

#[tokio::test]
async fn exec_command_timeout_terminates_and_reports() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = LocalEnvironment::new(dir.path()).with_timeouts(200, 600_000);

    // timeout_ms <= 0 resolves to the environment default (200ms here).
    let result = env.exec_command("sleep 30", 0, None, None).await;
    assert!(result.timed_out);
    assert_eq!(result.exit_code, -1);
    assert!(result.stderr.contains("timed out"));
    // The grace period is 2s; the command must not run to completion.
    assert!(result.duration_ms < 10_000);
}

#[tokio::test]
async fn exec_command_spawn_failure_is_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);

    // A missing working directory cannot be spawned into.
    let result = env
        .exec_command("echo hi", 1_000, Some("does/not/exist"), None)
        .await;
    assert_eq!(result.exit_code, -1);
    assert!(!result.stderr.is_empty());
}

#[tokio::test]
async fn exec_command_merges_caller_env_vars() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);

    let mut extra = std::collections::HashMap::new();
    extra.insert("ORRERY_TEST_VALUE".to_string(), "42".to_string());
    let result = env
        .exec_command("echo $ORRERY_TEST_VALUE", 5_000, None, Some(&extra))
        .await;
    assert_eq!(result.stdout.trim(), "42");
}

#[tokio::test]
async fn grep_reports_matches_and_misses() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);
    env.write_file("a.rs", "fn main() {}\nstruct Foo;").await.expect("write");
    env.write_file("b.txt", "nothing here").await.expect("write");

    let hits = env
        .grep("struct", ".", &GrepOptions::default())
        .await
        .expect("grep");
    assert!(hits.contains("a.rs:2:struct Foo;"));

    let misses = env
        .grep("zebra", ".", &GrepOptions::default())
        .await
        .expect("grep");
    assert!(misses.contains("No matches"));
}

#[tokio::test]
async fn grep_honours_case_and_glob_filters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);
    env.write_file("x.rs", "STRUCT here").await.expect("write");
    env.write_file("y.md", "STRUCT there").await.expect("write");

    let options = GrepOptions {
        case_insensitive: true,
        glob_filter: Some("*.rs".into()),
        ..GrepOptions::default()
    };
    let hits = env.grep("struct", ".", &options).await.expect("grep");
    assert!(hits.contains("x.rs"));
    assert!(!hits.contains("y.md"));
}

#[tokio::test]
async fn glob_returns_absolute_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);
    env.write_file("one.rs", "1").await.expect("write");
    env.write_file("two.rs", "2").await.expect("write");
    env.write_file("three.txt", "3").await.expect("write");

    let matches = env.glob("*.rs", None).await.expect("glob");
    assert_eq!(matches.len(), 2);
    for path in &matches {
        assert!(std::path::Path::new(path).is_absolute());
        assert!(path.ends_with(".rs"));
    }
}

#[tokio::test]
async fn initialize_requires_the_working_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = env_in(&dir);
    env.initialize().await.expect("exists");
    env.cleanup().await.expect("idempotent");
    env.cleanup().await.expect("still idempotent");

    let missing = LocalEnvironment::new(dir.path().join("nope"));
    assert!(missing.initialize().await.is_err());
}
