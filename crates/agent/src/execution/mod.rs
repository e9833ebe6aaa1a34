//! Execution environment abstraction.
//!
//! Every tool side effect flows through [`ExecutionEnvironment`], so tool
//! logic is independent of where it runs. [`LocalEnvironment`] executes on
//! the local filesystem and shell; container or remote implementations
//! plug in behind the same trait.

mod local;

pub use local::LocalEnvironment;

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;

use crate::error::AgentResult;
use crate::types::{DirEntry, ExecResult, GrepOptions};

/// How child processes inherit the parent's environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvPolicy {
    /// Pass everything through unfiltered.
    InheritAll,
    /// Start clean; only the core allowlist survives.
    InheritNone,
    /// The allowlist always passes; names with sensitive suffixes are
    /// dropped; everything else is inherited.
    #[default]
    InheritCore,
}

/// Name suffixes treated as secrets (case-insensitive).
const SENSITIVE_SUFFIXES: &[&str] = &["_API_KEY", "_SECRET", "_TOKEN", "_PASSWORD", "_CREDENTIAL"];

/// Variables that always survive filtering. Deliberately data, not
/// platform logic, so ports can extend it.
static CORE_ALLOWLIST: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    vec![
        "PATH", "HOME", "USER", "SHELL", "LANG", "LC_ALL", "TERM", "TMPDIR", "EDITOR",
        "CARGO_HOME", "GOPATH", "NVM_DIR",
    ]
});

/// Apply an [`EnvPolicy`] to an iterator of variables.
///
/// Takes the variables as input rather than reading `std::env` directly
/// so tests can pass controlled data.
#[must_use]
pub fn filter_env_vars(
    vars: impl Iterator<Item = (String, String)>,
    policy: EnvPolicy,
) -> HashMap<String, String> {
    match policy {
        EnvPolicy::InheritAll => vars.collect(),
        EnvPolicy::InheritNone => vars
            .filter(|(name, _)| CORE_ALLOWLIST.contains(&name.as_str()))
            .collect(),
        EnvPolicy::InheritCore => vars
            .filter(|(name, _)| {
                if CORE_ALLOWLIST.contains(&name.as_str()) {
                    return true;
                }
                let upper = name.to_uppercase();
                !SENSITIVE_SUFFIXES
                    .iter()
                    .any(|suffix| upper.ends_with(suffix))
            })
            .collect(),
    }
}

/// Where tool operations run.
///
/// All paths resolve against the working directory; relative paths land
/// underneath it.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    /// Read a file. With `offset`/`limit`, returns the slice of lines
    /// `[offset-1, offset-1+limit)` joined by `\n` (limit defaults to
    /// 2000). A missing file fails.
    async fn read_file(
        &self,
        path: &str,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> AgentResult<String>;

    /// Write UTF-8 content, creating parent directories as needed.
    async fn write_file(&self, path: &str, content: &str) -> AgentResult<()>;

    async fn file_exists(&self, path: &str) -> bool;

    /// List entries. Depth 1 lists immediate children; deeper entries get
    /// `parent/`-prefixed names; depth ≤ 0 yields nothing. Stat failures
    /// report `size: None`.
    async fn list_directory(&self, path: &str, depth: i32) -> AgentResult<Vec<DirEntry>>;

    /// Run a command via the system shell in its own process group.
    ///
    /// `timeout_ms <= 0` uses the environment's default; all timeouts are
    /// capped at the environment's maximum. On timeout the group gets a
    /// soft termination signal, a 2 s grace period, then a hard kill.
    /// Never errors; spawn failures come back as an [`ExecResult`].
    async fn exec_command(
        &self,
        command: &str,
        timeout_ms: i64,
        working_dir: Option<&str>,
        env_vars: Option<&HashMap<String, String>>,
    ) -> ExecResult;

    /// Regex search. Returns a text blob of `path:line:text` matches, or
    /// `"No matches found."`.
    async fn grep(&self, pattern: &str, path: &str, options: &GrepOptions) -> AgentResult<String>;

    /// Glob matching under `base_path` (default: working directory).
    /// Absolute paths, newest mtime first.
    async fn glob(&self, pattern: &str, base_path: Option<&str>) -> AgentResult<Vec<String>>;

    /// Fails when the working directory does not exist.
    async fn initialize(&self) -> AgentResult<()>;

    /// Idempotent.
    async fn cleanup(&self) -> AgentResult<()> {
        Ok(())
    }

    fn working_directory(&self) -> &str;

    /// `linux`, `darwin`, or `windows`.
    fn platform(&self) -> &str;

    fn os_version(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Iterator<Item = (String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn inherit_core_drops_sensitive_suffixes() {
        let filtered = filter_env_vars(
            vars(&[
                ("PATH", "/bin"),
                ("OPENAI_API_KEY", "sk-1"),
                ("DB_PASSWORD", "pw"),
                ("MY_Token", "t"),
                ("COLORTERM", "truecolor"),
            ]),
            EnvPolicy::InheritCore,
        );
        assert!(filtered.contains_key("PATH"));
        assert!(filtered.contains_key("COLORTERM"));
        assert!(!filtered.contains_key("OPENAI_API_KEY"));
        assert!(!filtered.contains_key("DB_PASSWORD"));
        assert!(!filtered.contains_key("MY_Token"));
    }

    #[test]
    fn inherit_none_keeps_only_allowlist() {
        let filtered = filter_env_vars(
            vars(&[("PATH", "/bin"), ("COLORTERM", "truecolor")]),
            EnvPolicy::InheritNone,
        );
        assert!(filtered.contains_key("PATH"));
        assert!(!filtered.contains_key("COLORTERM"));
    }

    #[test]
    fn inherit_all_is_unfiltered() {
        let filtered = filter_env_vars(
            vars(&[("OPENAI_API_KEY", "sk-1")]),
            EnvPolicy::InheritAll,
        );
        assert!(filtered.contains_key("OPENAI_API_KEY"));
    }
}
