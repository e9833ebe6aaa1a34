//! Local execution environment: the filesystem and shell of the current
//! machine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use super::{EnvPolicy, ExecutionEnvironment, filter_env_vars};
use crate::error::{AgentError, AgentResult};
use crate::types::{DirEntry, ExecResult, GrepOptions};

/// Runs tool operations locally.
pub struct LocalEnvironment {
    working_dir: PathBuf,
    env_policy: EnvPolicy,
    default_timeout_ms: u64,
    max_timeout_ms: u64,
}

impl std::fmt::Debug for LocalEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEnvironment")
            .field("working_dir", &self.working_dir)
            .field("env_policy", &self.env_policy)
            .finish_non_exhaustive()
    }
}

impl LocalEnvironment {
    /// An environment rooted at `working_dir` with default timeouts
    /// (10 s default, 10 min cap) and the core env policy.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            env_policy: EnvPolicy::default(),
            default_timeout_ms: 10_000,
            max_timeout_ms: 600_000,
        }
    }

    #[must_use]
    pub fn with_env_policy(mut self, policy: EnvPolicy) -> Self {
        self.env_policy = policy;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, default_ms: u64, max_ms: u64) -> Self {
        self.default_timeout_ms = default_ms;
        self.max_timeout_ms = max_ms;
        self
    }

    /// Resolve a possibly-relative path against the working directory.
    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.working_dir.join(p)
        }
    }

    /// Resolve a requested timeout: non-positive means the default, and
    /// everything is capped at the maximum.
    fn effective_timeout_ms(&self, requested: i64) -> u64 {
        let requested = if requested <= 0 {
            self.default_timeout_ms
        } else {
            requested as u64
        };
        requested.min(self.max_timeout_ms)
    }
}

#[async_trait]
impl ExecutionEnvironment for LocalEnvironment {
    async fn read_file(
        &self,
        path: &str,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> AgentResult<String> {
        let resolved = self.resolve(path);
        let raw = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| AgentError::from_io(e, &resolved))?;

        if offset.is_none() && limit.is_none() {
            return Ok(raw);
        }

        let start = offset.unwrap_or(1).saturating_sub(1);
        let max_lines = limit.unwrap_or(2000);
        let sliced = raw
            .lines()
            .skip(start)
            .take(max_lines)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(sliced)
    }

    async fn write_file(&self, path: &str, content: &str) -> AgentResult<()> {
        let resolved = self.resolve(path);
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AgentError::from_io(e, parent))?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| AgentError::from_io(e, &resolved))
    }

    async fn file_exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(self.resolve(path)).await.unwrap_or(false)
    }

    async fn list_directory(&self, path: &str, depth: i32) -> AgentResult<Vec<DirEntry>> {
        if depth <= 0 {
            return Ok(Vec::new());
        }
        let resolved = self.resolve(path);
        let base = resolved.clone();
        let depth = depth as usize;

        // The walker is synchronous; run it off the async threads.
        let entries = tokio::task::spawn_blocking(move || walk_directory(&base, depth))
            .await
            .map_err(|e| AgentError::Io {
                message: format!("list_directory task failed: {e}"),
            })?
            .map_err(|e| AgentError::from_io(e, &resolved))?;
        Ok(entries)
    }

    async fn exec_command(
        &self,
        command: &str,
        timeout_ms: i64,
        working_dir: Option<&str>,
        env_vars: Option<&HashMap<String, String>>,
    ) -> ExecResult {
        let cwd = working_dir
            .map(|dir| self.resolve(dir))
            .unwrap_or_else(|| self.working_dir.clone());
        let timeout_ms = self.effective_timeout_ms(timeout_ms);
        let filtered = filter_env_vars(std::env::vars(), self.env_policy);

        #[cfg(unix)]
        let mut cmd = {
            let mut c = tokio::process::Command::new("/bin/sh");
            c.arg("-c").arg(command);
            c
        };
        #[cfg(windows)]
        let mut cmd = {
            let mut c = tokio::process::Command::new("cmd.exe");
            c.arg("/C").arg(command);
            c
        };

        cmd.current_dir(&cwd);
        cmd.env_clear();
        for (key, value) in &filtered {
            cmd.env(key, value);
        }
        // Caller-supplied variables land after filtering and always win.
        if let Some(extra) = env_vars {
            for (key, value) in extra {
                cmd.env(key, value);
            }
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        // Own process group so timeouts can kill grandchildren too.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd.kill_on_drop(true);

        let start = std::time::Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                return ExecResult {
                    stdout: String::new(),
                    stderr: format!("failed to spawn command: {err}"),
                    exit_code: -1,
                    timed_out: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
        };
        let child_pid = child.id();

        // Drain pipes on their own tasks so a full pipe buffer never
        // deadlocks the wait, and partial output survives a timeout.
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(ref mut pipe) = stdout_pipe {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(ref mut pipe) = stderr_pipe {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });

        let timeout = std::time::Duration::from_millis(timeout_ms);
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let stdout = stdout_task.await.unwrap_or_default();
                let stderr = stderr_task.await.unwrap_or_default();
                return ExecResult {
                    stdout,
                    stderr,
                    exit_code: status.code().unwrap_or(-1),
                    timed_out: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
            Ok(Err(err)) => {
                let stdout = stdout_task.await.unwrap_or_default();
                let mut stderr = stderr_task.await.unwrap_or_default();
                stderr.push_str(&format!("\nerror waiting for process: {err}"));
                return ExecResult {
                    stdout,
                    stderr,
                    exit_code: -1,
                    timed_out: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
            Err(_elapsed) => {}
        }

        // Timeout: soft-terminate the group, wait 2 s, hard-kill. The wait
        // below reaps exactly once regardless of which signal landed.
        #[cfg(unix)]
        if let Some(pid) = child_pid {
            signal_process_group(pid, libc::SIGTERM);
        }
        #[cfg(not(unix))]
        let _ = child.start_kill();

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        #[cfg(unix)]
        if let Some(pid) = child_pid {
            signal_process_group(pid, libc::SIGKILL);
        }
        #[cfg(not(unix))]
        let _ = child.start_kill();

        let _ = child.wait().await;

        let stdout = stdout_task.await.unwrap_or_default();
        let mut stderr = stderr_task.await.unwrap_or_default();
        stderr.push_str(&format!(
            "\n[Command timed out after {timeout_ms}ms. Partial output is shown above.]"
        ));

        ExecResult {
            stdout,
            stderr,
            exit_code: -1,
            timed_out: true,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn grep(&self, pattern: &str, path: &str, options: &GrepOptions) -> AgentResult<String> {
        let resolved = self.resolve(path);
        let re = regex::RegexBuilder::new(pattern)
            .case_insensitive(options.case_insensitive)
            .build()
            .map_err(|e| AgentError::ValidationError {
                reason: e.to_string(),
            })?;

        let glob_filter = match &options.glob_filter {
            Some(filter) => Some(glob::Pattern::new(filter).map_err(|e| {
                AgentError::ValidationError {
                    reason: format!("invalid glob_filter: {e}"),
                }
            })?),
            None => None,
        };

        let max = options.max_results as usize;
        let base = resolved.clone();
        let matches = tokio::task::spawn_blocking(move || {
            grep_under(&base, &re, glob_filter.as_ref(), max)
        })
        .await
        .map_err(|e| AgentError::Io {
            message: format!("grep task failed: {e}"),
        })?
        .map_err(|e| AgentError::from_io(e, &resolved))?;

        if matches.is_empty() {
            Ok("No matches found.".into())
        } else {
            Ok(matches.join("\n"))
        }
    }

    async fn glob(&self, pattern: &str, base_path: Option<&str>) -> AgentResult<Vec<String>> {
        let base = base_path
            .map(|p| self.resolve(p))
            .unwrap_or_else(|| self.working_dir.clone());
        if !base.exists() {
            return Err(AgentError::FileNotFound {
                path: base.display().to_string(),
            });
        }

        let full_pattern = base.join(pattern).to_string_lossy().to_string();
        let paths = tokio::task::spawn_blocking(move || -> AgentResult<Vec<String>> {
            let entries = glob::glob(&full_pattern).map_err(|e| AgentError::ValidationError {
                reason: e.to_string(),
            })?;

            let mut with_mtime: Vec<(String, std::time::SystemTime)> = Vec::new();
            for entry in entries.flatten() {
                let mtime = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                with_mtime.push((entry.to_string_lossy().to_string(), mtime));
            }
            // Newest first.
            with_mtime.sort_by(|a, b| b.1.cmp(&a.1));
            Ok(with_mtime.into_iter().map(|(path, _)| path).collect())
        })
        .await
        .map_err(|e| AgentError::Io {
            message: format!("glob task failed: {e}"),
        })??;

        Ok(paths)
    }

    async fn initialize(&self) -> AgentResult<()> {
        if !self.working_dir.is_dir() {
            return Err(AgentError::FileNotFound {
                path: self.working_dir.display().to_string(),
            });
        }
        Ok(())
    }

    fn working_directory(&self) -> &str {
        self.working_dir.to_str().unwrap_or(".")
    }

    fn platform(&self) -> &str {
        match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        }
    }

    fn os_version(&self) -> String {
        format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
    }
}

/// Walk a directory to `depth`, producing `parent/`-prefixed names for
/// nested entries. `ignore`'s walker handles symlink cycles.
fn walk_directory(base: &Path, depth: usize) -> Result<Vec<DirEntry>, std::io::Error> {
    if !base.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("path not found: {}", base.display()),
        ));
    }
    if !base.is_dir() {
        return Err(std::io::Error::other(format!(
            "not a directory: {}",
            base.display()
        )));
    }

    let walker = ignore::WalkBuilder::new(base)
        .standard_filters(false)
        .max_depth(Some(depth))
        .build();

    let mut entries = Vec::new();
    for entry in walker {
        let Ok(entry) = entry else {
            continue; // unreadable subtree
        };
        if entry.path() == base {
            continue;
        }

        let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
        let name = entry
            .path()
            .strip_prefix(base)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();
        let size = if is_dir {
            None
        } else {
            entry.metadata().ok().map(|m| m.len())
        };
        entries.push(DirEntry { name, is_dir, size });
    }
    Ok(entries)
}

/// Collect up to `max` `path:line:text` matches under `base`.
fn grep_under(
    base: &Path,
    re: &regex::Regex,
    glob_filter: Option<&glob::Pattern>,
    max: usize,
) -> Result<Vec<String>, std::io::Error> {
    if !base.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("path not found: {}", base.display()),
        ));
    }

    let mut results = Vec::new();

    if base.is_file() {
        // Explicitly-named file: the glob filter does not apply.
        grep_file(base, base.parent().unwrap_or(base), re, max, &mut results);
        return Ok(results);
    }

    let walker = ignore::WalkBuilder::new(base)
        .standard_filters(false)
        .build();
    for entry in walker {
        if results.len() >= max {
            break;
        }
        let Ok(entry) = entry else { continue };
        if entry.file_type().is_none_or(|ft| ft.is_dir()) {
            continue;
        }
        let path = entry.path();
        if let Some(pattern) = glob_filter {
            let relative = path.strip_prefix(base).unwrap_or(path).to_string_lossy();
            if !pattern.matches(&relative) {
                continue;
            }
        }
        grep_file(path, base, re, max, &mut results);
    }
    Ok(results)
}

fn grep_file(path: &Path, root: &Path, re: &regex::Regex, max: usize, results: &mut Vec<String>) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return; // binary or unreadable
    };
    let relative = path.strip_prefix(root).unwrap_or(path).to_string_lossy();
    for (i, line) in content.lines().enumerate() {
        if results.len() >= max {
            return;
        }
        if re.is_match(line) {
            results.push(format!("{relative}:{}:{line}", i + 1));
        }
    }
}

/// Signal every process in the child's group.
///
/// The only unsafe code in the crate. Sound because `pid` comes from a
/// just-spawned `tokio::process::Child` and `kill(-pid, sig)` targets the
/// group per POSIX `kill(2)`.
#[cfg(unix)]
#[allow(unsafe_code)]
fn signal_process_group(pid: u32, signal: i32) {
    // SAFETY: negating a valid child PID addresses its process group;
    // kill(2) with a signal constant has no memory-safety preconditions.
    unsafe {
        libc::kill(-(pid as i32), signal);
    }
}
