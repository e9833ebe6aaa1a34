//! Tool handler: shell commands declared on the node.

use std::path::Path;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::PipelineResult;
use crate::graph::{AttrValue, Graph, Node};
use crate::handler::Handler;
use crate::types::{Outcome, AttrDuration};

/// Runs the node's `tool_command` via `sh -c`, with an optional
/// `timeout` attribute.
#[derive(Debug, Clone, Copy)]
pub struct ToolHandler;

#[async_trait]
impl Handler for ToolHandler {
    async fn handle(
        &self,
        node: &Node,
        _context: &Context,
        _graph: &Graph,
        _logs_root: &Path,
    ) -> PipelineResult<Outcome> {
        let Some(command) = node.get_str("tool_command") else {
            return Ok(Outcome::fail(format!(
                "node '{}' is a tool node but has no 'tool_command' attribute",
                node.id
            )));
        };

        let timeout = node
            .get_attr("timeout")
            .and_then(AttrValue::as_duration_attr)
            .map(AttrDuration::as_duration);

        match run_command(command, timeout).await {
            Ok(output) if output.success => Ok(Outcome::success()
                .with_update("tool.output", serde_json::Value::String(output.stdout))),
            Ok(output) => Ok(Outcome::fail(format!(
                "command exited nonzero: {}",
                output.stderr
            ))),
            Err(error) => Ok(Outcome::fail(format!("command execution failed: {error}"))),
        }
    }
}

struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Run a shell command, draining stdout/stderr concurrently with the wait
/// so a full pipe buffer can never deadlock the child.
async fn run_command(
    command: &str,
    timeout: Option<std::time::Duration>,
) -> PipelineResult<CommandOutput> {
    let mut child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()?;

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let collect = async {
        let (status, stdout, stderr) =
            tokio::join!(child.wait(), read_pipe(stdout_pipe), read_pipe(stderr_pipe));
        let status = status?;
        Ok(CommandOutput {
            success: status.success(),
            stdout,
            stderr,
        })
    };

    match timeout {
        Some(duration) => match tokio::time::timeout(duration, collect).await {
            Ok(result) => result,
            Err(_elapsed) => {
                let _ = child.kill().await;
                Ok(CommandOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: format!("command timed out after {duration:?}"),
                })
            }
        },
        None => collect.await,
    }
}

async fn read_pipe<R: tokio::io::AsyncRead + Unpin>(pipe: Option<R>) -> String {
    use tokio::io::AsyncReadExt;
    let Some(mut reader) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).to_string()
}
