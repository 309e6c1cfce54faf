//! Subprocess execution with a hard timeout.

use conveyor_common::{ToolError, ToolResult};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// stdout and stderr together, for messages that may land on either.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.clone(),
            _ => self.stderr.clone(),
        }
    }
}

/// Printable form of a command line.
pub fn display_command(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().map(|a| {
        if a.contains(char::is_whitespace) {
            format!("{a:?}")
        } else {
            a.to_string()
        }
    }));
    parts.join(" ")
}

/// Run `program args` in `cwd`, returning its output whatever the exit code.
///
/// The child is killed if `timeout` elapses, including while `stdin` is
/// still being written. Only spawn failures and timeouts are errors here;
/// callers decide what a non-zero exit means.
pub async fn run(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
    stdin: Option<&str>,
) -> ToolResult<CommandOutput> {
    let command = display_command(program, args);
    debug!(command = %command, cwd = %cwd.display(), "running");

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ToolError::Spawn {
            command: command.clone(),
            source,
        })?;

    let writer = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_string();
            Some(tokio::spawn(async move { pipe.write_all(input.as_bytes()).await }))
        }
        _ => None,
    };

    // Dropping the wait future on timeout kills the child (kill_on_drop).
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| ToolError::UnexpectedOutput {
            command: command.clone(),
            message: format!("failed to collect output: {e}"),
        })?,
        Err(_) => {
            if let Some(writer) = writer {
                writer.abort();
            }
            return Err(ToolError::Timeout { command, timeout });
        }
    };
    if let Some(writer) = writer {
        if let Ok(Err(e)) = writer.await {
            debug!(command = %command, error = %e, "stdin not fully written before exit");
        }
    }

    Ok(CommandOutput {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Like [`run`], but a non-zero exit is a [`ToolError::Failed`].
pub async fn run_checked(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> ToolResult<CommandOutput> {
    let output = run(program, args, cwd, timeout, None).await?;
    if !output.success() {
        return Err(ToolError::Failed {
            command: display_command(program, args),
            code: output.code,
            stderr: output.combined().trim().to_string(),
        });
    }
    Ok(output)
}
