//! Generation service backed by the Claude CLI.

use async_trait::async_trait;
use conveyor_common::{Generator, ToolError, ToolResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::stream::StreamSummary;
use crate::tools::process::display_command;

pub struct ClaudeCli {
    cmd: String,
    /// Flags for prompt-only calls
    generate_flags: Vec<String>,
    /// Flags for calls with file-system access
    implement_flags: Vec<String>,
    /// Working directory for prompt-only calls
    default_dir: PathBuf,
}

impl ClaudeCli {
    pub fn new(config: &Config) -> Self {
        Self {
            cmd: config.claude_cmd.clone(),
            generate_flags: config.claude_flags(config.generate_model.as_deref()),
            implement_flags: config.claude_flags(None),
            default_dir: config.project_dir.clone(),
        }
    }

    async fn invoke(
        &self,
        flags: &[String],
        prompt: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> ToolResult<String> {
        let args: Vec<&str> = flags.iter().map(String::as_str).collect();
        let command = display_command(&self.cmd, &args);
        info!(
            cwd = %cwd.display(),
            prompt_chars = prompt.len(),
            timeout_secs = timeout.as_secs(),
            "invoking claude"
        );

        let mut child = Command::new(&self.cmd)
            .args(&args)
            .current_dir(cwd)
            .env_remove("CLAUDECODE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| ToolError::UnexpectedOutput {
            command: command.clone(),
            message: "stdout was not captured".to_string(),
        })?;
        let stderr = child.stderr.take();

        // The stream is consumed on a background task so the child never
        // blocks on a full pipe while the main flow waits for it to exit.
        let reader = tokio::spawn(async move {
            let mut summary = StreamSummary::default();
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                summary.observe(&line);
            }
            summary
        });
        let stderr_reader = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf).await;
            }
            buf
        });

        // The prompt is fed from its own task so a child that stops reading
        // cannot hold the call past its timeout.
        let stdin = child.stdin.take();
        let input = prompt.to_string();
        let writer = tokio::spawn(async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(input.as_bytes()).await,
                None => Ok(()),
            }
        });

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status.map_err(|e| ToolError::UnexpectedOutput {
                command: command.clone(),
                message: format!("failed to wait for exit: {e}"),
            })?,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "claude timed out; killing");
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "failed to kill timed-out claude process");
                }
                writer.abort();
                reader.abort();
                stderr_reader.abort();
                return Err(ToolError::Timeout { command, timeout });
            }
        };
        let delivered = match writer.await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::other(e)),
        };

        let summary = reader.await.unwrap_or_default();
        let stderr = stderr_reader.await.unwrap_or_default();

        if !status.success() {
            if let Err(e) = &delivered {
                debug!(error = %e, "prompt not fully written before exit");
            }
            return Err(ToolError::Failed {
                command,
                code: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }
        if let Err(e) = delivered {
            return Err(ToolError::UnexpectedOutput {
                command,
                message: format!("exited before reading the whole prompt: {e}"),
            });
        }
        if summary.is_error {
            return Err(ToolError::UnexpectedOutput {
                command,
                message: summary.into_text(),
            });
        }
        Ok(summary.into_text())
    }
}

#[async_trait]
impl Generator for ClaudeCli {
    async fn generate(&self, prompt: &str, timeout: Duration) -> ToolResult<String> {
        self.invoke(&self.generate_flags, prompt, &self.default_dir, timeout)
            .await
    }

    async fn implement(
        &self,
        prompt: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> ToolResult<String> {
        self.invoke(&self.implement_flags, prompt, working_dir, timeout)
            .await
    }
}
