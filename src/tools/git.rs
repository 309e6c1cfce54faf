//! Version control against the project working directory.
//!
//! Mutating operations shell out to `git` so hooks, credentials and remotes
//! behave exactly as they do for a developer. Read-only queries go through
//! `git2`.

use async_trait::async_trait;
use conveyor_common::{ToolError, ToolResult, VersionControl};
use git2::{Repository, Status, StatusOptions};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::tools::process::{self, display_command};

pub struct GitCli {
    dir: PathBuf,
    timeout: Duration,
    remote: String,
}

impl GitCli {
    pub fn new(dir: PathBuf, timeout: Duration) -> Self {
        Self {
            dir,
            timeout,
            remote: "origin".to_string(),
        }
    }

    async fn git(&self, args: &[&str]) -> ToolResult<String> {
        let output = process::run_checked("git", args, &self.dir, self.timeout).await?;
        Ok(output.stdout.trim().to_string())
    }

    fn open(&self, op: &str) -> ToolResult<Repository> {
        Repository::open(&self.dir).map_err(|e| libgit2_error(op, e))
    }
}

fn libgit2_error(op: &str, e: git2::Error) -> ToolError {
    ToolError::UnexpectedOutput {
        command: format!("libgit2 {op}"),
        message: e.message().to_string(),
    }
}

/// A failed merge whose output mentions a conflict.
fn is_conflict_output(stdout: &str, stderr: &str) -> bool {
    stdout.to_lowercase().contains("conflict") || stderr.to_lowercase().contains("merge conflict")
}

#[async_trait]
impl VersionControl for GitCli {
    async fn init(&self, default_branch: &str) -> ToolResult<()> {
        self.git(&["init"]).await?;
        self.git(&["branch", "-M", default_branch]).await.map(|_| ())
    }

    async fn checkout(&self, branch: &str, create: bool) -> ToolResult<()> {
        if create {
            self.git(&["checkout", "-b", branch]).await?;
        } else {
            self.git(&["checkout", branch]).await?;
        }
        Ok(())
    }

    async fn pull(&self, branch: &str) -> ToolResult<()> {
        self.git(&["pull", &self.remote, branch]).await.map(|_| ())
    }

    async fn add_all(&self) -> ToolResult<()> {
        self.git(&["add", "-A"]).await.map(|_| ())
    }

    async fn commit(&self, message: &str) -> ToolResult<()> {
        self.git(&["commit", "-m", message]).await.map(|_| ())
    }

    async fn push(&self, branch: &str, set_upstream: bool) -> ToolResult<()> {
        if set_upstream {
            self.git(&["push", "-u", &self.remote, branch]).await?;
        } else {
            self.git(&["push", &self.remote, branch]).await?;
        }
        Ok(())
    }

    async fn merge(&self, branch: &str) -> ToolResult<()> {
        let args = ["merge", "--no-edit", branch];
        let output = process::run("git", &args, &self.dir, self.timeout, None).await?;
        if output.success() {
            return Ok(());
        }
        let command = display_command("git", &args);
        if is_conflict_output(&output.stdout, &output.stderr) {
            return Err(ToolError::MergeConflict {
                command,
                output: output.combined().trim().to_string(),
            });
        }
        Err(ToolError::Failed {
            command,
            code: output.code,
            stderr: output.combined().trim().to_string(),
        })
    }

    async fn has_changes(&self) -> ToolResult<bool> {
        let repo = self.open("status")?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo
            .statuses(Some(&mut opts))
            .map_err(|e| libgit2_error("status", e))?;
        let changed = statuses
            .iter()
            .any(|entry| entry.status() != Status::CURRENT && !entry.status().is_ignored());
        debug!(changed, "working tree status");
        Ok(changed)
    }

    async fn conflicted_files(&self) -> ToolResult<Vec<String>> {
        let repo = self.open("index")?;
        let index = repo.index().map_err(|e| libgit2_error("index", e))?;
        if !index.has_conflicts() {
            return Ok(Vec::new());
        }
        let conflicts = index
            .conflicts()
            .map_err(|e| libgit2_error("conflicts", e))?;

        let mut paths = BTreeSet::new();
        for conflict in conflicts {
            let conflict = conflict.map_err(|e| libgit2_error("conflicts", e))?;
            let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
            if let Some(entry) = entry {
                paths.insert(String::from_utf8_lossy(&entry.path).to_string());
            }
        }
        Ok(paths.into_iter().collect())
    }

    async fn diff(&self, base: &str, head: &str) -> ToolResult<String> {
        let range = format!("{base}..{head}");
        let output =
            process::run_checked("git", &["diff", &range], &self.dir, self.timeout).await?;
        Ok(output.stdout)
    }

    async fn current_branch(&self) -> ToolResult<String> {
        let repo = self.open("head")?;
        match repo.head() {
            Ok(head) => head
                .shorthand()
                .map(str::to_string)
                .ok_or_else(|| ToolError::UnexpectedOutput {
                    command: "libgit2 head".to_string(),
                    message: "HEAD is not valid UTF-8".to_string(),
                }),
            // Unborn branch: HEAD points at a ref with no commits yet
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                let head = repo
                    .find_reference("HEAD")
                    .map_err(|e| libgit2_error("head", e))?;
                let target = head.symbolic_target().unwrap_or("HEAD");
                Ok(target.trim_start_matches("refs/heads/").to_string())
            }
            Err(e) => Err(libgit2_error("head", e)),
        }
    }
}
