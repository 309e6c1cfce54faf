//! Code hosting through the GitHub CLI.

use async_trait::async_trait;
use conveyor_common::{Hosting, ToolError, ToolResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use crate::tools::process;

static ISSUE_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/issues/(\d+)").unwrap());

static PULL_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/pull/(\d+)").unwrap());

/// Longest repository description GitHub accepts without complaint.
const MAX_DESCRIPTION_CHARS: usize = 200;

pub struct GhCli {
    dir: PathBuf,
    timeout: Duration,
}

impl GhCli {
    pub fn new(dir: PathBuf, timeout: Duration) -> Self {
        Self { dir, timeout }
    }

    async fn gh(&self, args: &[&str]) -> ToolResult<String> {
        self.gh_in(args, &self.dir).await
    }

    async fn gh_in(&self, args: &[&str], cwd: &Path) -> ToolResult<String> {
        let output = process::run_checked("gh", args, cwd, self.timeout).await?;
        Ok(output.stdout)
    }
}

/// `description` cut to what GitHub accepts.
fn repo_description(description: &str) -> String {
    description.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

/// Number captured by `regex` from the URL `gh` printed.
fn parse_number(regex: &Regex, output: &str, command: &str) -> ToolResult<u64> {
    regex
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| ToolError::UnexpectedOutput {
            command: command.to_string(),
            message: format!("could not find a number in: {}", output.trim()),
        })
}

#[async_trait]
impl Hosting for GhCli {
    async fn create_repo(
        &self,
        name: &str,
        private: bool,
        description: &str,
    ) -> ToolResult<String> {
        let description = repo_description(description);
        let source = self.dir.to_string_lossy().to_string();
        let mut args = vec![
            "repo",
            "create",
            name,
            if private { "--private" } else { "--public" },
        ];
        if !description.trim().is_empty() {
            args.extend(["--description", description.as_str()]);
        }
        args.extend(["--source", source.as_str(), "--push"]);
        let out = self.gh(&args).await?;
        Ok(out.trim().to_string())
    }

    async fn clone_repo(&self, full_name: &str, target: &Path) -> ToolResult<()> {
        let target_str = target.to_string_lossy().to_string();
        let cwd = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        self.gh_in(&["repo", "clone", full_name, &target_str], cwd)
            .await
            .map(|_| ())
    }

    async fn create_ticket(&self, title: &str, body: &str, labels: &[String]) -> ToolResult<u64> {
        let mut args = vec!["issue", "create", "--title", title, "--body", body];
        for label in labels {
            args.extend(["--label", label.as_str()]);
        }
        let out = self.gh(&args).await?;
        parse_number(&ISSUE_URL_REGEX, &out, "gh issue create")
    }

    async fn create_change_request(
        &self,
        title: &str,
        body: &str,
        base: &str,
        head: &str,
    ) -> ToolResult<u64> {
        let out = self
            .gh(&[
                "pr", "create", "--title", title, "--body", body, "--base", base, "--head", head,
            ])
            .await?;
        parse_number(&PULL_URL_REGEX, &out, "gh pr create")
    }

    async fn merge_change_request(
        &self,
        id: u64,
        squash: bool,
        delete_branch: bool,
    ) -> ToolResult<String> {
        let id = id.to_string();
        let mut args = vec![
            "pr",
            "merge",
            id.as_str(),
            "--admin",
            if squash { "--squash" } else { "--merge" },
        ];
        if delete_branch {
            args.push("--delete-branch");
        }
        let out = self.gh(&args).await?;
        Ok(out.trim().to_string())
    }

    async fn diff_change_request(&self, id: u64) -> ToolResult<String> {
        self.gh(&["pr", "diff", &id.to_string()]).await
    }

    async fn view_change_request(&self, id: u64) -> ToolResult<String> {
        self.gh(&["pr", "view", &id.to_string(), "--json", "body", "--jq", ".body"])
            .await
    }

    async fn edit_change_request(&self, id: u64, body: &str) -> ToolResult<()> {
        self.gh(&["pr", "edit", &id.to_string(), "--body", body])
            .await
            .map(|_| ())
    }

    async fn close_ticket(&self, id: u64, comment: &str) -> ToolResult<()> {
        let id = id.to_string();
        let mut args = vec!["issue", "close", id.as_str(), "--reason", "completed"];
        if !comment.is_empty() {
            args.extend(["--comment", comment]);
        }
        self.gh(&args).await.map(|_| ())
    }
}
