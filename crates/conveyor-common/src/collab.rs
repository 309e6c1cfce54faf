//! Contracts for the external collaborators the pipeline drives.
//!
//! Real implementations shell out to `claude`, `git` and `gh`; tests use
//! scripted in-memory doubles. Every call is a single blocking request from
//! the pipeline's point of view and reports failure through [`ToolError`].

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Failure of an external call.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}: {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("Merge conflict while running `{command}`: {output}")]
    MergeConflict { command: String, output: String },

    #[error("Unexpected output from `{command}`: {message}")]
    UnexpectedOutput { command: String, message: String },
}

impl ToolError {
    pub fn is_merge_conflict(&self) -> bool {
        matches!(self, ToolError::MergeConflict { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolError::Timeout { .. })
    }
}

pub type ToolResult<T> = Result<T, ToolError>;

/// The natural-language generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Prompt-only text generation.
    async fn generate(&self, prompt: &str, timeout: Duration) -> ToolResult<String>;

    /// Generation with file-system tool access; side effects land in `working_dir`.
    async fn implement(
        &self,
        prompt: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> ToolResult<String>;
}

/// Version-control operations against the project working directory.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Initialize a repository whose first branch is `default_branch`.
    async fn init(&self, default_branch: &str) -> ToolResult<()>;

    async fn checkout(&self, branch: &str, create: bool) -> ToolResult<()>;

    /// Pull `branch` from the remote into the current branch.
    async fn pull(&self, branch: &str) -> ToolResult<()>;

    async fn add_all(&self) -> ToolResult<()>;

    async fn commit(&self, message: &str) -> ToolResult<()>;

    async fn push(&self, branch: &str, set_upstream: bool) -> ToolResult<()>;

    /// Merge `branch` into the current branch. Conflicts surface as
    /// [`ToolError::MergeConflict`].
    async fn merge(&self, branch: &str) -> ToolResult<()>;

    /// True if the working tree has staged, unstaged or untracked changes.
    async fn has_changes(&self) -> ToolResult<bool>;

    /// Paths (relative to the repository root) with unresolved conflicts.
    async fn conflicted_files(&self) -> ToolResult<Vec<String>>;

    /// Textual diff from `base` to `head`.
    async fn diff(&self, base: &str, head: &str) -> ToolResult<String>;

    async fn current_branch(&self) -> ToolResult<String>;
}

/// Remote code-hosting operations.
#[async_trait]
pub trait Hosting: Send + Sync {
    /// Create a remote repository from the local working directory and push
    /// it. Returns the URL printed by the host.
    async fn create_repo(&self, name: &str, private: bool, description: &str)
    -> ToolResult<String>;

    async fn clone_repo(&self, full_name: &str, target: &Path) -> ToolResult<()>;

    async fn create_ticket(&self, title: &str, body: &str, labels: &[String]) -> ToolResult<u64>;

    async fn create_change_request(
        &self,
        title: &str,
        body: &str,
        base: &str,
        head: &str,
    ) -> ToolResult<u64>;

    async fn merge_change_request(
        &self,
        id: u64,
        squash: bool,
        delete_branch: bool,
    ) -> ToolResult<String>;

    async fn diff_change_request(&self, id: u64) -> ToolResult<String>;

    /// Current body of the change request.
    async fn view_change_request(&self, id: u64) -> ToolResult<String>;

    async fn edit_change_request(&self, id: u64, body: &str) -> ToolResult<()>;

    async fn close_ticket(&self, id: u64, comment: &str) -> ToolResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_conflict_is_distinguishable() {
        let err = ToolError::MergeConflict {
            command: "git merge feature/x".into(),
            output: "CONFLICT (content)".into(),
        };
        assert!(err.is_merge_conflict());
        assert!(!err.is_timeout());

        let err = ToolError::Failed {
            command: "git push".into(),
            code: 1,
            stderr: "rejected".into(),
        };
        assert!(!err.is_merge_conflict());
    }

    #[test]
    fn test_timeout_message_includes_seconds() {
        let err = ToolError::Timeout {
            command: "claude -p".into(),
            timeout: Duration::from_secs(300),
        };
        assert!(err.is_timeout());
        assert!(err.to_string().contains("300s"));
    }

    #[test]
    fn test_tool_error_implements_std_error() {
        fn assert_std_error<E: std::error::Error + Send + Sync + 'static>(_: &E) {}
        let err = ToolError::UnexpectedOutput {
            command: "gh issue create".into(),
            message: "no issue number".into(),
        };
        assert_std_error(&err);
    }
}
