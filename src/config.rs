use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::conveyor_config::{ConveyorToml, PolicySection};

/// Per-call timeouts resolved from `[timeouts]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub generate: Duration,
    pub implement: Duration,
    pub test: Duration,
    pub conflict: Duration,
    /// Corrective marker-removal request during conflict resolution
    pub conflict_retry: Duration,
    pub command: Duration,
}

/// Runtime configuration for a single project run.
///
/// Bridges `conveyor.toml`, environment overrides and CLI flags into the
/// values the pipeline reads.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub state_file: PathBuf,
    pub claude_cmd: String,
    pub skip_permissions: bool,
    pub generate_model: Option<String>,
    pub max_retries: u32,
    pub diff_cap_chars: usize,
    pub slug_max_len: usize,
    pub timeouts: Timeouts,
    pub trunk: String,
    pub integration: String,
    pub feature_prefix: String,
    pub private_repo: bool,
    pub squash_feature_merges: bool,
    pub policy: PolicySection,
}

impl Config {
    pub fn new(project_dir: PathBuf, toml: &ConveyorToml) -> Self {
        let state_file = state_file_path(&project_dir, toml);
        let t = &toml.timeouts;
        Self {
            state_file,
            claude_cmd: toml.claude_cmd(),
            skip_permissions: toml.skip_permissions(),
            generate_model: toml.project.generate_model.clone(),
            max_retries: toml.pipeline.max_retries,
            diff_cap_chars: toml.pipeline.diff_cap_chars,
            slug_max_len: toml.pipeline.slug_max_len,
            timeouts: Timeouts {
                generate: Duration::from_secs(t.generate_secs),
                implement: Duration::from_secs(t.implement_secs),
                test: Duration::from_secs(t.test_secs),
                conflict: Duration::from_secs(t.conflict_secs),
                conflict_retry: Duration::from_secs(t.conflict_secs / 2),
                command: Duration::from_secs(t.command_secs),
            },
            trunk: toml.branches.trunk.clone(),
            integration: toml.branches.integration.clone(),
            feature_prefix: toml.branches.feature_prefix.clone(),
            private_repo: toml.github.private,
            squash_feature_merges: toml.github.squash_feature_merges,
            policy: toml.policy.clone(),
            project_dir,
        }
    }

    /// Apply the `--max-retries` override.
    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        if let Some(n) = max_retries {
            self.max_retries = n;
        }
        self
    }

    /// Total attempts for a retried step: the first try plus `max_retries`.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn state_dir(&self) -> &Path {
        self.state_file.parent().unwrap_or(&self.project_dir)
    }

    pub fn plan_file(&self) -> PathBuf {
        self.project_dir.join("plan.md")
    }

    pub fn issues_file(&self) -> PathBuf {
        self.project_dir.join("issues.json")
    }

    /// Directory name ignored by git in generated repositories.
    pub fn state_dir_name(&self) -> String {
        self.state_dir()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "state".to_string())
    }

    /// Flags for a Claude CLI invocation. `model` is only passed for
    /// prompt-only generation.
    pub fn claude_flags(&self, model: Option<&str>) -> Vec<String> {
        let mut flags = vec!["-p".to_string()];
        if self.skip_permissions {
            flags.push("--dangerously-skip-permissions".to_string());
        }
        if let Some(model) = model {
            flags.push("--model".to_string());
            flags.push(model.to_string());
        }
        flags.push("--verbose".to_string());
        flags.push("--output-format".to_string());
        flags.push("stream-json".to_string());
        flags.push("--no-session-persistence".to_string());
        flags
    }
}

/// `<project_dir>/<state_dir>/<state_file>`
pub fn state_file_path(project_dir: &Path, toml: &ConveyorToml) -> PathBuf {
    project_dir
        .join(&toml.pipeline.state_dir)
        .join(&toml.pipeline.state_file)
}
