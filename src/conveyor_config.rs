//! File configuration for Conveyor.
//!
//! Reads an optional `conveyor.toml`. Every field has a default, so an empty
//! or missing file yields a working configuration.
//!
//! ```toml
//! [project]
//! claude_cmd = "claude"
//! generate_model = "sonnet"
//!
//! [pipeline]
//! max_retries = 2
//! diff_cap_chars = 15000
//!
//! [timeouts]
//! implement_secs = 600
//! test_secs = 1800
//!
//! [branches]
//! trunk = "main"
//! integration = "staging"
//!
//! [github]
//! private = true
//!
//! [policy]
//! halt_on_failing_tests = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "conveyor.toml";

/// Generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Claude CLI command (default: "claude")
    #[serde(default)]
    pub claude_cmd: Option<String>,
    /// Model passed to prompt-only generation calls
    #[serde(default = "default_generate_model")]
    pub generate_model: Option<String>,
    #[serde(default = "default_skip_permissions")]
    pub skip_permissions: bool,
}

fn default_generate_model() -> Option<String> {
    Some("sonnet".to_string())
}

fn default_skip_permissions() -> bool {
    true
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            claude_cmd: None,
            generate_model: default_generate_model(),
            skip_permissions: default_skip_permissions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Extra attempts after the first for code generation and test execution
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Diffs longer than this are truncated before they reach a prompt
    #[serde(default = "default_diff_cap_chars")]
    pub diff_cap_chars: usize,
    #[serde(default = "default_slug_max_len")]
    pub slug_max_len: usize,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

fn default_max_retries() -> u32 {
    2
}

fn default_diff_cap_chars() -> usize {
    15_000
}

fn default_slug_max_len() -> usize {
    50
}

fn default_state_dir() -> String {
    "state".to_string()
}

fn default_state_file() -> String {
    "agent_state.json".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            diff_cap_chars: default_diff_cap_chars(),
            slug_max_len: default_slug_max_len(),
            state_dir: default_state_dir(),
            state_file: default_state_file(),
        }
    }
}

/// Per-call timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsSection {
    #[serde(default = "default_generate_secs")]
    pub generate_secs: u64,
    #[serde(default = "default_implement_secs")]
    pub implement_secs: u64,
    #[serde(default = "default_test_secs")]
    pub test_secs: u64,
    #[serde(default = "default_conflict_secs")]
    pub conflict_secs: u64,
    #[serde(default = "default_command_secs")]
    pub command_secs: u64,
}

fn default_generate_secs() -> u64 {
    300
}

fn default_implement_secs() -> u64 {
    600
}

fn default_test_secs() -> u64 {
    1800
}

fn default_conflict_secs() -> u64 {
    120
}

fn default_command_secs() -> u64 {
    600
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            generate_secs: default_generate_secs(),
            implement_secs: default_implement_secs(),
            test_secs: default_test_secs(),
            conflict_secs: default_conflict_secs(),
            command_secs: default_command_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchesSection {
    #[serde(default = "default_trunk")]
    pub trunk: String,
    #[serde(default = "default_integration")]
    pub integration: String,
    #[serde(default = "default_feature_prefix")]
    pub feature_prefix: String,
}

fn default_trunk() -> String {
    "main".to_string()
}

fn default_integration() -> String {
    "staging".to_string()
}

fn default_feature_prefix() -> String {
    "feature".to_string()
}

impl Default for BranchesSection {
    fn default() -> Self {
        Self {
            trunk: default_trunk(),
            integration: default_integration(),
            feature_prefix: default_feature_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubSection {
    #[serde(default = "default_true")]
    pub private: bool,
    #[serde(default = "default_true")]
    pub squash_feature_merges: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            private: true,
            squash_feature_merges: true,
        }
    }
}

/// Whether degraded outcomes halt the run. All default to `false`, which
/// keeps the pipeline moving forward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySection {
    #[serde(default)]
    pub halt_on_unresolved_dependencies: bool,
    #[serde(default)]
    pub halt_on_failing_tests: bool,
    #[serde(default)]
    pub halt_on_unresolved_conflicts: bool,
}

/// The complete conveyor.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConveyorToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    #[serde(default)]
    pub branches: BranchesSection,
    #[serde(default)]
    pub github: GithubSection,
    #[serde(default)]
    pub policy: PolicySection,
}

impl ConveyorToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to load config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse conveyor.toml")
    }

    /// Load `conveyor.toml` from `dir`, or defaults if it does not exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize conveyor.toml")
    }

    /// Claude command: file, then `CLAUDE_CMD`, then "claude".
    pub fn claude_cmd(&self) -> String {
        self.project
            .claude_cmd
            .clone()
            .or_else(|| std::env::var("CLAUDE_CMD").ok())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// `SKIP_PERMISSIONS` overrides the file setting.
    pub fn skip_permissions(&self) -> bool {
        if let Ok(env_val) = std::env::var("SKIP_PERMISSIONS") {
            return env_val != "false";
        }
        self.project.skip_permissions
    }

    /// Human-readable warnings for suspicious settings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let timeouts = [
            ("generate_secs", self.timeouts.generate_secs),
            ("implement_secs", self.timeouts.implement_secs),
            ("test_secs", self.timeouts.test_secs),
            ("conflict_secs", self.timeouts.conflict_secs),
            ("command_secs", self.timeouts.command_secs),
        ];
        for (name, secs) in timeouts {
            if secs == 0 {
                warnings.push(format!(
                    "timeouts.{name} is 0; every call of that kind will time out immediately"
                ));
            }
        }

        let branches = [
            ("trunk", &self.branches.trunk),
            ("integration", &self.branches.integration),
            ("feature_prefix", &self.branches.feature_prefix),
        ];
        for (name, value) in branches {
            if value.trim().is_empty() {
                warnings.push(format!("branches.{name} is empty"));
            }
        }
        if self.branches.trunk == self.branches.integration {
            warnings.push(format!(
                "branches.trunk and branches.integration are both '{}'; phase merges need two branches",
                self.branches.trunk
            ));
        }

        if self.pipeline.diff_cap_chars == 0 {
            warnings.push("pipeline.diff_cap_chars is 0; every diff will be truncated".to_string());
        }
        if self.pipeline.slug_max_len == 0 {
            warnings.push("pipeline.slug_max_len is 0; branch names will have no title".to_string());
        }
        if self.pipeline.state_file.trim().is_empty() {
            warnings.push("pipeline.state_file is empty".to_string());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_empty_file_yields_defaults() {
        let toml = ConveyorToml::parse("").unwrap();
        assert_eq!(toml.pipeline.max_retries, 2);
        assert_eq!(toml.pipeline.diff_cap_chars, 15_000);
        assert_eq!(toml.pipeline.slug_max_len, 50);
        assert_eq!(toml.pipeline.state_dir, "state");
        assert_eq!(toml.pipeline.state_file, "agent_state.json");
        assert_eq!(toml.timeouts.generate_secs, 300);
        assert_eq!(toml.timeouts.implement_secs, 600);
        assert_eq!(toml.timeouts.test_secs, 1800);
        assert_eq!(toml.timeouts.conflict_secs, 120);
        assert_eq!(toml.branches.trunk, "main");
        assert_eq!(toml.branches.integration, "staging");
        assert!(toml.github.private);
        assert!(toml.github.squash_feature_merges);
        assert!(!toml.policy.halt_on_failing_tests);
        assert_eq!(toml.project.generate_model.as_deref(), Some("sonnet"));
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let content = r#"
[pipeline]
max_retries = 5

[branches]
integration = "develop"

[policy]
halt_on_unresolved_conflicts = true
"#;
        let toml = ConveyorToml::parse(content).unwrap();
        assert_eq!(toml.pipeline.max_retries, 5);
        assert_eq!(toml.pipeline.diff_cap_chars, 15_000);
        assert_eq!(toml.branches.integration, "develop");
        assert_eq!(toml.branches.trunk, "main");
        assert!(toml.policy.halt_on_unresolved_conflicts);
        assert!(!toml.policy.halt_on_unresolved_dependencies);
    }

    #[test]
    fn test_parse_invalid_toml_fails() {
        assert!(ConveyorToml::parse("[pipeline\nmax_retries = ").is_err());
        assert!(ConveyorToml::parse("[pipeline]\nmax_retries = \"many\"").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let toml = ConveyorToml::load_or_default(dir.path()).unwrap();
        assert_eq!(toml.branches.trunk, "main");
    }

    #[test]
    fn test_load_or_default_reads_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[timeouts]\ntest_secs = 60\n",
        )
        .unwrap();
        let toml = ConveyorToml::load_or_default(dir.path()).unwrap();
        assert_eq!(toml.timeouts.test_secs, 60);
    }

    #[test]
    fn test_serialized_config_parses_back() {
        let mut toml = ConveyorToml::default();
        toml.pipeline.max_retries = 7;
        let text = toml.to_toml_string().unwrap();
        let parsed = ConveyorToml::parse(&text).unwrap();
        assert_eq!(parsed.pipeline.max_retries, 7);
    }

    #[test]
    fn test_validate_defaults_clean() {
        assert!(ConveyorToml::default().validate().is_empty());
    }

    #[test]
    fn test_validate_flags_bad_settings() {
        let content = r#"
[timeouts]
test_secs = 0

[branches]
trunk = "main"
integration = "main"
feature_prefix = " "
"#;
        let warnings = ConveyorToml::parse(content).unwrap().validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("timeouts.test_secs")));
        assert!(warnings.iter().any(|w| w.contains("both 'main'")));
        assert!(warnings.iter().any(|w| w.contains("feature_prefix")));
    }

    #[test]
    fn test_claude_cmd_priority() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved = std::env::var("CLAUDE_CMD").ok();
        unsafe { std::env::remove_var("CLAUDE_CMD") };

        assert_eq!(ConveyorToml::default().claude_cmd(), "claude");

        unsafe { std::env::set_var("CLAUDE_CMD", "env-claude") };
        assert_eq!(ConveyorToml::default().claude_cmd(), "env-claude");

        let toml = ConveyorToml::parse("[project]\nclaude_cmd = \"file-claude\"\n").unwrap();
        assert_eq!(toml.claude_cmd(), "file-claude");

        unsafe { std::env::remove_var("CLAUDE_CMD") };
        if let Some(val) = saved {
            unsafe { std::env::set_var("CLAUDE_CMD", val) };
        }
    }

    #[test]
    fn test_skip_permissions_env_override() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved = std::env::var("SKIP_PERMISSIONS").ok();

        unsafe { std::env::set_var("SKIP_PERMISSIONS", "false") };
        assert!(!ConveyorToml::default().skip_permissions());

        unsafe { std::env::remove_var("SKIP_PERMISSIONS") };
        assert!(ConveyorToml::default().skip_permissions());

        if let Some(val) = saved {
            unsafe { std::env::set_var("SKIP_PERMISSIONS", val) };
        }
    }
}
