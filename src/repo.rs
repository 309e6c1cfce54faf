//! One-time repository setup: remote repository, scaffolding and the
//! integration branch. Each stage is gated by a flag in the run state.

use anyhow::{Context, Result};
use conveyor_common::RunState;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::pipeline::Pipeline;
use crate::prompts;
use crate::util::parse_repo_full_name;

/// Append `state_dir/` to `.gitignore` unless it is already listed.
pub fn ensure_state_dir_ignored(project_dir: &Path, state_dir: &str) -> Result<()> {
    let path = project_dir.join(".gitignore");
    let existing = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let entry = format!("{state_dir}/");
    if existing.lines().any(|line| line.trim() == entry) {
        return Ok(());
    }
    fs::write(&path, format!("{existing}\n# Agent state\n{entry}\n"))
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Move every entry of `from` into `to`, keeping anything already in `to`.
fn move_entries(from: &Path, to: &Path) -> Result<()> {
    for entry in fs::read_dir(from).with_context(|| format!("Failed to read {}", from.display()))? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if dest.exists() {
            warn!(path = %dest.display(), "already present; keeping local copy");
            continue;
        }
        fs::rename(entry.path(), &dest)
            .with_context(|| format!("Failed to move {} into place", dest.display()))?;
    }
    Ok(())
}

impl Pipeline {
    /// Connect the project directory to a remote repository: clone the
    /// configured existing repository, or initialize locally and create one.
    pub async fn ensure_repository(&self, state: &mut RunState) -> Result<()> {
        if state.repo_created {
            info!(repo = %state.repo_full_name, "repository already set up");
            return Ok(());
        }
        let dir = &self.config.project_dir;
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        match &self.existing_repo {
            Some(full_name) => self.clone_existing(state, full_name).await?,
            None => self.create_new(state).await?,
        }

        state.repo_created = true;
        self.checkpoint(state)?;
        info!(repo = %state.repo_full_name, "repository ready");
        Ok(())
    }

    async fn clone_existing(&self, state: &mut RunState, full_name: &str) -> Result<()> {
        state.repo_full_name = full_name.to_string();
        state.repo_name = full_name
            .rsplit('/')
            .next()
            .unwrap_or(full_name)
            .to_string();

        // The project directory already holds the plan and state, so clone
        // beside them and move the checkout up.
        let staging = tempfile::Builder::new()
            .prefix(".clone")
            .tempdir_in(&self.config.project_dir)
            .context("Failed to create clone directory")?;
        let target = staging.path().join(&state.repo_name);
        self.hosting
            .clone_repo(full_name, &target)
            .await
            .with_context(|| format!("Failed to clone {full_name}"))?;
        move_entries(&target, &self.config.project_dir)?;
        ensure_state_dir_ignored(&self.config.project_dir, &self.config.state_dir_name())?;
        info!(repo = %full_name, "cloned existing repository");
        Ok(())
    }

    async fn create_new(&self, state: &mut RunState) -> Result<()> {
        let dir = &self.config.project_dir;
        if !dir.join(".git").exists() {
            self.vcs
                .init(&self.config.trunk)
                .await
                .context("Failed to initialize repository")?;
            fs::write(
                dir.join("README.md"),
                format!("# {}\n\n{}\n", state.repo_name, state.project_idea),
            )
            .context("Failed to write README.md")?;
            ensure_state_dir_ignored(dir, &self.config.state_dir_name())?;
            self.vcs.add_all().await.context("Failed to stage files")?;
            self.vcs
                .commit("Initial commit")
                .await
                .context("Failed to create initial commit")?;
        }

        let output = self
            .hosting
            .create_repo(&state.repo_name, self.config.private_repo, &state.project_idea)
            .await
            .context("Failed to create remote repository")?;
        // `gh repo create --push` can print several lines; the URL comes first
        let first_line = output.lines().next().unwrap_or_default();
        info!(url = %first_line.trim(), "remote repository created");
        state.repo_full_name =
            parse_repo_full_name(first_line).unwrap_or_else(|| state.repo_name.clone());
        Ok(())
    }

    /// Generate the initial project skeleton and push it to trunk.
    pub async fn ensure_scaffolding(&self, state: &mut RunState, plan: &str) -> Result<()> {
        if state.scaffolding_done {
            info!("scaffolding already done");
            return Ok(());
        }
        info!("generating project scaffolding");
        self.generator
            .implement(
                &prompts::build_scaffolding_prompt(&state.project_idea, &state.tech_stack, plan),
                &self.config.project_dir,
                self.config.timeouts.implement,
            )
            .await
            .context("Failed to generate scaffolding")?;

        self.vcs.add_all().await.context("Failed to stage scaffolding")?;
        if let Err(e) = self.vcs.commit("Add initial project scaffolding").await {
            warn!(error = %e, "scaffolding commit failed");
        } else if let Err(e) = self.vcs.push(&self.config.trunk, false).await {
            warn!(error = %e, "scaffolding push failed");
        }

        state.scaffolding_done = true;
        self.checkpoint(state)?;
        info!("scaffolding pushed");
        Ok(())
    }

    /// Create the integration branch from trunk and publish it.
    pub async fn ensure_integration_branch(&self, state: &mut RunState) -> Result<()> {
        let integration = &self.config.integration;
        if state.staging_branch_created {
            info!(branch = %integration, "integration branch already exists");
            return Ok(());
        }
        let trunk = &self.config.trunk;
        self.vcs
            .checkout(trunk, false)
            .await
            .with_context(|| format!("Failed to check out {trunk}"))?;
        self.pull_best_effort(trunk).await;
        self.vcs
            .checkout(integration, true)
            .await
            .with_context(|| format!("Failed to create {integration}"))?;
        self.vcs
            .push(integration, true)
            .await
            .with_context(|| format!("Failed to push {integration}"))?;

        state.staging_branch_created = true;
        self.checkpoint(state)?;
        info!(branch = %integration, "integration branch created");
        Ok(())
    }
}
