//! The delivery pipeline: per-issue step sequencing, the test reconciliation
//! loop, conflict fallback and phase promotion.
//!
//! A [`Pipeline`] owns the collaborators and the state store. The mutable
//! [`RunState`] is owned by the caller and passed by reference into every
//! operation; each operation checkpoints it after every mutation so a crash
//! replays at most one in-flight step.

pub mod conflicts;
mod driver;
#[cfg(test)]
pub(crate) mod fakes;
pub mod phase_merge;
pub mod retry;
pub mod steps;
pub mod tests_loop;

use anyhow::{Context, Result};
use conveyor_common::{Generator, Hosting, RunState, VersionControl};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::store::StateStore;

pub use conflicts::ConflictReport;
pub use retry::{Attempt, AttemptResult, Attemptable, RetryOutcome, RetryPolicy};

pub struct Pipeline {
    pub(crate) config: Config,
    pub(crate) store: StateStore,
    pub(crate) generator: Arc<dyn Generator>,
    pub(crate) vcs: Arc<dyn VersionControl>,
    pub(crate) hosting: Arc<dyn Hosting>,
    /// `owner/name` to clone instead of creating a new repository
    pub(crate) existing_repo: Option<String>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        generator: Arc<dyn Generator>,
        vcs: Arc<dyn VersionControl>,
        hosting: Arc<dyn Hosting>,
    ) -> Self {
        let store = StateStore::new(config.state_file.clone());
        Self {
            config,
            store,
            generator,
            vcs,
            hosting,
            existing_repo: None,
        }
    }

    /// Wire the process-backed collaborators for `config`.
    pub fn from_config(config: Config) -> Self {
        let dir = config.project_dir.clone();
        let timeout = config.timeouts.command;
        let generator = Arc::new(crate::tools::ClaudeCli::new(&config));
        let vcs = Arc::new(crate::tools::GitCli::new(dir.clone(), timeout));
        let hosting = Arc::new(crate::tools::GhCli::new(dir, timeout));
        Self::new(config, generator, vcs, hosting)
    }

    pub fn with_existing_repo(mut self, repo: Option<String>) -> Self {
        self.existing_repo = repo;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Persist `state`. Called after every state-relevant mutation.
    pub fn checkpoint(&self, state: &RunState) -> Result<()> {
        self.store
            .save(state)
            .with_context(|| format!("Failed to checkpoint to {}", self.store.path().display()))?;
        debug!("checkpoint saved");
        Ok(())
    }

    /// Pull `branch` into the current branch, tolerating a remote with nothing new.
    pub(crate) async fn pull_best_effort(&self, branch: &str) {
        if let Err(e) = self.vcs.pull(branch).await {
            warn!(branch, error = %e, "pull failed; continuing with local copy");
        }
    }

    /// Switch to `branch` unless it is already checked out.
    pub(crate) async fn ensure_on_branch(&self, branch: &str) -> Result<()> {
        let current = self
            .vcs
            .current_branch()
            .await
            .context("Failed to read current branch")?;
        if current != branch {
            self.vcs
                .checkout(branch, false)
                .await
                .with_context(|| format!("Failed to check out {branch}"))?;
        }
        Ok(())
    }
}
