//! Promotion of a finished phase from the integration line to trunk.

use anyhow::{Context, Result};
use conveyor_common::{PhasePr, RunState, WorkItem};
use tracing::{info, warn};

use crate::pipeline::Pipeline;
use crate::prompts;
use crate::util::truncate_diff;

pub fn phase_pr_title(phase: u32, trunk: &str) -> String {
    format!("Phase {phase} complete - merge to {trunk}")
}

impl Pipeline {
    /// Open and merge the trunk-bound change request for `phase`, then bring
    /// the integration line back in sync with trunk. The phase is recorded as
    /// merged only once every part has succeeded.
    ///
    /// The change request number and its remote merge are checkpointed as
    /// they happen, so re-entry after a failure reuses the same request.
    ///
    /// `items` is the sequenced work item list, parallel to `state.issues`.
    pub async fn merge_phase(
        &self,
        state: &mut RunState,
        phase: u32,
        items: &[WorkItem],
    ) -> Result<()> {
        let trunk = &self.config.trunk;
        let integration = &self.config.integration;
        info!(phase, "promoting phase: {integration} -> {trunk}");

        let pr = match state.phase_pr(phase) {
            Some(pr) => {
                info!(phase, pr = pr.number, "reusing phase change request");
                pr
            }
            None => {
                let number = self.open_phase_pr(state, phase, items).await?;
                let pr = PhasePr {
                    number,
                    merged: false,
                };
                state.phase_prs.insert(phase, pr);
                self.checkpoint(state)?;
                pr
            }
        };

        if pr.merged {
            info!(phase, pr = pr.number, "phase change request already merged");
        } else {
            self.hosting
                .merge_change_request(pr.number, false, false)
                .await
                .with_context(|| format!("Failed to merge phase change request #{}", pr.number))?;
            state.phase_prs.insert(phase, PhasePr { merged: true, ..pr });
            self.checkpoint(state)?;
            info!(phase, pr = pr.number, "phase change request merged");
        }

        for branch in [trunk, integration] {
            self.vcs
                .checkout(branch, false)
                .await
                .with_context(|| format!("Failed to check out {branch}"))?;
            self.pull_best_effort(branch).await;
        }

        match self.vcs.merge(trunk).await {
            Ok(()) => {}
            Err(e) if e.is_merge_conflict() => {
                warn!(phase, "conflict syncing {integration} with {trunk}; resolving");
                self.resolve_conflicts(&format!("Phase {phase} sync"))
                    .await?;
                self.vcs.add_all().await.context("Failed to stage resolution")?;
                self.vcs
                    .commit(&format!("Sync {integration} with {trunk} after phase merge"))
                    .await
                    .context("Failed to commit phase sync")?;
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to merge {trunk} into {integration}"));
            }
        }
        if let Err(e) = self.vcs.push(integration, false).await {
            warn!(branch = %integration, error = %e, "push failed after phase sync");
        }

        state.mark_phase_merged(phase);
        self.checkpoint(state)?;
        info!(phase, "phase merged to {trunk}");
        Ok(())
    }

    async fn open_phase_pr(&self, state: &RunState, phase: u32, items: &[WorkItem]) -> Result<u64> {
        let trunk = &self.config.trunk;
        let integration = &self.config.integration;
        let diff = self
            .vcs
            .diff(trunk, integration)
            .await
            .with_context(|| format!("Failed to diff {trunk}..{integration}"))?;
        let diff = truncate_diff(&diff, self.config.diff_cap_chars);
        let phase_items: Vec<&WorkItem> = state
            .phase_issue_indices(phase)
            .into_iter()
            .filter_map(|i| items.get(i))
            .collect();
        let body = self
            .generator
            .generate(
                &prompts::build_phase_pr_body_prompt(
                    phase,
                    integration,
                    trunk,
                    &phase_items,
                    &diff,
                ),
                self.config.timeouts.generate,
            )
            .await
            .context("Failed to generate phase description")?;

        let number = self
            .hosting
            .create_change_request(&phase_pr_title(phase, trunk), body.trim(), trunk, integration)
            .await
            .context("Failed to open phase change request")?;
        info!(phase, pr = number, "phase change request opened");
        Ok(number)
    }
}
