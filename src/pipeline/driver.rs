use anyhow::{Result, bail};
use conveyor_common::{RunState, WorkItem};
use tracing::info;

use crate::pipeline::Pipeline;

impl Pipeline {
    /// Run (or resume) a project from its saved state to completion.
    ///
    /// One-time setup stages are skipped once their flag is set; issues are
    /// processed phase by phase in sequenced order, and each finished phase
    /// is promoted to trunk once.
    pub async fn run(&self, state: &mut RunState) -> Result<()> {
        let plan = self.ensure_plan(state).await?;
        let items = self.ensure_issues(state, &plan).await?;
        self.ensure_repository(state).await?;
        self.ensure_scaffolding(state, &plan).await?;
        self.ensure_integration_branch(state).await?;
        self.process_phases(state, &items, &plan).await
    }

    /// `items` is parallel to `state.issues`.
    pub async fn process_phases(
        &self,
        state: &mut RunState,
        items: &[WorkItem],
        plan: &str,
    ) -> Result<()> {
        if items.len() != state.issues.len() {
            bail!(
                "Issue list has {} items but the run state tracks {}",
                items.len(),
                state.issues.len()
            );
        }

        let total = state.issues.len();
        for phase in state.phases() {
            info!(phase, "starting phase");
            for idx in state.phase_issue_indices(phase) {
                if state.issues[idx].is_closed() {
                    info!(issue = idx + 1, total, title = %items[idx].title, "skipping completed issue");
                    continue;
                }
                self.process_issue(state, idx, &items[idx], plan).await?;
            }

            if state.is_phase_merged(phase) {
                info!(phase, "phase already merged");
                continue;
            }
            if !state.phase_complete(phase) {
                bail!("Phase {phase} has open issues after processing");
            }
            self.merge_phase(state, phase, items).await?;
        }
        info!(issues = total, "all phases complete");
        Ok(())
    }
}
