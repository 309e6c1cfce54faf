//! Per-issue step sequencing.
//!
//! An issue walks the [`SubStep`] lifecycle strictly forward. On resume only
//! the steps after the saved cursor run; the cursor is advanced and the state
//! checkpointed after each one.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use conveyor_common::{Generator, RunState, StepStatus, SubStep, ToolError, WorkItem};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::parse::ReviewVerdict;
use crate::pipeline::Pipeline;
use crate::pipeline::retry::{Attempt, AttemptResult, Attemptable, RetryOutcome, RetryPolicy};
use crate::prompts;
use crate::util::{existing_files_summary, slugify, truncate_diff};

/// `{prefix}/issue-{ticket}-{slug}`
pub fn feature_branch_name(prefix: &str, ticket: u64, title: &str, slug_max_len: usize) -> String {
    format!("{prefix}/issue-{ticket}-{}", slugify(title, slug_max_len))
}

fn require<T: Copy>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| anyhow!("Issue has no {what} recorded; the saved state is inconsistent"))
}

/// One code generation request against the working tree, retried as a unit.
struct GenerateCode<'a> {
    generator: &'a dyn Generator,
    prompt: String,
    dir: &'a Path,
    timeout: Duration,
}

#[async_trait]
impl Attemptable for GenerateCode<'_> {
    type Output = String;
    type Failure = ToolError;

    async fn attempt(&mut self, attempt: Attempt) -> AttemptResult<String, ToolError> {
        info!(attempt = %attempt, "generating code");
        match self
            .generator
            .implement(&self.prompt, self.dir, self.timeout)
            .await
        {
            Ok(output) => AttemptResult::Success(output),
            // A missing binary will not fix itself between attempts
            Err(e @ ToolError::Spawn { .. }) => AttemptResult::Terminal(e.into()),
            Err(e) => AttemptResult::Retryable(e),
        }
    }
}

impl Pipeline {
    /// Drive one issue from its saved cursor to `issue_closed`.
    ///
    /// A step failure marks the issue failed, checkpoints, and propagates.
    pub async fn process_issue(
        &self,
        state: &mut RunState,
        idx: usize,
        item: &WorkItem,
        plan: &str,
    ) -> Result<()> {
        let issue = state
            .issues
            .get(idx)
            .with_context(|| format!("No issue at index {idx}"))?;
        if issue.is_closed() {
            debug!(issue = idx, "already closed; skipping");
            return Ok(());
        }
        info!(
            issue = idx + 1,
            title = %item.title,
            resume_from = %issue.sub_step,
            "processing issue"
        );

        state.issues[idx].status = StepStatus::InProgress;
        self.checkpoint(state)?;

        let remaining: Vec<SubStep> = state.issues[idx].sub_step.remaining().collect();
        for step in remaining {
            if let Err(err) = self.execute_step(state, idx, step, item, plan).await {
                state.issues[idx].status = StepStatus::Failed;
                self.checkpoint(state)?;
                return Err(err.context(format!(
                    "Issue {} '{}' failed at step {step}",
                    idx + 1,
                    item.title
                )));
            }
            state.issues[idx].advance_to(step);
            self.checkpoint(state)?;
            info!(issue = idx + 1, step = %step, "step complete");
        }

        state.issues[idx].status = StepStatus::Completed;
        self.checkpoint(state)?;
        info!(issue = idx + 1, title = %item.title, "issue complete");
        Ok(())
    }

    async fn execute_step(
        &self,
        state: &mut RunState,
        idx: usize,
        step: SubStep,
        item: &WorkItem,
        plan: &str,
    ) -> Result<()> {
        match step {
            SubStep::NotStarted => Ok(()),
            SubStep::IssueCreated => self.create_ticket(state, idx, item).await,
            SubStep::BranchCreated => self.create_branch(state, idx, item).await,
            SubStep::CodeGenerated => self.generate_code(state, idx, item, plan).await,
            SubStep::Committed => self.commit_code(state, idx, item).await,
            SubStep::PrCreated => self.open_change_request(state, idx, item).await,
            SubStep::PrReviewed => self.review_change_request(state, idx, item).await,
            SubStep::TestsPassed => self.run_test_plan(state, idx, item).await,
            SubStep::PrMerged => self.merge_feature(state, idx, item).await,
            SubStep::IssueClosed => self.close_ticket(state, idx).await,
        }
    }

    async fn create_ticket(&self, state: &mut RunState, idx: usize, item: &WorkItem) -> Result<()> {
        // No labels: a fresh repository may not define them
        let number = self
            .hosting
            .create_ticket(&item.title, &item.ticket_body(), &[])
            .await
            .context("Failed to create ticket")?;
        info!(issue = idx + 1, ticket = number, "ticket created");
        state.issues[idx].github_issue_number = Some(number);
        Ok(())
    }

    async fn create_branch(&self, state: &mut RunState, idx: usize, item: &WorkItem) -> Result<()> {
        let ticket = require(state.issues[idx].github_issue_number, "ticket number")?;
        let integration = &self.config.integration;
        self.vcs
            .checkout(integration, false)
            .await
            .with_context(|| format!("Failed to check out {integration}"))?;
        self.pull_best_effort(integration).await;

        let branch = feature_branch_name(
            &self.config.feature_prefix,
            ticket,
            &item.title,
            self.config.slug_max_len,
        );
        self.vcs
            .checkout(&branch, true)
            .await
            .with_context(|| format!("Failed to create branch {branch}"))?;
        info!(issue = idx + 1, branch = %branch, "branch created");
        state.issues[idx].branch_name = Some(branch);
        Ok(())
    }

    async fn generate_code(
        &self,
        state: &mut RunState,
        idx: usize,
        item: &WorkItem,
        plan: &str,
    ) -> Result<()> {
        let branch = state.issues[idx]
            .branch_name
            .clone()
            .context("Issue has no branch recorded")?;
        self.ensure_on_branch(&branch).await?;

        let files = existing_files_summary(&self.config.project_dir);
        let mut action = GenerateCode {
            generator: self.generator.as_ref(),
            prompt: prompts::build_implement_prompt(item, plan, &files),
            dir: &self.config.project_dir,
            timeout: self.config.timeouts.implement,
        };
        let policy = RetryPolicy::new(self.config.max_attempts());
        match policy.run("code generation", &mut action).await {
            RetryOutcome::Succeeded { attempts, .. } => {
                info!(issue = idx + 1, attempts, "code generated");
                Ok(())
            }
            RetryOutcome::Exhausted {
                attempts,
                last_failure,
            } => Err(anyhow::Error::new(last_failure)
                .context(format!("Code generation failed after {attempts} attempts"))),
            RetryOutcome::Failed(err) => Err(err.context("Code generation failed")),
        }
    }

    async fn commit_code(&self, state: &mut RunState, idx: usize, item: &WorkItem) -> Result<()> {
        let issue = &state.issues[idx];
        let ticket = require(issue.github_issue_number, "ticket number")?;
        let branch = issue
            .branch_name
            .clone()
            .context("Issue has no branch recorded")?;
        self.ensure_on_branch(&branch).await?;

        if self.vcs.has_changes().await.context("Failed to read status")? {
            self.vcs.add_all().await.context("Failed to stage changes")?;
            self.vcs
                .commit(&format!("Implement: {}\n\nCloses #{ticket}", item.title))
                .await
                .context("Failed to commit")?;
            info!(issue = idx + 1, "changes committed");
        } else {
            warn!(issue = idx + 1, "no changes to commit");
        }
        self.vcs
            .push(&branch, true)
            .await
            .with_context(|| format!("Failed to push {branch}"))?;
        Ok(())
    }

    async fn open_change_request(
        &self,
        state: &mut RunState,
        idx: usize,
        item: &WorkItem,
    ) -> Result<()> {
        let issue = &state.issues[idx];
        let ticket = require(issue.github_issue_number, "ticket number")?;
        let branch = issue
            .branch_name
            .clone()
            .context("Issue has no branch recorded")?;
        let integration = &self.config.integration;

        let diff = self
            .vcs
            .diff(integration, &branch)
            .await
            .context("Failed to diff feature branch")?;
        let diff = truncate_diff(&diff, self.config.diff_cap_chars);
        let generated = self
            .generator
            .generate(
                &prompts::build_pr_body_prompt(item, &diff),
                self.config.timeouts.generate,
            )
            .await
            .context("Failed to generate change request description")?;
        let body = format!("Implements #{ticket}\n\n{}", generated.trim());

        let number = self
            .hosting
            .create_change_request(&item.title, &body, integration, &branch)
            .await
            .context("Failed to open change request")?;
        info!(issue = idx + 1, pr = number, "change request opened");
        state.issues[idx].pr_number = Some(number);
        Ok(())
    }

    async fn review_change_request(
        &self,
        state: &mut RunState,
        idx: usize,
        item: &WorkItem,
    ) -> Result<()> {
        let pr = require(state.issues[idx].pr_number, "change request number")?;
        let diff = self
            .hosting
            .diff_change_request(pr)
            .await
            .context("Failed to fetch change request diff")?;
        let diff = truncate_diff(&diff, self.config.diff_cap_chars);
        let reply = self
            .generator
            .generate(
                &prompts::build_review_prompt(&item.title, &diff),
                self.config.timeouts.generate,
            )
            .await
            .context("Failed to review change request")?;

        // Advisory only: no verdict blocks the issue
        match ReviewVerdict::from_reply(&reply) {
            ReviewVerdict::Approved => info!(pr, review = %reply.trim(), "review approved"),
            ReviewVerdict::Concerns => {
                warn!(pr, review = %reply.trim(), "review flagged concerns; proceeding")
            }
            ReviewVerdict::Unclear => {
                warn!(pr, review = %reply.trim(), "review verdict unclear; proceeding")
            }
        }
        Ok(())
    }

    async fn merge_feature(&self, state: &mut RunState, idx: usize, item: &WorkItem) -> Result<()> {
        let issue = &state.issues[idx];
        let pr = require(issue.pr_number, "change request number")?;
        let ticket = require(issue.github_issue_number, "ticket number")?;
        let branch = issue
            .branch_name
            .clone()
            .context("Issue has no branch recorded")?;
        let integration = &self.config.integration;

        match self
            .hosting
            .merge_change_request(pr, self.config.squash_feature_merges, true)
            .await
        {
            Ok(status) => info!(pr, status = %status, "change request merged"),
            Err(e) => {
                warn!(pr, error = %e, "remote merge failed; merging locally");
                self.merge_locally(&branch, ticket, &item.title).await?;
            }
        }

        self.vcs
            .checkout(integration, false)
            .await
            .with_context(|| format!("Failed to check out {integration}"))?;
        self.pull_best_effort(integration).await;
        Ok(())
    }

    /// Merge `branch` into the integration line, resolving conflicts with the
    /// generation service, and push the result.
    async fn merge_locally(&self, branch: &str, ticket: u64, title: &str) -> Result<()> {
        let integration = &self.config.integration;
        self.vcs
            .checkout(integration, false)
            .await
            .with_context(|| format!("Failed to check out {integration}"))?;
        self.pull_best_effort(integration).await;

        match self.vcs.merge(branch).await {
            Ok(()) => info!(branch, "merged locally"),
            Err(e) if e.is_merge_conflict() => {
                warn!(branch, "merge conflict; resolving");
                let report = self.resolve_conflicts(title).await?;
                info!(
                    resolved = report.resolved.len(),
                    unresolved = report.unresolved.len(),
                    "conflict resolution finished"
                );
                self.vcs.add_all().await.context("Failed to stage resolution")?;
                self.vcs
                    .commit(&format!(
                        "Merge {branch} into {integration} (conflicts resolved)\n\nCloses #{ticket}"
                    ))
                    .await
                    .context("Failed to commit merge resolution")?;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to merge {branch} into {integration}"));
            }
        }

        self.vcs
            .push(integration, false)
            .await
            .with_context(|| format!("Failed to push {integration}"))?;
        Ok(())
    }

    async fn close_ticket(&self, state: &mut RunState, idx: usize) -> Result<()> {
        let issue = &state.issues[idx];
        let ticket = require(issue.github_issue_number, "ticket number")?;
        let pr = require(issue.pr_number, "change request number")?;
        self.hosting
            .close_ticket(ticket, &format!("Implemented and merged via PR #{pr}"))
            .await
            .context("Failed to close ticket")?;
        info!(issue = idx + 1, ticket, "ticket closed");
        Ok(())
    }
}
