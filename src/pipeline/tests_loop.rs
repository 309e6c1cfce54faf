//! Test plan execution and repair.
//!
//! The change request's `Test Plan` checklist is handed to the generation
//! service, the structured results are written back into the description,
//! and failing items get a fix attempt before the next round. Unparseable or
//! still-failing results degrade to a warning unless
//! `policy.halt_on_failing_tests` is set.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use conveyor_common::{RunState, ToolError, WorkItem};
use std::fmt;
use tracing::{error, info, warn};

use crate::parse::{
    TestReport, TestResultsError, TestStatus, annotate_test_plan, extract_test_items,
    parse_test_results,
};
use crate::pipeline::Pipeline;
use crate::pipeline::retry::{Attempt, AttemptResult, Attemptable, RetryOutcome, RetryPolicy};
use crate::prompts;

/// Why a test round did not come back clean.
#[derive(Debug)]
pub enum TestRoundFailure {
    ExecutionFailed(ToolError),
    Unparseable(TestResultsError),
    Failing(TestReport),
}

impl fmt::Display for TestRoundFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestRoundFailure::ExecutionFailed(e) => write!(f, "test execution failed: {e}"),
            TestRoundFailure::Unparseable(e) => write!(f, "unparseable results: {e}"),
            TestRoundFailure::Failing(report) => {
                write!(f, "{} item(s) failing", report.failures().len())
            }
        }
    }
}

struct ExecuteTestPlan<'a> {
    pipeline: &'a Pipeline,
    pr: u64,
    branch: &'a str,
    title: &'a str,
    items: Vec<String>,
    feature: String,
    tech_stack: &'a str,
}

impl ExecuteTestPlan<'_> {
    /// Rewrite the checklist in the change request with `report`.
    async fn publish(&self, report: &TestReport) -> Result<()> {
        let hosting = &self.pipeline.hosting;
        let body = hosting
            .view_change_request(self.pr)
            .await
            .context("Failed to read change request description")?;
        let updated = annotate_test_plan(&body, &report.results);
        hosting
            .edit_change_request(self.pr, &updated)
            .await
            .context("Failed to update change request description")?;
        info!(pr = self.pr, "test results written to change request");
        Ok(())
    }
}

#[async_trait]
impl Attemptable for ExecuteTestPlan<'_> {
    type Output = TestReport;
    type Failure = TestRoundFailure;

    async fn attempt(&mut self, attempt: Attempt) -> AttemptResult<TestReport, TestRoundFailure> {
        info!(attempt = %attempt, items = self.items.len(), "executing test plan");
        let prompt =
            prompts::build_execute_test_plan_prompt(&self.items, &self.feature, self.tech_stack);
        let config = &self.pipeline.config;
        let output = match self
            .pipeline
            .generator
            .implement(&prompt, &config.project_dir, config.timeouts.test)
            .await
        {
            Ok(output) => output,
            Err(e) => return AttemptResult::Retryable(TestRoundFailure::ExecutionFailed(e)),
        };

        let report = match parse_test_results(&output) {
            Ok(report) => report,
            Err(e) => return AttemptResult::Retryable(TestRoundFailure::Unparseable(e)),
        };
        if !report.rejected.is_empty() {
            warn!(lines = ?report.rejected, "ignored malformed result lines");
        }
        info!(
            passed = report.count(TestStatus::Pass),
            failed = report.count(TestStatus::Fail),
            skipped = report.count(TestStatus::Skip),
            "test results"
        );

        if let Err(e) = self.publish(&report).await {
            return AttemptResult::Terminal(e);
        }
        if report.has_failures() {
            AttemptResult::Retryable(TestRoundFailure::Failing(report))
        } else {
            AttemptResult::Success(report)
        }
    }

    async fn recover(&mut self, attempt: Attempt, failure: &TestRoundFailure) -> Result<()> {
        let TestRoundFailure::Failing(report) = failure else {
            return Ok(());
        };
        let failures = report.failures();
        info!(failing = failures.len(), attempt = %attempt, "attempting fix");

        let prompt =
            prompts::build_fix_failing_tests_prompt(&failures, &self.feature, self.tech_stack);
        let config = &self.pipeline.config;
        if let Err(e) = self
            .pipeline
            .generator
            .implement(&prompt, &config.project_dir, config.timeouts.implement)
            .await
        {
            error!(error = %e, "fix attempt failed");
        }

        let vcs = &self.pipeline.vcs;
        if !vcs.has_changes().await.context("Failed to read status")? {
            warn!("no changes after fix attempt");
            return Ok(());
        }
        vcs.add_all().await.context("Failed to stage fix")?;
        vcs.commit(&format!(
            "Fix failing tests (attempt {}): {}",
            attempt.number, self.title
        ))
        .await
        .context("Failed to commit fix")?;
        vcs.push(self.branch, false)
            .await
            .with_context(|| format!("Failed to push {}", self.branch))?;
        info!("fix committed and pushed");
        Ok(())
    }
}

impl Pipeline {
    /// Execute the change request's test plan, fixing failures between
    /// rounds. A plan with no checklist items is skipped.
    pub(crate) async fn run_test_plan(
        &self,
        state: &mut RunState,
        idx: usize,
        item: &WorkItem,
    ) -> Result<()> {
        let issue = &state.issues[idx];
        let pr = issue
            .pr_number
            .context("Issue has no change request recorded")?;
        let branch = issue
            .branch_name
            .clone()
            .context("Issue has no branch recorded")?;

        self.vcs
            .checkout(&branch, false)
            .await
            .with_context(|| format!("Failed to check out {branch}"))?;
        let body = self
            .hosting
            .view_change_request(pr)
            .await
            .context("Failed to read change request description")?;
        let items = extract_test_items(&body);
        if items.is_empty() {
            warn!(pr, "no test plan items found; skipping test execution");
            return Ok(());
        }

        let mut action = ExecuteTestPlan {
            pipeline: self,
            pr,
            branch: &branch,
            title: &item.title,
            items,
            feature: format!("{}: {}", item.title, item.description),
            tech_stack: &state.tech_stack,
        };
        let policy = RetryPolicy::new(self.config.max_attempts());
        match policy.run("test plan", &mut action).await {
            RetryOutcome::Succeeded { attempts, .. } => {
                info!(pr, attempts, "all test plan items pass");
                Ok(())
            }
            RetryOutcome::Exhausted {
                attempts,
                last_failure,
            } => {
                if self.config.policy.halt_on_failing_tests {
                    bail!("Test plan still not passing after {attempts} attempts: {last_failure}");
                }
                warn!(pr, attempts, outcome = %last_failure, "test plan not passing; proceeding");
                Ok(())
            }
            RetryOutcome::Failed(err) => Err(err.context("Test plan execution failed")),
        }
    }
}
