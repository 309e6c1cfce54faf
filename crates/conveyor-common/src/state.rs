use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::work_item::Priority;

/// Coarse status of a single issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::InProgress => write!(f, "in_progress"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Per-issue lifecycle cursor.
///
/// Variants are declared in lifecycle order and the derived `Ord` follows
/// declaration order, so "has this issue passed step S" is a single
/// comparison. The serialized names are part of the state file format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SubStep {
    #[default]
    NotStarted,
    IssueCreated,
    BranchCreated,
    CodeGenerated,
    Committed,
    PrCreated,
    PrReviewed,
    TestsPassed,
    PrMerged,
    IssueClosed,
}

impl SubStep {
    /// Every step in lifecycle order.
    pub const ALL: [SubStep; 10] = [
        SubStep::NotStarted,
        SubStep::IssueCreated,
        SubStep::BranchCreated,
        SubStep::CodeGenerated,
        SubStep::Committed,
        SubStep::PrCreated,
        SubStep::PrReviewed,
        SubStep::TestsPassed,
        SubStep::PrMerged,
        SubStep::IssueClosed,
    ];

    /// Position of this step in the lifecycle.
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// The step that follows this one, or `None` for the terminal step.
    pub fn next(self) -> Option<SubStep> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }

    /// Steps strictly after this one.
    pub fn remaining(self) -> impl Iterator<Item = SubStep> {
        Self::ALL.into_iter().skip(self.ordinal() + 1)
    }

    pub fn is_terminal(self) -> bool {
        self == SubStep::IssueClosed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubStep::NotStarted => "not_started",
            SubStep::IssueCreated => "issue_created",
            SubStep::BranchCreated => "branch_created",
            SubStep::CodeGenerated => "code_generated",
            SubStep::Committed => "committed",
            SubStep::PrCreated => "pr_created",
            SubStep::PrReviewed => "pr_reviewed",
            SubStep::TestsPassed => "tests_passed",
            SubStep::PrMerged => "pr_merged",
            SubStep::IssueClosed => "issue_closed",
        }
    }
}

impl fmt::Display for SubStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one work item through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueState {
    /// Stable position in the sequenced issue list
    pub index: usize,
    pub title: String,
    pub phase: u32,
    pub priority: Priority,
    #[serde(default)]
    pub github_issue_number: Option<u64>,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub pr_number: Option<u64>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub sub_step: SubStep,
}

impl IssueState {
    pub fn new(index: usize, title: impl Into<String>, phase: u32, priority: Priority) -> Self {
        Self {
            index,
            title: title.into(),
            phase,
            priority,
            github_issue_number: None,
            branch_name: None,
            pr_number: None,
            status: StepStatus::Pending,
            sub_step: SubStep::NotStarted,
        }
    }

    /// True if this issue has already completed `step`.
    pub fn past_step(&self, step: SubStep) -> bool {
        self.sub_step >= step
    }

    /// Move the cursor forward to `step`.
    ///
    /// The cursor never moves backwards; returns `false` (and leaves the
    /// cursor untouched) when `step` is not ahead of the current position.
    pub fn advance_to(&mut self, step: SubStep) -> bool {
        if step > self.sub_step {
            self.sub_step = step;
            true
        } else {
            false
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sub_step.is_terminal()
    }
}

/// The trunk-bound change request opened for a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasePr {
    pub number: u64,
    /// Set once the remote merge has succeeded
    #[serde(default)]
    pub merged: bool,
}

/// Durable state of a whole project run.
///
/// Field names are the on-disk format and must stay stable so older state
/// files keep resuming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    pub project_idea: String,
    pub tech_stack: String,
    pub repo_name: String,
    /// `owner/repo`
    pub repo_full_name: String,
    pub project_dir: String,

    pub plan_generated: bool,
    pub issues_json_generated: bool,
    pub repo_created: bool,
    pub scaffolding_done: bool,
    pub staging_branch_created: bool,

    pub issues: Vec<IssueState>,

    pub phases_merged: Vec<u32>,

    /// Phase change requests by phase number, recorded as soon as they open
    pub phase_prs: BTreeMap<u32, PhasePr>,
}

impl RunState {
    pub fn new(
        project_idea: impl Into<String>,
        tech_stack: impl Into<String>,
        repo_name: impl Into<String>,
        project_dir: impl Into<String>,
    ) -> Self {
        Self {
            project_idea: project_idea.into(),
            tech_stack: tech_stack.into(),
            repo_name: repo_name.into(),
            project_dir: project_dir.into(),
            ..Self::default()
        }
    }

    pub fn is_phase_merged(&self, phase: u32) -> bool {
        self.phases_merged.contains(&phase)
    }

    /// Record a phase as merged to trunk. Idempotent.
    pub fn mark_phase_merged(&mut self, phase: u32) {
        if !self.is_phase_merged(phase) {
            self.phases_merged.push(phase);
        }
    }

    pub fn phase_pr(&self, phase: u32) -> Option<PhasePr> {
        self.phase_prs.get(&phase).copied()
    }

    /// Distinct phase numbers in ascending order.
    pub fn phases(&self) -> Vec<u32> {
        let mut phases: Vec<u32> = self.issues.iter().map(|i| i.phase).collect();
        phases.sort_unstable();
        phases.dedup();
        phases
    }

    /// Indices of the issues belonging to `phase`, in sequenced order.
    pub fn phase_issue_indices(&self, phase: u32) -> Vec<usize> {
        self.issues
            .iter()
            .enumerate()
            .filter(|(_, issue)| issue.phase == phase)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn phase_complete(&self, phase: u32) -> bool {
        self.issues
            .iter()
            .filter(|issue| issue.phase == phase)
            .all(IssueState::is_closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(step: SubStep) -> IssueState {
        let mut issue = IssueState::new(0, "Add login", 1, Priority::High);
        issue.sub_step = step;
        issue
    }

    #[test]
    fn test_ordinal_matches_declaration_order() {
        for (i, step) in SubStep::ALL.iter().enumerate() {
            assert_eq!(step.ordinal(), i);
        }
        assert!(SubStep::NotStarted < SubStep::IssueCreated);
        assert!(SubStep::TestsPassed < SubStep::PrMerged);
    }

    #[test]
    fn test_past_step_is_ordinal_comparison() {
        for current in SubStep::ALL {
            let state = issue(current);
            for target in SubStep::ALL {
                assert_eq!(
                    state.past_step(target),
                    current.ordinal() >= target.ordinal(),
                    "current={current} target={target}"
                );
            }
        }
    }

    #[test]
    fn test_advance_never_moves_backwards() {
        let mut state = issue(SubStep::PrCreated);
        assert!(!state.advance_to(SubStep::BranchCreated));
        assert_eq!(state.sub_step, SubStep::PrCreated);
        assert!(!state.advance_to(SubStep::PrCreated));
        assert!(state.advance_to(SubStep::PrReviewed));
        assert_eq!(state.sub_step, SubStep::PrReviewed);
    }

    #[test]
    fn test_next_and_remaining() {
        assert_eq!(SubStep::NotStarted.next(), Some(SubStep::IssueCreated));
        assert_eq!(SubStep::IssueClosed.next(), None);
        let rest: Vec<_> = SubStep::TestsPassed.remaining().collect();
        assert_eq!(rest, vec![SubStep::PrMerged, SubStep::IssueClosed]);
        assert_eq!(SubStep::IssueClosed.remaining().count(), 0);
    }

    #[test]
    fn test_sub_step_serializes_snake_case() {
        let json = serde_json::to_string(&SubStep::PrReviewed).unwrap();
        assert_eq!(json, "\"pr_reviewed\"");
        let step: SubStep = serde_json::from_str("\"tests_passed\"").unwrap();
        assert_eq!(step, SubStep::TestsPassed);
        assert!(serde_json::from_str::<SubStep>("\"shipped\"").is_err());
    }

    #[test]
    fn test_run_state_field_names_are_stable() {
        let mut state = RunState::new("idea", "rust", "demo", "/tmp/demo");
        state.issues.push(IssueState::new(0, "A", 1, Priority::Low));
        state.mark_phase_merged(1);
        let value = serde_json::to_value(&state).unwrap();
        for key in [
            "project_idea",
            "tech_stack",
            "repo_name",
            "repo_full_name",
            "project_dir",
            "plan_generated",
            "issues_json_generated",
            "repo_created",
            "scaffolding_done",
            "staging_branch_created",
            "issues",
            "phases_merged",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        let issue = &value["issues"][0];
        assert_eq!(issue["sub_step"], "not_started");
        assert_eq!(issue["status"], "pending");
        assert!(issue["github_issue_number"].is_null());
    }

    #[test]
    fn test_phase_prs_round_trip_and_default_when_absent() {
        let mut state = RunState::default();
        state.phase_prs.insert(
            2,
            PhasePr {
                number: 41,
                merged: true,
            },
        );
        let json = serde_json::to_string(&state).unwrap();
        let back: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.phase_pr(2), Some(PhasePr { number: 41, merged: true }));

        // State files written before phase PRs were tracked still load
        let older: RunState = serde_json::from_str(r#"{"phases_merged": [1]}"#).unwrap();
        assert!(older.phase_prs.is_empty());
        assert_eq!(older.phase_pr(1), None);
    }

    #[test]
    fn test_mark_phase_merged_is_idempotent() {
        let mut state = RunState::default();
        state.mark_phase_merged(2);
        state.mark_phase_merged(2);
        assert_eq!(state.phases_merged, vec![2]);
    }

    #[test]
    fn test_phase_queries() {
        let mut state = RunState::default();
        state.issues.push(IssueState::new(0, "A", 2, Priority::High));
        state.issues.push(IssueState::new(1, "B", 1, Priority::High));
        state.issues.push(IssueState::new(2, "C", 2, Priority::Low));
        assert_eq!(state.phases(), vec![1, 2]);
        assert_eq!(state.phase_issue_indices(2), vec![0, 2]);
        assert!(!state.phase_complete(2));
        state.issues[0].sub_step = SubStep::IssueClosed;
        state.issues[2].sub_step = SubStep::IssueClosed;
        assert!(state.phase_complete(2));
    }
}
