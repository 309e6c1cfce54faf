//! Project plan and issue list generation.
//!
//! Both are generated once and persisted next to the state file
//! (`plan.md`, `issues.json`); on resume they are read back from disk.

use anyhow::{Context, Result};
use conveyor_common::{IssueState, RunState, WorkItem};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::errors::PlanError;
use crate::parse::{extract_json_array, strip_code_fences};
use crate::pipeline::Pipeline;
use crate::prompts;
use crate::sequencer::sequence;

/// Parse a generated issue list into validated work items.
pub fn parse_work_items(reply: &str) -> Result<Vec<WorkItem>, PlanError> {
    let text = strip_code_fences(reply);
    let json = extract_json_array(&text).ok_or(PlanError::MissingJson)?;
    let items: Vec<WorkItem> = serde_json::from_str(&json).map_err(PlanError::InvalidJson)?;
    validate_work_items(&items)?;
    Ok(items)
}

pub fn validate_work_items(items: &[WorkItem]) -> Result<(), PlanError> {
    if items.is_empty() {
        return Err(PlanError::Empty);
    }
    let mut seen = HashSet::new();
    for item in items {
        if item.phase == 0 {
            return Err(PlanError::InvalidPhase {
                title: item.title.clone(),
            });
        }
        if !seen.insert(item.title.as_str()) {
            return Err(PlanError::DuplicateTitle(item.title.clone()));
        }
    }
    Ok(())
}

/// Check a reloaded issue list against the saved per-issue state.
pub fn check_matches_state(items: &[WorkItem], issues: &[IssueState]) -> Result<(), PlanError> {
    let len = items.len().max(issues.len());
    for index in 0..len {
        let expected = issues.get(index).map(|i| i.title.as_str());
        let found = items.get(index).map(|i| i.title.as_str());
        if expected != found {
            return Err(PlanError::StateMismatch {
                index,
                expected: expected.unwrap_or("<missing>").to_string(),
                found: found.unwrap_or("<missing>").to_string(),
            });
        }
    }
    Ok(())
}

fn load_work_items(path: &Path) -> Result<Vec<WorkItem>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

impl Pipeline {
    /// The project plan, generating and saving it on first use.
    pub async fn ensure_plan(&self, state: &mut RunState) -> Result<String> {
        let path = self.config.plan_file();
        if state.plan_generated {
            info!(path = %path.display(), "plan already generated; loading");
            return fs::read_to_string(&path)
                .with_context(|| format!("Failed to read plan at {}", path.display()));
        }

        info!("generating project plan");
        let plan = self
            .generator
            .generate(
                &prompts::build_plan_prompt(&state.project_idea, &state.tech_stack),
                self.config.timeouts.generate,
            )
            .await
            .context("Failed to generate plan")?;

        fs::create_dir_all(&self.config.project_dir).with_context(|| {
            format!("Failed to create {}", self.config.project_dir.display())
        })?;
        fs::write(&path, &plan)
            .with_context(|| format!("Failed to write plan to {}", path.display()))?;
        state.plan_generated = true;
        self.checkpoint(state)?;
        info!(path = %path.display(), "plan saved");
        Ok(plan)
    }

    /// The sequenced work items, generating them on first use and creating
    /// one issue state per item.
    pub async fn ensure_issues(&self, state: &mut RunState, plan: &str) -> Result<Vec<WorkItem>> {
        let path = self.config.issues_file();
        if state.issues_json_generated {
            info!(path = %path.display(), "issue list already generated; loading");
            let items = load_work_items(&path)?;
            check_matches_state(&items, &state.issues)?;
            return Ok(items);
        }

        info!("generating issue list from plan");
        // Long plans produce long lists; allow the implementation budget
        let reply = self
            .generator
            .generate(
                &prompts::build_issues_json_prompt(plan),
                self.config.timeouts.implement,
            )
            .await
            .context("Failed to generate issue list")?;
        let items = parse_work_items(&reply)?;

        let sequenced = sequence(items);
        if !sequenced.unresolved.is_empty() {
            if self.config.policy.halt_on_unresolved_dependencies {
                return Err(PlanError::UnresolvedDependencies(sequenced.unresolved).into());
            }
            warn!(
                titles = ?sequenced.unresolved,
                "issues with unresolvable dependencies appended at the end of their phase"
            );
        }
        let items = sequenced.items;

        let json = serde_json::to_string_pretty(&items).context("Failed to serialize issues")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        state.issues = items
            .iter()
            .enumerate()
            .map(|(i, item)| IssueState::new(i, item.title.clone(), item.phase, item.priority))
            .collect();
        state.issues_json_generated = true;
        self.checkpoint(state)?;
        info!(
            issues = items.len(),
            phases = state.phases().len(),
            "issue list generated"
        );
        Ok(items)
    }
}
