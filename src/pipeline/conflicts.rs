//! Merge conflict fallback.
//!
//! Each conflicted file is rewritten from a generated resolution. A reply
//! that still carries marker tokens gets exactly one corrective request, and
//! whatever comes back is written as-is.

use anyhow::{Context, Result, bail};
use std::fs;
use tracing::{info, warn};

use crate::parse::markers::{contains_any_marker, has_conflict_start};
use crate::parse::strip_code_fences;
use crate::pipeline::Pipeline;
use crate::prompts;

/// What happened to each conflicted path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub resolved: Vec<String>,
    /// Reported as conflicted but without markers, or unreadable
    pub skipped: Vec<String>,
    /// Written back with marker tokens still present
    pub unresolved: Vec<String>,
    pub corrective_calls: usize,
}

impl ConflictReport {
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }
}

impl Pipeline {
    /// Resolve every conflicted file in the working tree. `context` names
    /// the merge for the generation prompt. Staging and committing are left
    /// to the caller.
    pub async fn resolve_conflicts(&self, context: &str) -> Result<ConflictReport> {
        let files = self
            .vcs
            .conflicted_files()
            .await
            .context("Failed to list conflicted files")?;
        info!(files = files.len(), context, "resolving merge conflicts");

        let mut report = ConflictReport::default();
        for path in files {
            let full = self.config.project_dir.join(&path);
            let content = match fs::read_to_string(&full) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path, error = %e, "cannot read conflicted file; skipping");
                    report.skipped.push(path);
                    continue;
                }
            };
            if !has_conflict_start(&content) {
                warn!(path = %path, "no conflict markers found; skipping");
                report.skipped.push(path);
                continue;
            }

            let reply = self
                .generator
                .generate(
                    &prompts::build_resolve_conflict_prompt(&path, &content, context),
                    self.config.timeouts.conflict,
                )
                .await
                .with_context(|| format!("Failed to resolve conflict in {path}"))?;
            let mut resolved = strip_code_fences(&reply);

            if contains_any_marker(&resolved) {
                warn!(path = %path, "resolution still has markers; asking for cleanup");
                report.corrective_calls += 1;
                let reply = self
                    .generator
                    .generate(
                        &prompts::build_marker_cleanup_prompt(&resolved),
                        self.config.timeouts.conflict_retry,
                    )
                    .await
                    .with_context(|| format!("Failed to clean markers in {path}"))?;
                resolved = strip_code_fences(&reply);
            }

            fs::write(&full, &resolved)
                .with_context(|| format!("Failed to write resolved {}", full.display()))?;
            if contains_any_marker(&resolved) {
                warn!(path = %path, "markers remain after cleanup; written anyway");
                report.unresolved.push(path);
            } else {
                info!(path = %path, "conflict resolved");
                report.resolved.push(path);
            }
        }

        if !report.is_clean() && self.config.policy.halt_on_unresolved_conflicts {
            bail!(
                "Conflict markers remain in: {}",
                report.unresolved.join(", ")
            );
        }
        Ok(report)
    }
}
