//! Prompt templates sent to the generation service.
//!
//! The pipeline depends only on the structured parts of the replies (the
//! JSON issue array, the `APPROVED`/`CONCERNS` prefix, the test results
//! block, raw file contents); the wording here can change freely.

use conveyor_common::WorkItem;

use crate::parse::TestResult;
use crate::parse::test_plan::{RESULTS_END, RESULTS_START};

/// Project plan in Markdown.
pub fn build_plan_prompt(idea: &str, tech_stack: &str) -> String {
    format!(
        "You are a senior software architect. Write a detailed project plan in Markdown.\n\n\
         ## Project Idea\n{idea}\n\n\
         ## Tech Stack\n{tech_stack}\n\n\
         ## Required Output Format\n\
         Output ONLY the plan, using this structure:\n\n\
         # Project Plan: [Project Name]\n\n\
         ## Overview\n[2-3 sentence summary]\n\n\
         ## Tech Stack\n[All technologies]\n\n\
         ## Phases\n\
         ### Phase N: [Phase Name]\n\
         **Goal:** [What this phase accomplishes]\n\n\
         #### Features:\n\
         - **Feature Name**: [Description]\n  \
         - Function/component signatures and responsibilities\n  \
         - Files to create or modify\n\n\
         #### Dependencies:\n- [What must be completed before this phase]\n\n\
         ## File Structure\n[Expected directory tree at completion]\n\n\
         Rules:\n\
         - Order phases by dependency; Phase 1 depends on nothing\n\
         - Each phase must be independently testable\n\
         - Keep phases small (2-5 features each)\n\
         - Be specific about function names, file paths and data structures\n"
    )
}

/// JSON array of work items derived from the plan.
pub fn build_issues_json_prompt(plan: &str) -> String {
    format!(
        "You are converting a project plan into a JSON array of GitHub issues.\n\n\
         ## The Plan\n{plan}\n\n\
         ## Required Output\n\
         Return ONLY a valid JSON array. No markdown fences, no explanation.\n\n\
         Each element must have exactly these fields:\n\
         {{\n  \
         \"title\": \"Short descriptive title\",\n  \
         \"description\": \"Detailed description of what to implement\",\n  \
         \"problem_statement\": \"Why this is needed\",\n  \
         \"proposed_solution\": \"How to implement it\",\n  \
         \"technical_details\": \"Specific functions, files, data structures\",\n  \
         \"acceptance_criteria\": [\"Criterion 1\", \"Criterion 2\"],\n  \
         \"expected_outcome\": \"What success looks like\",\n  \
         \"optional_enhancements\": [\"Enhancement 1\"],\n  \
         \"related_files\": [\"path/to/file.ext\"],\n  \
         \"phase\": 1,\n  \
         \"priority\": \"high\",\n  \
         \"dependencies\": [],\n  \
         \"labels\": [\"phase-1\", \"feature\"]\n\
         }}\n\n\
         Rules:\n\
         - \"dependencies\" lists titles of other issues in the SAME phase that must land first\n\
         - Every issue has a phase number (starting at 1) matching the plan\n\
         - Titles are concise and unique\n\
         - Setup and infrastructure issues belong to Phase 1\n\
         - priority is one of \"high\", \"medium\", \"low\"\n"
    )
}

/// Initial scaffolding, executed with file-system access.
pub fn build_scaffolding_prompt(idea: &str, tech_stack: &str, plan: &str) -> String {
    format!(
        "You are setting up the initial project scaffolding.\n\n\
         ## Project\n{idea}\n\n\
         ## Tech Stack\n{tech_stack}\n\n\
         ## Plan Overview\n{plan}\n\n\
         ## Instructions\n\
         1. Create all necessary directories\n\
         2. Create configuration files appropriate for the tech stack\n\
         3. Create entry points with minimal boilerplate\n\
         4. Create a .gitignore appropriate for the tech stack\n\
         5. Do NOT implement any features yet\n\
         6. The project must build or start without errors afterwards\n\n\
         Create all files now.\n"
    )
}

/// Implementation of a single work item, executed with file-system access.
pub fn build_implement_prompt(item: &WorkItem, plan: &str, files_summary: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are implementing a specific feature for an existing project.\n\n");
    prompt.push_str(&format!(
        "## Issue to Implement\n**Title:** {}\n\n**Details:**\n{}\n\n",
        item.title,
        item.ticket_body()
    ));
    prompt.push_str(&format!("## Project Plan Context\n{plan}\n\n"));
    prompt.push_str(&format!("## Existing Project Files\n{files_summary}\n\n"));
    prompt.push_str(
        "## Instructions\n\
         1. Read the existing code to understand the current state\n\
         2. Implement ONLY what this issue describes\n\
         3. Follow existing conventions and patterns\n\
         4. Add tests where appropriate for this feature\n\
         5. Do not modify files unrelated to this issue\n\
         6. The project must still build and run after your changes\n\n\
         Implement the feature now.\n",
    );
    prompt
}

/// Change request description with a `Test Plan` checklist.
pub fn build_pr_body_prompt(item: &WorkItem, diff: &str) -> String {
    format!(
        "You are writing a GitHub pull request description.\n\n\
         Use this structure, in clean GitHub Markdown:\n\n\
         # Summary\n\
         - The problem this PR solves and what changed at a functional level\n\n\
         # Changes\n\
         - Changes grouped logically, with what changed in each file and why\n\n\
         # Behavior Details\n\
         - Behavior before and after, defaults, fallbacks, configuration\n\n\
         # Test Plan\n\
         - Markdown checkboxes (- [ ]), one verifiable step per line\n\
         - Cover the happy path, edge cases, negative cases and regressions\n\
         - Every step must be something a reviewer can actually execute\n\n\
         Constraints: professional and concise, no emojis, output ONLY the description.\n\n\
         ---\n\n\
         ## Issue Title\n{}\n\n\
         ## Issue Description\n{}\n\n\
         ## Code Diff\n```diff\n{diff}\n```\n\n\
         Write the PR description now:\n",
        item.title,
        item.ticket_body()
    )
}

/// Phase-level description for the integration-to-trunk change request.
pub fn build_phase_pr_body_prompt(
    phase: u32,
    integration: &str,
    trunk: &str,
    items: &[&WorkItem],
    diff: &str,
) -> String {
    let features = items
        .iter()
        .map(|item| {
            let summary: String = item.description.chars().take(120).collect();
            format!("- {}: {}", item.title, summary)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are writing a GitHub pull request description for a phase merge ({integration} -> {trunk}).\n\n\
         This PR merges every Phase {phase} feature from {integration} into {trunk}.\n\n\
         ## Features included in this phase\n{features}\n\n\
         ## Code Diff\n```diff\n{diff}\n```\n\n\
         Use this structure:\n\n\
         # Summary\n- What Phase {phase} delivers as a whole\n\n\
         # Changes\n- Changes grouped by feature area, with what was added and why\n\n\
         # Test Plan\n- Markdown checkboxes (- [ ]) verifying each feature and guarding against regressions\n\n\
         Constraints: professional and concise, no emojis, output ONLY the description.\n"
    )
}

/// Advisory review; the reply must start with `APPROVED` or `CONCERNS`.
pub fn build_review_prompt(title: &str, diff: &str) -> String {
    format!(
        "You are reviewing a pull request for the issue: \"{title}\"\n\n\
         Here is the diff:\n\n```diff\n{diff}\n```\n\n\
         Evaluate:\n\
         1. Does the diff implement what the issue asked for?\n\
         2. Are there obvious bugs, security issues or missing error handling?\n\
         3. Is it a reasonable implementation?\n\n\
         Respond with either:\n\
         APPROVED - [brief reason]\n\
         or\n\
         CONCERNS - [specific concerns]\n\n\
         Keep the response to 2-3 sentences.\n"
    )
}

/// Resolve one conflicted file, preferring the incoming branch.
pub fn build_resolve_conflict_prompt(path: &str, content: &str, context: &str) -> String {
    format!(
        "You are resolving a merge conflict in: {path}\n\n\
         The file contains merge conflict markers (<<<<<<, ======, >>>>>>).\n\n\
         ## Context\n\
         The conflict arose while merging: {context}\n\n\
         ## File with conflicts\n```\n{content}\n```\n\n\
         ## Instructions\n\
         1. Keep both sides' changes where possible\n\
         2. Prefer the incoming branch's changes on a true conflict\n\
         3. Remove ALL conflict markers\n\
         4. Output ONLY the resolved file contents, with no explanation and no markdown fences\n\n\
         Output the resolved file now:\n"
    )
}

/// Corrective follow-up when a resolution still has markers.
pub fn build_marker_cleanup_prompt(content: &str) -> String {
    format!(
        "The following text still contains merge conflict markers. \
         Remove ALL lines containing <<<<<<, ====== or >>>>>> and output only the clean merged file:\n\n\
         {content}"
    )
}

/// Execute the checklist and report in a delimited block.
pub fn build_execute_test_plan_prompt(
    test_items: &[String],
    project_description: &str,
    tech_stack: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are verifying a feature by executing its test plan.\n\n");
    prompt.push_str(&format!("## Feature\n{project_description}\n\n"));
    prompt.push_str(&format!("## Tech Stack\n{tech_stack}\n\n"));
    prompt.push_str("## Test Plan\n");
    for (i, item) in test_items.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, item));
    }
    prompt.push_str(
        "\n## Instructions\n\
         1. Execute every numbered item: run commands, tests or scripts as needed\n\
         2. Do not modify application code\n\
         3. Mark an item SKIP only if it cannot be executed in this environment\n\n",
    );
    prompt.push_str(&format!(
        "Finish your reply with exactly this block, one line per item, in the same order:\n\n\
         {RESULTS_START}\n\
         1. PASS | <item text>\n\
         2. FAIL | <item text> | <reason>\n\
         3. SKIP | <item text> | <reason>\n\
         {RESULTS_END}\n"
    ));
    prompt
}

/// Fix the failing checklist items, executed with file-system access.
pub fn build_fix_failing_tests_prompt(
    failures: &[&TestResult],
    project_description: &str,
    tech_stack: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("Some test plan items failed. Fix the code so they pass.\n\n");
    prompt.push_str(&format!("## Feature\n{project_description}\n\n"));
    prompt.push_str(&format!("## Tech Stack\n{tech_stack}\n\n"));
    prompt.push_str("## Failing Items\n");
    for failure in failures {
        prompt.push_str(&format!(
            "- {}: {}\n",
            failure.description,
            failure.reason.as_deref().unwrap_or("no reason given")
        ));
    }
    prompt.push_str(
        "\n## Instructions\n\
         1. Find the root cause of each failure\n\
         2. Fix the application code, not the test plan\n\
         3. Keep changes minimal and do not break passing behavior\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::TestStatus;

    #[test]
    fn test_issues_prompt_embeds_plan_and_schema() {
        let prompt = build_issues_json_prompt("# Project Plan: Todo");
        assert!(prompt.contains("# Project Plan: Todo"));
        assert!(prompt.contains("\"dependencies\": []"));
        assert!(prompt.contains("\"priority\": \"high\""));
    }

    #[test]
    fn test_implement_prompt_includes_ticket_and_files() {
        let mut item = WorkItem::new("Add login", 1, &[]);
        item.description = "Login form".into();
        let prompt = build_implement_prompt(&item, "plan text", "- src/main.rs");
        assert!(prompt.contains("**Title:** Add login"));
        assert!(prompt.contains("## Description\n\nLogin form"));
        assert!(prompt.contains("- src/main.rs"));
    }

    #[test]
    fn test_execute_test_plan_prompt_numbers_items() {
        let items = vec!["renders header".to_string(), "handles empty input".to_string()];
        let prompt = build_execute_test_plan_prompt(&items, "Todo: list", "rust");
        assert!(prompt.contains("1. renders header\n2. handles empty input\n"));
        assert!(prompt.contains(RESULTS_START));
        assert!(prompt.contains(RESULTS_END));
    }

    #[test]
    fn test_fix_prompt_lists_reasons() {
        let failure = TestResult {
            position: 2,
            status: TestStatus::Fail,
            description: "handles empty input".into(),
            reason: Some("throws on null".into()),
        };
        let prompt = build_fix_failing_tests_prompt(&[&failure], "Todo", "rust");
        assert!(prompt.contains("- handles empty input: throws on null"));
    }

    #[test]
    fn test_phase_prompt_truncates_descriptions() {
        let mut item = WorkItem::new("Api", 2, &[]);
        item.description = "x".repeat(500);
        let prompt = build_phase_pr_body_prompt(2, "staging", "main", &[&item], "diff");
        assert!(prompt.contains(&format!("- Api: {}\n", "x".repeat(120))));
        assert!(!prompt.contains(&"x".repeat(121)));
        assert!(prompt.contains("(staging -> main)"));
    }
}
