use serde::{Deserialize, Serialize};
use std::fmt;

/// Issue priority as proposed by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[serde(alias = "High", alias = "HIGH")]
    High,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "Low", alias = "LOW")]
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// A single unit of planned work.
///
/// `title`, `description`, `phase` and `priority` are required; the remaining
/// descriptive fields are passed through to the generated ticket body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub title: String,
    pub description: String,
    pub phase: u32,
    pub priority: Priority,
    /// Titles of items in the same phase that must land first
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub problem_statement: String,
    #[serde(default)]
    pub proposed_solution: String,
    #[serde(default)]
    pub technical_details: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub expected_outcome: String,
    #[serde(default)]
    pub optional_enhancements: Vec<String>,
    #[serde(default)]
    pub related_files: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl WorkItem {
    /// Minimal item, mostly useful for tests and fixtures.
    pub fn new(title: impl Into<String>, phase: u32, dependencies: &[&str]) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            phase,
            priority: Priority::Medium,
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            problem_statement: String::new(),
            proposed_solution: String::new(),
            technical_details: String::new(),
            acceptance_criteria: Vec::new(),
            expected_outcome: String::new(),
            optional_enhancements: Vec::new(),
            related_files: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Render the ticket body for this item.
    pub fn ticket_body(&self) -> String {
        let criteria = bullet_list(&self.acceptance_criteria, |c| format!("- [ ] {c}"));
        let enhancements = bullet_list(&self.optional_enhancements, |e| format!("- {e}"));
        let related = bullet_list(&self.related_files, |f| format!("- `{f}`"));
        let dependencies = if self.dependencies.is_empty() {
            "None".to_string()
        } else {
            self.dependencies.join(", ")
        };

        format!(
            "## Description\n\n{}\n\n\
             ## Problem Statement\n\n{}\n\n\
             ## Proposed Solution\n\n{}\n\n\
             ## Technical Details\n\n{}\n\n\
             ## Acceptance Criteria\n\n{}\n\n\
             ## Expected Outcome\n\n{}\n\n\
             ## Optional Enhancements (Future Scope)\n\n{}\n\n\
             ## Related Files\n\n{}\n\n\
             ## Notes / References\n\n\
             Phase: {} | Priority: {}\n\
             Dependencies: {}\n",
            self.description,
            self.problem_statement,
            self.proposed_solution,
            self.technical_details,
            criteria,
            self.expected_outcome,
            enhancements,
            related,
            self.phase,
            self.priority,
            dependencies,
        )
    }
}

fn bullet_list(items: &[String], render: impl Fn(&str) -> String) -> String {
    items
        .iter()
        .map(|item| render(item))
        .collect::<Vec<_>>()
        .join("\n")
}
