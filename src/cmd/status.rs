//! Read-only progress view: `conveyor status`.

use anyhow::{Result, bail};
use conveyor::config::Config;
use conveyor::store::StateStore;
use conveyor_common::{RunState, StepStatus};
use std::path::Path;

use super::super::Cli;
use super::load_toml;

fn gate(done: bool) -> console::StyledObject<&'static str> {
    if done {
        console::style("[x]").green()
    } else {
        console::style("[ ]").dim()
    }
}

fn status_cell(status: StepStatus) -> console::StyledObject<String> {
    let text = format!("{:<12}", status.to_string());
    match status {
        StepStatus::Completed => console::style(text).green(),
        StepStatus::InProgress => console::style(text).cyan(),
        StepStatus::Failed => console::style(text).red(),
        StepStatus::Pending => console::style(text).dim(),
    }
}

fn number(n: Option<u64>) -> String {
    n.map(|n| format!("#{n}")).unwrap_or_else(|| "-".to_string())
}

fn print_state(state: &RunState) {
    println!("[setup]");
    println!("  {} plan generated", gate(state.plan_generated));
    println!("  {} issue list generated", gate(state.issues_json_generated));
    println!("  {} repository created", gate(state.repo_created));
    println!("  {} scaffolding done", gate(state.scaffolding_done));
    println!("  {} integration branch created", gate(state.staging_branch_created));
    println!();

    if state.issues.is_empty() {
        println!("No issues yet.");
        println!();
        return;
    }

    println!(
        "{:<4} {:<6} {:<15} {:<12} {:<7} {:<7} Title",
        "#", "Phase", "Step", "Status", "Ticket", "PR"
    );
    println!(
        "{:<4} {:<6} {:<15} {:<12} {:<7} {:<7} -----",
        "----", "------", "---------------", "------------", "-------", "-------"
    );
    for issue in &state.issues {
        println!(
            "{:<4} {:<6} {:<15} {} {:<7} {:<7} {}",
            issue.index + 1,
            issue.phase,
            issue.sub_step.as_str(),
            status_cell(issue.status),
            number(issue.github_issue_number),
            number(issue.pr_number),
            issue.title
        );
    }
    println!();

    let closed = state.issues.iter().filter(|i| i.is_closed()).count();
    println!("{closed}/{} issues closed", state.issues.len());
    let phases = state.phases();
    let merged: Vec<String> = phases
        .iter()
        .filter(|p| state.is_phase_merged(**p))
        .map(u32::to_string)
        .collect();
    if merged.is_empty() {
        println!("Phases merged: none of {}", phases.len());
    } else {
        println!("Phases merged: {} of {}", merged.join(", "), phases.len());
    }
    println!();
}

pub fn cmd_status(cli: &Cli, cwd: &Path, project_dir: &Path) -> Result<()> {
    let toml = load_toml(cli, cwd)?;
    let project_dir = cwd.join(project_dir);
    let config = Config::new(project_dir.clone(), &toml);
    let store = StateStore::new(config.state_file.clone());
    if !store.exists() {
        bail!(
            "No saved state at {}. Start a run with 'conveyor run'.",
            store.path().display()
        );
    }
    let state = store.load()?;

    println!();
    println!("{}", console::style("Conveyor Run Status").bold().cyan());
    println!("===================");
    println!();
    println!("Project:     {}", state.project_idea);
    println!("Tech stack:  {}", state.tech_stack);
    if state.repo_full_name.is_empty() {
        println!("Repository:  {}", state.repo_name);
    } else {
        println!("Repository:  {}", state.repo_full_name);
    }
    println!("Directory:   {}", project_dir.display());
    if let Some(saved) = store.last_saved() {
        println!("Last saved:  {}", saved.format("%Y-%m-%d %H:%M:%S"));
    }
    println!();

    print_state(&state);
    Ok(())
}
