//! Project runs: `conveyor run` and `conveyor run --resume`.

use anyhow::{Context, Result, bail};
use conveyor::Pipeline;
use conveyor::config::Config;
use conveyor::store::StateStore;
use conveyor_common::RunState;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::super::Cli;
use super::load_toml;

pub const DEFAULT_TECH_STACK: &str = "Choose the best tech stack for this project";

/// Exit code after an operator interrupt.
pub const EXIT_INTERRUPTED: i32 = 130;
pub const EXIT_FAILED: i32 = 1;

pub struct RunArgs {
    pub resume: bool,
    pub project_dir: Option<PathBuf>,
    pub repo: Option<String>,
    pub idea: Option<String>,
    pub tech_stack: Option<String>,
    pub repo_name: Option<String>,
    pub max_retries: Option<u32>,
}

enum Finish {
    Done(Result<()>),
    Interrupted,
}

/// Repository name derived from the first word of the idea.
pub fn default_repo_name(idea: &str) -> String {
    let first = idea.split_whitespace().next().unwrap_or_default();
    let slug = conveyor::util::slugify(first, 40);
    if slug.is_empty() {
        "project-app".to_string()
    } else {
        format!("{slug}-app")
    }
}

pub fn tech_stack_or_default(tech_stack: &str) -> String {
    let trimmed = tech_stack.trim();
    if trimmed.is_empty() {
        DEFAULT_TECH_STACK.to_string()
    } else {
        trimmed.to_string()
    }
}

fn prompt_text(label: &str, allow_empty: bool) -> Result<String> {
    use dialoguer::Input;

    let value: String = Input::new()
        .with_prompt(label)
        .allow_empty(allow_empty)
        .interact_text()
        .with_context(|| format!("Failed to read {}", label.to_lowercase()))?;
    Ok(value.trim().to_string())
}

/// Build the initial state for a fresh run, prompting for anything not
/// given on the command line.
fn fresh_state(cwd: &Path, args: &RunArgs) -> Result<RunState> {
    let idea = match &args.idea {
        Some(idea) => idea.trim().to_string(),
        None => prompt_text("Project idea", false)?,
    };
    if idea.is_empty() {
        bail!("A project idea is required to start a run");
    }
    let tech_stack = match &args.tech_stack {
        Some(stack) => stack.clone(),
        None => prompt_text("Tech stack (blank to let the generator choose)", true)?,
    };

    let from_repo = args
        .repo
        .as_deref()
        .and_then(|full| full.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let repo_name = match (&args.repo_name, from_repo) {
        (Some(name), _) => name.trim().to_string(),
        (None, Some(name)) => name,
        (None, None) => prompt_text("Repository name (blank for default)", true)?,
    };
    let repo_name = if repo_name.is_empty() {
        default_repo_name(&idea)
    } else {
        repo_name
    };

    let project_dir = match &args.project_dir {
        Some(dir) => cwd.join(dir),
        None => cwd.join("projects").join(&repo_name),
    };

    Ok(RunState::new(
        idea,
        tech_stack_or_default(&tech_stack),
        repo_name,
        project_dir.to_string_lossy(),
    ))
}

pub async fn cmd_run(cli: &Cli, cwd: &Path, args: RunArgs) -> Result<i32> {
    let toml = load_toml(cli, cwd)?;

    let mut state = if args.resume {
        let dir = args
            .project_dir
            .as_ref()
            .map(|d| cwd.join(d))
            .unwrap_or_else(|| cwd.to_path_buf());
        let path = conveyor::config::state_file_path(&dir, &toml);
        if !path.exists() {
            bail!(
                "No saved state at {}. Start a new run without --resume.",
                path.display()
            );
        }
        let mut state = StateStore::load_from(&path)?;
        // The directory given on the command line wins over a moved checkout
        state.project_dir = dir.to_string_lossy().to_string();
        state
    } else {
        fresh_state(cwd, &args)?
    };

    let project_dir = PathBuf::from(&state.project_dir);
    let config = Config::new(project_dir.clone(), &toml).with_max_retries(args.max_retries);
    if !args.resume && config.state_file.exists() {
        bail!(
            "A run already exists in {}. Use 'conveyor run --resume --project-dir {}' to continue it.",
            project_dir.display(),
            project_dir.display()
        );
    }

    let pipeline = Pipeline::from_config(config).with_existing_repo(args.repo.clone());
    pipeline.checkpoint(&state)?;

    println!();
    println!(
        "{} {}",
        console::style(if args.resume { "Resuming" } else { "Starting" })
            .bold()
            .cyan(),
        state.project_idea
    );
    println!("  Project dir: {}", project_dir.display());
    println!("  Tech stack:  {}", state.tech_stack);
    println!();
    info!(dir = %project_dir.display(), resume = args.resume, "run started");

    let finish = tokio::select! {
        result = pipeline.run(&mut state) => Finish::Done(result),
        _ = tokio::signal::ctrl_c() => Finish::Interrupted,
    };

    match finish {
        Finish::Done(Ok(())) => {
            println!();
            println!("{}", console::style("All phases complete.").green().bold());
            if !state.repo_full_name.is_empty() {
                println!("  Repository: https://github.com/{}", state.repo_full_name);
            }
            println!("  Issues:     {}", state.issues.len());
            println!();
            Ok(0)
        }
        Finish::Interrupted => {
            warn!("interrupted; saving state");
            pipeline.checkpoint(&state)?;
            println!();
            println!("{}", console::style("Interrupted. Progress saved.").yellow());
            print_resume_hint(&project_dir);
            Ok(EXIT_INTERRUPTED)
        }
        Finish::Done(Err(e)) => {
            error!(error = %format!("{e:#}"), "run failed");
            if let Err(save_err) = pipeline.checkpoint(&state) {
                error!(error = %save_err, "failed to save state after error");
            }
            println!();
            println!("{} {:#}", console::style("Error:").red().bold(), e);
            print_resume_hint(&project_dir);
            Ok(EXIT_FAILED)
        }
    }
}

fn print_resume_hint(project_dir: &Path) {
    println!(
        "Resume with: conveyor run --resume --project-dir {}",
        project_dir.display()
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            resume: false,
            project_dir: None,
            repo: None,
            idea: Some("Todo list with sharing".into()),
            tech_stack: Some(String::new()),
            repo_name: Some(String::new()),
            max_retries: None,
        }
    }

    #[test]
    fn test_default_repo_name_uses_first_word() {
        assert_eq!(default_repo_name("Todo list with sharing"), "todo-app");
        assert_eq!(default_repo_name("  Recipe!  book"), "recipe-app");
        assert_eq!(default_repo_name(""), "project-app");
    }

    #[test]
    fn test_blank_tech_stack_falls_back_to_default() {
        assert_eq!(tech_stack_or_default("  "), DEFAULT_TECH_STACK);
        assert_eq!(tech_stack_or_default(" rust "), "rust");
    }

    #[test]
    fn test_fresh_state_applies_defaults() {
        let cwd = PathBuf::from("/work");
        let state = fresh_state(&cwd, &args()).unwrap();
        assert_eq!(state.repo_name, "todo-app");
        assert_eq!(state.tech_stack, DEFAULT_TECH_STACK);
        assert_eq!(
            PathBuf::from(&state.project_dir),
            PathBuf::from("/work/projects/todo-app")
        );
        assert!(!state.plan_generated);
    }

    #[test]
    fn test_fresh_state_takes_repo_name_from_existing_repo() {
        let cwd = PathBuf::from("/work");
        let mut a = args();
        a.repo_name = None;
        a.repo = Some("acme/widgets".into());
        a.project_dir = Some(PathBuf::from("here"));
        let state = fresh_state(&cwd, &a).unwrap();
        assert_eq!(state.repo_name, "widgets");
        assert_eq!(PathBuf::from(&state.project_dir), PathBuf::from("/work/here"));
    }

    #[test]
    fn test_fresh_state_rejects_blank_idea() {
        let mut a = args();
        a.idea = Some("   ".into());
        assert!(fresh_state(Path::new("/work"), &a).is_err());
    }
}
