use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cmd;

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(
    version,
    about = "Resumable delivery pipeline: plan, ticket, branch, implement, review, test and merge"
)]
pub struct Cli {
    /// Log level when CONVEYOR_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,

    /// Path to conveyor.toml. Defaults to ./conveyor.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new project run, or resume an interrupted one
    Run {
        /// Continue from the saved state in the project directory
        #[arg(long)]
        resume: bool,

        /// Project working directory (default: ./projects/<repo-name>)
        #[arg(long)]
        project_dir: Option<PathBuf>,

        /// Clone an existing repository (owner/name) instead of creating one
        #[arg(long)]
        repo: Option<String>,

        /// Project idea; prompted for when omitted
        #[arg(long)]
        idea: Option<String>,

        /// Preferred tech stack; prompted for when omitted
        #[arg(long)]
        tech_stack: Option<String>,

        /// Repository name; prompted for when omitted
        #[arg(long)]
        repo_name: Option<String>,

        /// Retries after the first attempt for code generation and tests
        #[arg(long)]
        max_retries: Option<u32>,
    },
    /// Show the saved progress of a run
    Status {
        #[arg(long)]
        project_dir: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the resolved configuration
    Show,
    /// Check conveyor.toml for suspicious settings
    Validate,
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_env("CONVEYOR_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("conveyor={level},conveyor_common={level},warn")));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
            .init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    match &cli.command {
        Commands::Run {
            resume,
            project_dir,
            repo,
            idea,
            tech_stack,
            repo_name,
            max_retries,
        } => {
            let args = cmd::RunArgs {
                resume: *resume,
                project_dir: project_dir.clone(),
                repo: repo.clone(),
                idea: idea.clone(),
                tech_stack: tech_stack.clone(),
                repo_name: repo_name.clone(),
                max_retries: *max_retries,
            };
            let code = cmd::cmd_run(&cli, &cwd, args).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Status { project_dir } => {
            let dir = project_dir.clone().unwrap_or_else(|| cwd.clone());
            cmd::cmd_status(&cli, &cwd, &dir)?;
        }
        Commands::Config { command } => cmd::cmd_config(&cli, &cwd, command.clone())?,
    }

    Ok(())
}
