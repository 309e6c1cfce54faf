//! Configuration view and validation commands: `conveyor config`.

use anyhow::Result;
use conveyor::conveyor_config::CONFIG_FILE_NAME;
use std::path::{Path, PathBuf};

use super::super::{Cli, ConfigCommands};
use super::load_toml;

fn config_path(cli: &Cli, cwd: &Path) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| cwd.join(CONFIG_FILE_NAME))
}

pub fn cmd_config(cli: &Cli, cwd: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let path = config_path(cli, cwd);
    let toml = load_toml(cli, cwd)?;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Conveyor Configuration");
            println!("======================");
            println!();

            if path.exists() {
                println!("Config file: {}", path.display());
            } else {
                println!("No {} found at {}", CONFIG_FILE_NAME, path.display());
                println!("Using default configuration:");
            }
            println!();
            print!("{}", toml.to_toml_string()?);
            println!();

            println!("Effective values (with env overrides):");
            println!("  claude_cmd = \"{}\"", toml.claude_cmd());
            println!("  skip_permissions = {}", toml.skip_permissions());
            println!(
                "  state_file = \"{}/{}\"",
                toml.pipeline.state_dir, toml.pipeline.state_file
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !path.exists() {
                println!("No {CONFIG_FILE_NAME} found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
    }

    Ok(())
}
