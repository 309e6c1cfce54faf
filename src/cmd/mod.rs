//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `run`     | `Run`            |
//! | `status`  | `Status`         |
//! | `config`  | `Config`         |

pub mod config;
pub mod run;
pub mod status;

use anyhow::Result;
use conveyor::conveyor_config::ConveyorToml;
use std::path::Path;

use super::Cli;

pub use config::cmd_config;
pub use run::{RunArgs, cmd_run};
pub use status::cmd_status;

/// `--config PATH` if given, else `conveyor.toml` in the invocation directory.
pub fn load_toml(cli: &Cli, cwd: &Path) -> Result<ConveyorToml> {
    match &cli.config {
        Some(path) => ConveyorToml::load(path),
        None => ConveyorToml::load_or_default(cwd),
    }
}
