//! Process-backed implementations of the pipeline's collaborators.

pub mod claude;
pub mod gh;
pub mod git;
pub mod process;

pub use claude::ClaudeCli;
pub use gh::GhCli;
pub use git::GitCli;
