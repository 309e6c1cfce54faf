//! Conveyor drives a phased project plan through tickets, feature branches,
//! generated code, reviews, test runs and merges, checkpointing after every
//! step so an interrupted run resumes exactly where it stopped.

pub mod config;
pub mod conveyor_config;
pub mod errors;
pub mod parse;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod repo;
pub mod sequencer;
pub mod store;
pub mod stream;
pub mod tools;
pub mod util;

pub use pipeline::Pipeline;
