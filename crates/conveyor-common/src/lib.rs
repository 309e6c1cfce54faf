//! Shared domain types for the Conveyor delivery pipeline.
//!
//! - [`state`]: the durable run model (`RunState`, `IssueState`, the `SubStep` cursor)
//! - [`work_item`]: proposed work items as produced by the planner
//! - [`collab`]: the external collaborators the pipeline drives (generation
//!   service, version control, code hosting) and their error type

pub mod collab;
pub mod state;
pub mod work_item;

pub use collab::{Generator, Hosting, ToolError, ToolResult, VersionControl};
pub use state::{IssueState, PhasePr, RunState, StepStatus, SubStep};
pub use work_item::{Priority, WorkItem};
