//! Adapters from free-form generated text to structured values.
//!
//! The pipeline never inspects generated wording directly; it goes through
//! these parsers, each of which has an explicit failure path.

pub mod fences;
pub mod markers;
pub mod review;
pub mod test_plan;

pub use fences::{extract_json_array, strip_code_fences};
pub use review::ReviewVerdict;
pub use test_plan::{
    TestReport, TestResult, TestResultsError, TestStatus, annotate_test_plan, extract_test_items,
    parse_test_results,
};
