//! Test plan checklists and structured test-result blocks.
//!
//! A change request description carries a `Test Plan` section of checkbox
//! lines. The generation service executes them and replies with:
//!
//! ```text
//! TEST_RESULTS_START
//! 1. PASS | renders header
//! 2. FAIL | handles empty input | throws on null
//! TEST_RESULTS_END
//! ```
//!
//! Results are matched back to checklist items by position.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

pub const RESULTS_START: &str = "TEST_RESULTS_START";
pub const RESULTS_END: &str = "TEST_RESULTS_END";

static TEST_PLAN_HEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(#{1,3})\s+Test Plan\b").unwrap());

static HEADING_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})\s+").unwrap());

static CHECKBOX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)([-*])\s*\[[ xX]\]\s*(.+)$").unwrap());

static ANNOTATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\*\*\[(FAILED|SKIPPED):.*?\]\*\*$").unwrap());

static RESULT_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.\s*(?i:(PASS|FAIL|SKIP))\s*\|\s*(.+?)(?:\s*\|\s*(.+))?$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
            TestStatus::Skip => write!(f, "SKIP"),
        }
    }
}

/// One parsed result line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    /// 1-based position in the checklist
    pub position: usize,
    pub status: TestStatus,
    pub description: String,
    pub reason: Option<String>,
}

impl TestResult {
    pub fn is_failure(&self) -> bool {
        self.status == TestStatus::Fail
    }
}

/// Parsed results plus the block lines that did not match the grammar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestReport {
    pub results: Vec<TestResult>,
    pub rejected: Vec<String>,
}

impl TestReport {
    pub fn failures(&self) -> Vec<&TestResult> {
        self.results.iter().filter(|r| r.is_failure()).collect()
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(TestResult::is_failure)
    }

    pub fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TestResultsError {
    #[error("no {RESULTS_START} block in output")]
    MissingBlock,

    #[error("results block contains no parseable result lines")]
    Empty { rejected: Vec<String> },
}

/// Checklist item texts from the `Test Plan` section of `body`, with any
/// previous FAILED/SKIPPED annotations removed.
pub fn extract_test_items(body: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut section_level: Option<usize> = None;

    for line in body.lines() {
        let trimmed = line.trim();
        match section_level {
            None => {
                if let Some(caps) = TEST_PLAN_HEADING_REGEX.captures(trimmed) {
                    section_level = Some(caps[1].len());
                }
            }
            Some(level) => {
                if ends_section(trimmed, level) {
                    break;
                }
                if let Some(caps) = CHECKBOX_REGEX.captures(line) {
                    let text = clean_item_text(&caps[3]);
                    if !text.is_empty() {
                        items.push(text);
                    }
                }
            }
        }
    }

    items
}

/// Parse the delimited results block from generated output.
///
/// The last `TEST_RESULTS_START` wins, so a reply that quotes the format
/// before answering still parses. A missing end marker takes the rest of
/// the output.
pub fn parse_test_results(output: &str) -> Result<TestReport, TestResultsError> {
    let start = output
        .rfind(RESULTS_START)
        .ok_or(TestResultsError::MissingBlock)?;
    let block = &output[start + RESULTS_START.len()..];
    let block = match block.find(RESULTS_END) {
        Some(end) => &block[..end],
        None => block,
    };

    let mut report = TestReport::default();
    for line in block.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match RESULT_LINE_REGEX.captures(line) {
            Some(caps) => {
                let Ok(position) = caps[1].parse::<usize>() else {
                    report.rejected.push(line.to_string());
                    continue;
                };
                let status = match caps[2].to_ascii_uppercase().as_str() {
                    "PASS" => TestStatus::Pass,
                    "FAIL" => TestStatus::Fail,
                    _ => TestStatus::Skip,
                };
                report.results.push(TestResult {
                    position,
                    status,
                    description: caps[3].trim().to_string(),
                    reason: caps
                        .get(4)
                        .map(|m| m.as_str().trim().to_string())
                        .filter(|r| !r.is_empty()),
                });
            }
            None => report.rejected.push(line.to_string()),
        }
    }

    if report.results.is_empty() {
        return Err(TestResultsError::Empty {
            rejected: report.rejected,
        });
    }
    Ok(report)
}

/// Rewrite the checkbox lines of the `Test Plan` section to reflect
/// `results`. Lines outside the section and items without a result are left
/// as they are.
pub fn annotate_test_plan(body: &str, results: &[TestResult]) -> String {
    let mut out = Vec::new();
    let mut section_level: Option<usize> = None;
    let mut section_done = false;
    let mut position = 0usize;

    for line in body.split('\n') {
        let trimmed = line.trim();
        if section_done {
            out.push(line.to_string());
            continue;
        }
        match section_level {
            None => {
                if let Some(caps) = TEST_PLAN_HEADING_REGEX.captures(trimmed) {
                    section_level = Some(caps[1].len());
                }
                out.push(line.to_string());
            }
            Some(level) => {
                if ends_section(trimmed, level) {
                    section_done = true;
                    out.push(line.to_string());
                    continue;
                }
                let Some(caps) = CHECKBOX_REGEX.captures(line) else {
                    out.push(line.to_string());
                    continue;
                };
                let text = clean_item_text(&caps[3]);
                if text.is_empty() {
                    out.push(line.to_string());
                    continue;
                }
                position += 1;
                match results.iter().find(|r| r.position == position) {
                    Some(result) => out.push(render_item(&caps[1], &caps[2], &text, result)),
                    None => out.push(line.to_string()),
                }
            }
        }
    }

    out.join("\n")
}

fn render_item(indent: &str, bullet: &str, text: &str, result: &TestResult) -> String {
    let reason = result.reason.as_deref().unwrap_or_default();
    match result.status {
        TestStatus::Pass => format!("{indent}{bullet} [x] {text}"),
        TestStatus::Fail => format!("{indent}{bullet} [ ] {text} **[FAILED: {reason}]**"),
        TestStatus::Skip => format!("{indent}{bullet} [ ] {text} **[SKIPPED: {reason}]**"),
    }
}

fn ends_section(trimmed: &str, level: usize) -> bool {
    HEADING_REGEX
        .captures(trimmed)
        .is_some_and(|caps| caps[1].len() <= level)
}

fn clean_item_text(raw: &str) -> String {
    ANNOTATION_REGEX.replace(raw.trim(), "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "## Summary\n\
                        - [ ] not a test\n\
                        \n\
                        ## Test Plan\n\
                        - [ ] renders header\n\
                        - [ ] handles empty input\n\
                        \n\
                        ## Notes\n\
                        - [ ] follow up later";

    fn result(position: usize, status: TestStatus, reason: Option<&str>) -> TestResult {
        TestResult {
            position,
            status,
            description: String::new(),
            reason: reason.map(String::from),
        }
    }

    #[test]
    fn test_extract_only_test_plan_section() {
        assert_eq!(
            extract_test_items(BODY),
            vec!["renders header".to_string(), "handles empty input".to_string()]
        );
    }

    #[test]
    fn test_extract_no_section() {
        assert!(extract_test_items("## Summary\n- [ ] a\n").is_empty());
    }

    #[test]
    fn test_extract_keeps_deeper_subheadings() {
        let body = "# Test Plan\n### Unit\n- [ ] parses input\n### Manual\n* [x] clicks button\n# Rollout\n- [ ] ship";
        assert_eq!(
            extract_test_items(body),
            vec!["parses input".to_string(), "clicks button".to_string()]
        );
    }

    #[test]
    fn test_extract_strips_previous_annotations() {
        let body = "## Test Plan\n- [ ] handles empty input **[FAILED: throws on null]**\n- [ ] offline **[SKIPPED: needs network]**";
        assert_eq!(
            extract_test_items(body),
            vec!["handles empty input".to_string(), "offline".to_string()]
        );
    }

    #[test]
    fn test_parse_results_block() {
        let output = "I ran everything.\n\
                      TEST_RESULTS_START\n\
                      1. PASS | renders header\n\
                      2. FAIL | handles empty input | throws on null\n\
                      3. SKIP | offline mode | needs network\n\
                      TEST_RESULTS_END\n\
                      Done.";
        let report = parse_test_results(output).unwrap();
        assert_eq!(report.results.len(), 3);
        assert!(report.rejected.is_empty());
        assert_eq!(report.results[0].status, TestStatus::Pass);
        assert_eq!(report.results[0].reason, None);
        assert_eq!(report.results[1].position, 2);
        assert_eq!(report.results[1].description, "handles empty input");
        assert_eq!(report.results[1].reason.as_deref(), Some("throws on null"));
        assert_eq!(report.count(TestStatus::Skip), 1);
        assert!(report.has_failures());
        assert_eq!(report.failures().len(), 1);
    }

    #[test]
    fn test_parse_reports_rejected_lines() {
        let output = "TEST_RESULTS_START\n1. PASS | a\nall good otherwise\n2. MAYBE | b\nTEST_RESULTS_END";
        let report = parse_test_results(output).unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(
            report.rejected,
            vec!["all good otherwise".to_string(), "2. MAYBE | b".to_string()]
        );
    }

    #[test]
    fn test_parse_missing_block() {
        assert_eq!(
            parse_test_results("All tests pass!"),
            Err(TestResultsError::MissingBlock)
        );
    }

    #[test]
    fn test_parse_empty_block() {
        let err = parse_test_results("TEST_RESULTS_START\nnothing useful\nTEST_RESULTS_END")
            .unwrap_err();
        assert_eq!(
            err,
            TestResultsError::Empty {
                rejected: vec!["nothing useful".to_string()]
            }
        );
    }

    #[test]
    fn test_parse_uses_last_block_and_tolerates_missing_end() {
        let output = "Format: TEST_RESULTS_START ... TEST_RESULTS_END\n\nTEST_RESULTS_START\n1. pass | a";
        let report = parse_test_results(output).unwrap();
        assert_eq!(report.results[0].status, TestStatus::Pass);
    }

    #[test]
    fn test_annotate_marks_pass_and_fail() {
        let results = vec![
            result(1, TestStatus::Pass, None),
            result(2, TestStatus::Fail, Some("throws on null")),
        ];
        let updated = annotate_test_plan(BODY, &results);
        assert!(updated.contains("- [x] renders header"));
        assert!(updated.contains("- [ ] handles empty input **[FAILED: throws on null]**"));
        // outside the section nothing changes
        assert!(updated.contains("- [ ] not a test"));
        assert!(updated.contains("- [ ] follow up later"));
    }

    #[test]
    fn test_annotate_skip_and_reannotation_is_stable() {
        let first = annotate_test_plan(BODY, &[result(2, TestStatus::Skip, Some("needs db"))]);
        assert!(first.contains("- [ ] handles empty input **[SKIPPED: needs db]**"));

        let second = annotate_test_plan(&first, &[result(2, TestStatus::Pass, None)]);
        assert!(second.contains("- [x] handles empty input\n"));
        assert!(!second.contains("SKIPPED"));

        let third = annotate_test_plan(&second, &[result(2, TestStatus::Pass, None)]);
        assert_eq!(second, third);
    }

    #[test]
    fn test_annotate_preserves_indent_and_bullet() {
        let body = "## Test Plan\n  * [ ] nested item";
        let updated = annotate_test_plan(body, &[result(1, TestStatus::Fail, None)]);
        assert_eq!(
            updated,
            "## Test Plan\n  * [ ] nested item **[FAILED: ]**"
        );
    }

    #[test]
    fn test_annotate_missing_reason_is_left_empty() {
        let updated = annotate_test_plan(BODY, &[result(2, TestStatus::Skip, None)]);
        assert!(updated.contains("- [ ] handles empty input **[SKIPPED: ]**"));
    }

    #[test]
    fn test_annotate_ignores_out_of_range_positions() {
        let updated = annotate_test_plan(BODY, &[result(9, TestStatus::Pass, None)]);
        assert_eq!(updated, BODY);
    }
}
