//! Verdicts from generated change-request reviews.

use std::fmt;

/// The reviewer is asked to open its reply with `APPROVED` or `CONCERNS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewVerdict {
    Approved,
    Concerns,
    Unclear,
}

impl ReviewVerdict {
    pub fn from_reply(reply: &str) -> Self {
        let head = reply
            .trim_start()
            .trim_start_matches(['*', '#', '`', ' '])
            .to_ascii_uppercase();
        if head.starts_with("APPROVED") {
            ReviewVerdict::Approved
        } else if head.starts_with("CONCERNS") {
            ReviewVerdict::Concerns
        } else {
            ReviewVerdict::Unclear
        }
    }
}

impl fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewVerdict::Approved => write!(f, "approved"),
            ReviewVerdict::Concerns => write!(f, "concerns"),
            ReviewVerdict::Unclear => write!(f, "unclear"),
        }
    }
}
