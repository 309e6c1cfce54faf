//! Merge conflict marker detection.

pub const OURS_MARKER: &str = "<<<<<<";
pub const SEPARATOR_MARKER: &str = "======";
pub const THEIRS_MARKER: &str = ">>>>>>";

pub const ALL_MARKERS: [&str; 3] = [OURS_MARKER, SEPARATOR_MARKER, THEIRS_MARKER];

/// True if `content` has an opening conflict marker, i.e. the file really is
/// mid-conflict.
pub fn has_conflict_start(content: &str) -> bool {
    content.contains(OURS_MARKER)
}

/// True if any marker token is left anywhere in `content`.
pub fn contains_any_marker(content: &str) -> bool {
    ALL_MARKERS.iter().any(|m| content.contains(m))
}
