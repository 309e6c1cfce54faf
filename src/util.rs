//! Shared helpers for the Conveyor crate.

use std::path::Path;
use walkdir::WalkDir;

pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Directories never listed when summarizing a project tree.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    "dist",
    "build",
    ".next",
    "state",
    "target",
];

/// Lowercase, dash-separated ASCII slug of `title`, at most `max_len`
/// characters. Anything outside `[a-z0-9]` becomes a separator.
pub fn slugify(title: &str, max_len: usize) -> String {
    let slug: String = title
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.len() > max_len {
        slug[..max_len].trim_end_matches('-').to_string()
    } else {
        slug
    }
}

/// Cap a diff at `max_chars` characters, appending an explicit marker when
/// anything was cut.
pub fn truncate_diff(diff: &str, max_chars: usize) -> String {
    match diff.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &diff[..cut], TRUNCATION_MARKER),
        None => diff.to_string(),
    }
}

/// Sorted `- path` listing of the files under `root`, skipping VCS metadata,
/// dependency and build directories.
pub fn existing_files_summary(root: &Path) -> String {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.') && !SKIP_DIRS.contains(&name.as_ref())
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `owner/repo` from a GitHub URL such as `https://github.com/owner/repo.git`.
pub fn parse_repo_full_name(url: &str) -> Option<String> {
    let rest = url.trim().split("github.com").nth(1)?;
    let rest = rest.trim_start_matches([':', '/']);
    let mut parts = rest.split('/').filter(|p| !p.is_empty());
    let owner = parts.next()?;
    let repo = parts.next()?.trim_end_matches(".git");
    if repo.is_empty() {
        return None;
    }
    Some(format!("{owner}/{repo}"))
}
