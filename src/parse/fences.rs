//! Unwrapping generated text from markdown code fences.

use regex::Regex;
use std::sync::LazyLock;

static OPENING_FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[\w+.-]*\s*$").unwrap());

/// Strip one enclosing code fence, if the text is wrapped in one.
///
/// Only a fence on the first non-empty line with a matching fence on the last
/// non-empty line is removed; fences inside the body are kept.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines.len() >= 2
        && OPENING_FENCE_REGEX.is_match(lines[0].trim())
        && lines[lines.len() - 1].trim() == "```"
    {
        lines.remove(0);
        lines.pop();
        let mut body = lines.join("\n");
        if text.ends_with('\n') {
            body.push('\n');
        }
        return body;
    }
    text.to_string()
}

/// Extract the outermost JSON array from text that may contain other content.
/// Brackets inside string literals are ignored.
pub fn extract_json_array(text: &str) -> Option<String> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fence() {
        let text = "```json\n[{\"a\": 1}]\n```";
        assert_eq!(strip_code_fences(text), "[{\"a\": 1}]");
    }

    #[test]
    fn test_strip_bare_fence_keeps_trailing_newline() {
        let text = "```\nfn main() {}\n```\n";
        assert_eq!(strip_code_fences(text), "fn main() {}\n");
    }

    #[test]
    fn test_unfenced_text_unchanged() {
        let text = "fn main() {}\n";
        assert_eq!(strip_code_fences(text), text);
    }

    #[test]
    fn test_inner_fences_kept() {
        let text = "# Readme\n\n```sh\ncargo run\n```\n\nDone.";
        assert_eq!(strip_code_fences(text), text);
    }

    #[test]
    fn test_extract_json_array_with_prose() {
        let text = "Here are the issues:\n[{\"title\": \"A\"}, {\"title\": \"B\"}]\nLet me know.";
        assert_eq!(
            extract_json_array(text),
            Some("[{\"title\": \"A\"}, {\"title\": \"B\"}]".to_string())
        );
    }

    #[test]
    fn test_extract_json_array_nested_and_strings() {
        let text = r#"[{"title": "Handle ] in names", "deps": ["x"]}]"#;
        assert_eq!(extract_json_array(text), Some(text.to_string()));
    }

    #[test]
    fn test_extract_json_array_missing_or_unclosed() {
        assert_eq!(extract_json_array("no json here"), None);
        assert_eq!(extract_json_array("[{\"a\": 1}"), None);
    }
}
