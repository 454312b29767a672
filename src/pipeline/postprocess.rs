//! Post-processing: deterministic cleanup of model-generated text.
//!
//! Even with "do not wrap the answer in code fences" in the prompt, models
//! occasionally wrap the whole answer in ```` ```markdown ```` or
//! ```` ```json ```` fences, emit CRLF line endings, or sprinkle zero-width
//! characters that the PDF fonts cannot show. These rules fix such quirks
//! without touching content.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the fence rule only ever sees LF;
//! fences are stripped before trimming so the inner text is cleaned like any
//! other answer.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the raw model answer.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip outer code fences (` ``` `, ` ```markdown `, ` ```json `)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 6. Trim blank lines at both ends
///
/// Whitespace-only input becomes the empty string.
pub fn clean_response(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_outer_fences(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    trim_blank_edges(&s)
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[ \t]*(?:markdown|md|json|text)?[ \t]*\n(.*?)\n?```\s*$")
        .expect("fence regex is valid")
});

fn strip_outer_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{4,}").expect("blank-line regex is valid"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 5: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 6: Trim blank edges ─────────────────────────────────────────────────

fn trim_blank_edges(input: &str) -> String {
    input.trim_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        let input = "```markdown\n## Hello\nWorld\n```";
        assert_eq!(strip_outer_fences(input), "## Hello\nWorld");
    }

    #[test]
    fn test_strip_json_fences() {
        let input = "```json\n{\"a\": 1}\n```\n";
        assert_eq!(strip_outer_fences(input), "{\"a\": 1}");
    }

    #[test]
    fn test_no_fences_passthrough() {
        let input = "## Hello\nWorld";
        assert_eq!(strip_outer_fences(input), "## Hello\nWorld");
    }

    #[test]
    fn test_inner_fence_untouched() {
        let input = "Intro\n```\ncode\n```\nOutro";
        assert_eq!(strip_outer_fences(input), input);
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld  "),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        let input = "a\n\n\n\n\n\nb";
        assert_eq!(collapse_blank_lines(input), "a\n\n\nb");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_whitespace_only_becomes_empty() {
        assert_eq!(clean_response(""), "");
        assert_eq!(clean_response("  \r\n\n \t\n"), "");
    }

    #[test]
    fn test_clean_response_full_pipeline() {
        let input = "```markdown\r\n## Title\r\n\r\nSome text   \n\n\n\n\n\n## Next\nbody\n```";
        let result = clean_response(input);
        assert!(result.starts_with("## Title"));
        assert!(result.ends_with("body"));
        assert!(!result.contains("\n\n\n\n"));
        assert!(!result.contains('\r'));
    }
}
