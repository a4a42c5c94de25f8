//! Post-processing: deterministic cleanup of the LLM's field listing.
//!
//! The extraction prompt asks for bare `Field Name: value` lines, but chat
//! models routinely decorate them anyway: a ```` ``` ```` fence around the
//! whole answer, `**bold**` keys, bullet markers, numbered lists, CRLF line
//! endings, zero-width spaces pasted from OCR. Each of these would make an
//! otherwise correct line miss the parser and fall back to a default.
//!
//! Rules (applied in order):
//! 1. Strip outer code fences
//! 2. Normalise line endings (CRLF → LF)
//! 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 4. Per line: drop list markers and markdown emphasis, trim whitespace
//! 5. Drop blank lines

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw LLM response.
pub fn clean_response(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    s.lines()
        .map(strip_line_decoration)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Strip list markers and emphasis ──────────────────────────────────

static RE_LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+").unwrap());

fn strip_line_decoration(line: &str) -> String {
    let without_marker = RE_LIST_MARKER.replace(line, "");
    without_marker
        .replace("**", "")
        .replace("__", "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        let input = "```text\nMember ID: 1\nGroup ID: 2\n```";
        assert_eq!(strip_code_fences(input), "Member ID: 1\nGroup ID: 2");
    }

    #[test]
    fn test_strip_fences_no_lang() {
        let input = "```\nMember ID: 1\n```";
        assert_eq!(strip_code_fences(input), "Member ID: 1");
    }

    #[test]
    fn test_no_fences_passthrough() {
        assert_eq!(strip_code_fences("Member ID: 1"), "Member ID: 1");
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(remove_invisible_chars("W\u{200B}1234\u{FEFF}"), "W1234");
    }

    #[test]
    fn test_strip_bold_and_bullets() {
        assert_eq!(
            strip_line_decoration("- **Patient First Name:** jane"),
            "Patient First Name: jane"
        );
        assert_eq!(strip_line_decoration("2. Member ID: W99"), "Member ID: W99");
        assert_eq!(strip_line_decoration("• Group ID: 7"), "Group ID: 7");
    }

    #[test]
    fn test_hyphenated_value_untouched() {
        // Only a leading marker followed by whitespace is a bullet.
        assert_eq!(strip_line_decoration("-ABC: x-y"), "-ABC: x-y");
    }

    #[test]
    fn test_clean_response_full_pipeline() {
        let input = "```\r\n**Patient First Name:** jane\r\n\r\n* Member ID: W\u{200B}42\r\n```";
        assert_eq!(
            clean_response(input),
            "Patient First Name: jane\nMember ID: W42"
        );
    }
}
