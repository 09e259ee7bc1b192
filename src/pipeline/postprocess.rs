//! Post-processing: deterministic cleanup of raw model replies.
//!
//! Even well-prompted models occasionally wrap JSON in ` ```json ` fences,
//! prepend a sentence ("Here is the extracted data:"), or emit Windows line
//! endings and zero-width characters. These rules fix such quirks without
//! touching content, so the parsers downstream only see the payload.
//!
//! Two entry points:
//! * [`clean_transcript`]: for free text (OCR output)
//! * [`json_payload`]: for replies that must contain one JSON object

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean a free-text model reply (vision transcription).
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Trim trailing whitespace per line and surrounding blank lines
pub fn clean_transcript(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    s.trim_matches('\n').to_string()
}

/// Isolate the JSON object inside a model reply.
///
/// Strips fences and invisible characters, then keeps the span from the
/// first `{` to the last `}` so surrounding prose is ignored. Replies with
/// no braces are returned cleaned but otherwise unchanged, leaving the JSON
/// parser to report the error.
pub fn json_payload(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = remove_invisible_chars(&s);
    let trimmed = s.trim();

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => trimmed[start..=end].to_string(),
        _ => trimmed.to_string(),
    }
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").expect("valid fence regex")
});

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

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let input = "```json\n{\"a\": 1}\n```";
        assert_eq!(json_payload(input), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_fence() {
        let input = "```\nINVOICE\nTotal: $5\n```\n";
        assert_eq!(clean_transcript(input), "INVOICE\nTotal: $5");
    }

    #[test]
    fn ignores_prose_around_json() {
        let input = "Here is the data:\n{\"invoice_number\": \"X\"}\nLet me know!";
        assert_eq!(json_payload(input), "{\"invoice_number\": \"X\"}");
    }

    #[test]
    fn no_braces_left_for_parser() {
        assert_eq!(json_payload("  not json  "), "not json");
    }

    #[test]
    fn normalises_crlf_and_invisible_chars() {
        let input = "\u{FEFF}Line one  \r\nLine\u{200B} two\r\n";
        assert_eq!(clean_transcript(input), "Line one\nLine two");
    }

    #[test]
    fn inner_fences_are_kept() {
        let input = "Before\n```\ncode\n```\nAfter";
        assert_eq!(clean_transcript(input), input);
    }
}
