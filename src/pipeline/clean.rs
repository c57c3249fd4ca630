//! Cleaning: strip Markdown noise from the raw model response.
//!
//! Vision models asked for `Label: value` lines still decorate them with
//! bold markers, numbering, bullets, headers and the occasional code fence.
//! These rules remove that decoration so the parser only has to deal with
//! plain lines. Each rule is a pure `&str → String` pass.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the line-anchored rules see `\n`.
//! Code fences go before bold markers because a fence may contain `**`.
//! Blank-line collapsing runs before the leading-header rules so that a
//! header followed by blank lines is still at the very start.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleaning rules to the raw model response.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF) and drop invisible Unicode
/// 2. Remove fenced code blocks
/// 3. Remove `**` bold markers
/// 4. Remove Markdown header markers (`# `, `## `, …)
/// 5. Collapse blank lines
/// 6. Drop a leading "Invoice Information/Analysis/Data Extraction" title
/// 7. Drop a leading "Based on …" line
/// 8. Drop everything from a line starting with "Note:" to the end
/// 9. Strip numbering, bullet and dash markers at line starts
/// 10. Remove square brackets
/// 11. Collapse runs of spaces/tabs to one space
/// 12. Trim
pub fn clean_response(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = RE_CODE_FENCE.replace_all(&s, "");
    let s = s.replace("**", "");
    let s = RE_HEADER.replace_all(&s, "");
    let s = RE_BLANK_LINES.replace_all(&s, "\n");
    let s = RE_TITLE.replace(&s, "");
    let s = RE_BASED_ON.replace(&s, "");
    let s = RE_NOTE.replace(&s, "");
    let s = RE_NUMBERING.replace_all(&s, "");
    let s = RE_BULLET.replace_all(&s, "");
    let s = RE_DASH.replace_all(&s, "");
    let s = s.replace(['[', ']'], "");
    let s = RE_SPACES.replace_all(&s, " ");
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings, invisible characters ─────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rules 2–4: Markdown decoration ───────────────────────────────────────────

static RE_CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[^`]*```").unwrap());

static RE_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"#+\s").unwrap());

// ── Rule 5: Collapse blank lines ─────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

// ── Rules 6–8: Preamble and trailing notes ───────────────────────────────────

static RE_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*Invoice (?:Information|Analysis|Data Extraction)\s*").unwrap()
});

static RE_BASED_ON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*Based on.*?\n").unwrap());

/// A line starting with "Note:" and everything after it. "Note:" inside a
/// value ("Credit Note: CN-7") is left alone.
static RE_NOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?ms)^[ \t]*Note:.*\z").unwrap());

// ── Rule 9: List markers ─────────────────────────────────────────────────────

static RE_NUMBERING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*\d+\.[ \t]*").unwrap());

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*\*[ \t]*").unwrap());

static RE_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*-[ \t]*").unwrap());

// ── Rule 11: Repeated spaces ─────────────────────────────────────────────────

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{00A0}]{2,}").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bold_and_numbering() {
        let input = "1. **Invoice number:** INV-9\n2. **Invoice Date:** 01/02/2024";
        assert_eq!(
            clean_response(input),
            "Invoice number: INV-9\nInvoice Date: 01/02/2024"
        );
    }

    #[test]
    fn removes_code_fences() {
        let input = "Invoice number: A\n```json\n{\"x\": 1}\n```\nCurrency: $";
        let out = clean_response(input);
        assert!(!out.contains("```"));
        assert!(!out.contains("\"x\""));
        assert!(out.contains("Currency: $"));
    }

    #[test]
    fn removes_headers_and_blank_lines() {
        let input = "## Part 1 - Required Fields\n\n\n\nInvoice number: A\n\n   \nTotal: 5";
        assert_eq!(
            clean_response(input),
            "Part 1 - Required Fields\nInvoice number: A\nTotal: 5"
        );
    }

    #[test]
    fn drops_leading_title_and_based_on() {
        let input = "Invoice Data Extraction\nBased on the image provided:\nInvoice number: X";
        assert_eq!(clean_response(input), "Invoice number: X");
    }

    #[test]
    fn drops_trailing_note() {
        let input = "Invoice number: X\nNote: the date was blurry\nand more";
        assert_eq!(clean_response(input), "Invoice number: X");
    }

    #[test]
    fn note_inside_a_value_is_kept() {
        let input = "Document Type: Credit Note: CN-7\nInvoice Number: INV-1\n- Delivery Note: 55";
        assert_eq!(
            clean_response(input),
            "Document Type: Credit Note: CN-7\nInvoice Number: INV-1\nDelivery Note: 55"
        );
    }

    #[test]
    fn indented_note_line_is_dropped() {
        let input = "Invoice number: X\n  Note: amounts are estimates";
        assert_eq!(clean_response(input), "Invoice number: X");
    }

    #[test]
    fn strips_bullets_dashes_and_brackets() {
        let input = "* Vendor Name: [ACME Ltd]\n- VAT ID: [DE123]";
        assert_eq!(clean_response(input), "Vendor Name: ACME Ltd\nVAT ID: DE123");
    }

    #[test]
    fn keeps_negative_values_after_colon() {
        let input = "Invoice Amount: -45.00";
        assert_eq!(clean_response(input), "Invoice Amount: -45.00");
    }

    #[test]
    fn collapses_spaces_but_keeps_lines() {
        let input = "Vendor   Name:\t\tACME\r\nCurrency:  €";
        assert_eq!(clean_response(input), "Vendor Name: ACME\nCurrency: €");
    }

    #[test]
    fn removes_invisible_chars() {
        assert_eq!(clean_response("\u{FEFF}Total:\u{200B} 5"), "Total: 5");
    }
}
