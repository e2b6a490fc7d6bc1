//! Text normalisation: deterministic cleanup of extracted text.
//!
//! Every converter's output passes through [`normalize_text`] so the scoring
//! model sees the same shape of input whether the text came from a VLM, a
//! PDF text layer or a plain file. Vision models in particular like to wrap
//! their answer in a ```` ```markdown ```` fence despite being told not to.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised so the fence regex
//! sees the raw output; invisible characters go before whitespace collapsing
//! so a zero-width space between two spaces does not keep them apart.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules.
///
/// 1. Strip an outer markdown fence
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Collapse inner runs of spaces/tabs, keeping leading indentation
/// 5. Trim trailing whitespace per line
/// 6. Collapse 3+ consecutive blank lines down to 2
/// 7. Trim leading and trailing blank space
pub fn normalize_text(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = collapse_inner_whitespace(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md|text)?\r?\n(.*)\r?\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
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

// ── Rule 4: Collapse inner horizontal whitespace ─────────────────────────────

static RE_INNER_WS: Lazy<Regex> = Lazy::new(|| Regex::new("[ \t\u{00A0}]{2,}|\t").unwrap());

fn collapse_inner_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| {
            let body = line.trim_start_matches([' ', '\t']);
            let indent = &line[..line.len() - body.len()];
            format!("{}{}", indent, RE_INNER_WS.replace_all(body, " "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 6: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── HTML to text ─────────────────────────────────────────────────────────────

static RE_SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style|head)\b[^>]*>.*?</(script|style|head)>").unwrap());
static RE_BLOCK_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</(p|div|li|tr|h[1-6]|table|ul|ol)>").unwrap());
static RE_CELL_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</t[dh]>").unwrap());
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

/// Reduce an HTML document to its visible text.
///
/// Block-level closers become line breaks and table cells become spaces so
/// receipts exported as HTML keep one item per line.
pub fn html_to_text(html: &str) -> String {
    let s = RE_SCRIPT_STYLE.replace_all(html, "");
    let s = RE_BLOCK_END.replace_all(&s, "\n");
    let s = RE_CELL_END.replace_all(&s, " ");
    let s = RE_TAG.replace_all(&s, "");
    decode_entities(&s)
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        let input = "```markdown\nStore: Costco\nTotal: $38.47\n```";
        assert_eq!(strip_markdown_fences(input), "Store: Costco\nTotal: $38.47");
    }

    #[test]
    fn test_strip_fences_no_lang() {
        let input = "```\nStore: Costco\n```";
        assert_eq!(strip_markdown_fences(input), "Store: Costco");
    }

    #[test]
    fn test_inner_fence_untouched() {
        let input = "Intro\n```\ncode\n```\nOutro";
        assert_eq!(strip_markdown_fences(input), input);
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_collapse_inner_whitespace_keeps_indent() {
        assert_eq!(
            collapse_inner_whitespace("  - milk\t\t$5.99   each"),
            "  - milk $5.99 each"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_full_pipeline() {
        let input = "```markdown\r\n\u{FEFF}Costco   Wholesale  \r\n\r\n\r\n\r\n\r\nchicken breast\t$24.99\r\n```\n";
        assert_eq!(normalize_text(input), "Costco Wholesale\n\n\nchicken breast $24.99");
    }

    #[test]
    fn test_whitespace_only_becomes_empty() {
        assert_eq!(normalize_text(" \n\t\n\u{200B}\n"), "");
    }

    #[test]
    fn test_html_to_text() {
        let html = "<html><head><title>x</title></head><body>\
            <script>var a = 1;</script><h1>Receipt</h1>\
            <table><tr><td>Milk</td><td>$5.99</td></tr><tr><td>Eggs</td><td>$3.49</td></tr></table>\
            <p>Total&nbsp;&amp; tax: $9.48</p></body></html>";
        let text = normalize_text(&html_to_text(html));
        assert_eq!(text, "Receipt\nMilk $5.99\nEggs $3.49\n\nTotal & tax: $9.48");
    }
}
