//! Normalization of raw extracted PDF text.

use regex::Regex;
use std::sync::OnceLock;

static PAGE_MARKER: OnceLock<Option<Regex>> = OnceLock::new();

/// Lines like `12`, `Page 3`, `3 of 10`, `- 4 -`
///
/// Bare numbers stop at three digits so years and table cells survive.
fn page_marker() -> Option<&'static Regex> {
    PAGE_MARKER
        .get_or_init(|| {
            Regex::new(
                r"(?ix)^(?:
                    \d{1,3}
                    | page\s+\d{1,4}(?:\s*(?:of|/)\s*\d{1,4})?
                    | \d{1,4}\s*(?:of|/)\s*\d{1,4}
                    | -\s*\d{1,4}\s*-
                )$",
            )
            .ok()
        })
        .as_ref()
}

fn is_page_marker(line: &str) -> bool {
    page_marker().is_some_and(|re| re.is_match(line))
}

/// Clean raw extracted text
///
/// Strips control characters (keeping line breaks), drops page-number lines,
/// rejoins words hyphenated across lines, collapses runs of spaces and keeps
/// at most one blank line between paragraphs.
pub fn clean_text(raw: &str) -> String {
    let normalized: String = raw
        .replace("\r\n", "\n")
        .chars()
        .filter_map(|c| match c {
            '\r' | '\u{0c}' | '\u{0b}' => Some('\n'),
            '\t' | '\u{a0}' => Some(' '),
            '\n' => Some('\n'),
            c if c.is_control() => None,
            '\u{feff}' | '\u{200b}' => None,
            c => Some(c),
        })
        .collect();

    let mut lines: Vec<String> = Vec::new();
    for line in normalized.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() && is_page_marker(&collapsed) {
            continue;
        }
        lines.push(collapsed);
    }

    let lines = join_hyphenated(lines);

    let mut out = String::with_capacity(normalized.len());
    let mut blank_run = 0;
    for line in lines {
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        blank_run = 0;
        out.push_str(&line);
    }
    out
}

/// `exam-` followed by `ple ...` becomes `example ...`
fn join_hyphenated(lines: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut iter = lines.into_iter().peekable();
    while let Some(mut line) = iter.next() {
        while ends_with_word_break(&line) {
            let continues = iter
                .peek()
                .and_then(|next| next.chars().next())
                .is_some_and(|c| c.is_lowercase());
            if !continues {
                break;
            }
            line.pop();
            if let Some(next) = iter.next() {
                line.push_str(&next);
            }
        }
        out.push(line);
    }
    out
}

fn ends_with_word_break(line: &str) -> bool {
    let mut chars = line.chars().rev();
    chars.next() == Some('-') && chars.next().is_some_and(|c| c.is_alphabetic())
}
