//! Detection of logical sections in cleaned full text.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{Section, PREAMBLE_LABEL};

static HEADING: OnceLock<Option<Regex>> = OnceLock::new();

/// Heading alone on its line, optionally numbered ("2.", "IV.") and
/// optionally followed by inline text after a colon or period.
fn heading() -> Option<&'static Regex> {
    HEADING
        .get_or_init(|| {
            Regex::new(
                r"(?ix)^
                (?:(?:\d{1,2}(?:\.\d{1,2})*|[ivx]{1,5})[.)]?\s+)?
                (?P<label>
                    abstract
                    | introduction
                    | materials\s+and\s+methods
                    | methods
                    | results\s+and\s+discussion
                    | results
                    | discussion
                    | conclusions?
                    | references
                )
                \s*
                (?:[:.]\s*(?P<rest>.*))?
                $",
            )
            .ok()
        })
        .as_ref()
}

fn canonical_label(matched: &str) -> &'static str {
    let lower = matched.to_ascii_lowercase();
    if lower.starts_with("abstract") {
        "Abstract"
    } else if lower.starts_with("introduction") {
        "Introduction"
    } else if lower.contains("methods") {
        "Methods"
    } else if lower.starts_with("results") {
        "Results"
    } else if lower.starts_with("discussion") {
        "Discussion"
    } else if lower.starts_with("conclusion") {
        "Conclusion"
    } else {
        "References"
    }
}

/// Split cleaned text into ordered `(label, body)` sections
///
/// Recognised headings: Abstract, Introduction, Methods (also "Materials and
/// Methods"), Results, Discussion, Conclusion(s) and References, matched
/// case-insensitively at line start. Text before the first heading becomes a
/// preamble section when it is not blank.
pub fn detect_sections(text: &str) -> Vec<Section> {
    let Some(re) = heading() else {
        return vec![Section::new(PREAMBLE_LABEL, text.trim())];
    };

    let mut sections = Vec::new();
    let mut label: Option<&'static str> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in text.lines() {
        let Some(caps) = re.captures(line.trim()) else {
            body.push(line);
            continue;
        };
        let Some(matched) = caps.name("label") else {
            body.push(line);
            continue;
        };

        flush(&mut sections, label, &body);
        body.clear();
        label = Some(canonical_label(matched.as_str()));
        if let Some(rest) = caps.name("rest").filter(|m| !m.as_str().trim().is_empty()) {
            body.push(rest.as_str());
        }
    }
    flush(&mut sections, label, &body);
    sections
}

fn flush(sections: &mut Vec<Section>, label: Option<&str>, body: &[&str]) {
    let text = body.join("\n").trim().to_string();
    match label {
        Some(label) => sections.push(Section::new(label, text)),
        None if !text.is_empty() => sections.push(Section::new(PREAMBLE_LABEL, text)),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(sections: &[Section]) -> Vec<&str> {
        sections.iter().map(|s| s.label.as_str()).collect()
    }

    #[test]
    fn test_three_headings_with_preamble() {
        let text = "A Study of Things\nJane Doe\n\nAbstract\nWe study things.\n\nMethods\nWe looked.\n\nResults\nWe saw.";
        let sections = detect_sections(text);
        assert_eq!(labels(&sections), vec!["preamble", "Abstract", "Methods", "Results"]);
        assert_eq!(sections[0].body, "A Study of Things\nJane Doe");
        assert_eq!(sections[1].body, "We study things.");
        assert_eq!(sections[3].body, "We saw.");
    }

    #[test]
    fn test_no_preamble_when_text_starts_with_heading() {
        let sections = detect_sections("ABSTRACT\nshort\nmethods\nsteps\nResults\nnumbers");
        assert_eq!(labels(&sections), vec!["Abstract", "Methods", "Results"]);
    }

    #[test]
    fn test_numbered_and_inline_headings() {
        let text = "Abstract: inline summary\n1. Introduction\nintro\nII. Materials and Methods\nhow\n4 Conclusions\ndone\nReferences\n[1] A.";
        let sections = detect_sections(text);
        assert_eq!(
            labels(&sections),
            vec!["Abstract", "Introduction", "Methods", "Conclusion", "References"]
        );
        assert_eq!(sections[0].body, "inline summary");
    }

    #[test]
    fn test_heading_words_inside_sentences_ignored() {
        let sections = detect_sections("The results show that methods matter.\nIntroduction of a new idea");
        assert_eq!(labels(&sections), vec!["preamble"]);
    }

    #[test]
    fn test_empty_text() {
        assert!(detect_sections("").is_empty());
    }
}
