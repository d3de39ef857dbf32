//! Post-hoc grounding verification
//!
//! Every factual sentence of a synthesized answer has to carry a
//! `(Source: <section>)` marker naming a section that was actually retrieved.
//! Only headings, separators and blank lines pass through unchecked.

use serde::{Deserialize, Serialize};

/// Marker prefix, matched case-insensitively
const SOURCE_MARKER: &str = "(source:";

/// Words whose trailing period does not end a sentence
const ABBREVIATIONS: &[&str] = &["vs", "e.g", "i.e", "eg", "ie", "cf", "approx", "incl", "esp"];

/// Phrase identifying a refusal in model output
pub const REFUSAL_PHRASE: &str = "not available in the provided aws rag guide";

/// A section referenced by the answer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub section: String,
}

/// Result of checking one answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundingReport {
    /// Answer text after enforcement
    pub text: String,
    /// Sentences with verified citations
    pub grounded: usize,
    /// Sentences removed, or that would be removed when not enforcing
    pub ungrounded: usize,
    /// Verified citations in first-seen order
    pub citations: Vec<Citation>,
    /// Model stated the refusal itself
    pub model_refused: bool,
}

impl GroundingReport {
    /// Nothing grounded survived
    pub fn is_refusal(&self) -> bool {
        self.grounded == 0
    }
}

/// Checks answer sentences against retrieved sections
#[derive(Debug, Clone)]
pub struct GroundingVerifier {
    sections: Vec<String>,
    enforce: bool,
}

impl GroundingVerifier {
    pub fn new<S: AsRef<str>>(sections: &[S], enforce: bool) -> Self {
        Self {
            sections: sections.iter().map(|s| normalize(s.as_ref())).collect(),
            enforce,
        }
    }

    pub fn verify(&self, answer: &str) -> GroundingReport {
        let mut lines = Vec::new();
        let mut grounded = 0;
        let mut ungrounded = 0;
        let mut citations: Vec<Citation> = Vec::new();
        let mut model_refused = false;

        for line in answer.lines() {
            if is_structural(line) {
                lines.push(line.trim_end().to_string());
                continue;
            }

            let (prefix, body) = split_list_prefix(line);
            let mut kept = Vec::new();

            for sentence in split_sentences(body) {
                if sentence.to_lowercase().contains(REFUSAL_PHRASE) {
                    model_refused = true;
                    continue;
                }

                let cited = parse_citations(&sentence);
                let verified: Vec<&String> = cited.iter().filter(|c| self.is_retrieved(c)).collect();

                if !cited.is_empty() && verified.len() == cited.len() {
                    grounded += 1;
                    for section in verified {
                        let citation = Citation {
                            section: section.clone(),
                        };
                        if !citations.contains(&citation) {
                            citations.push(citation);
                        }
                    }
                    kept.push(sentence);
                } else {
                    ungrounded += 1;
                    tracing::debug!(sentence = %sentence, "Sentence without verified citation");
                    if !self.enforce {
                        kept.push(sentence);
                    }
                }
            }

            if !kept.is_empty() {
                lines.push(format!("{}{}", prefix, kept.join(" ")));
            }
        }

        GroundingReport {
            text: collapse_blank_lines(&lines),
            grounded,
            ungrounded,
            citations,
            model_refused,
        }
    }

    /// Exact match on the normalized section name
    fn is_retrieved(&self, cited: &str) -> bool {
        let cited = normalize(cited);
        !cited.is_empty() && self.sections.iter().any(|s| *s == cited)
    }
}

/// Extract every section named in `(Source: ...)` markers
pub fn parse_citations(sentence: &str) -> Vec<String> {
    let lower = sentence.to_ascii_lowercase();
    let mut found = Vec::new();
    let mut offset = 0;

    while let Some(pos) = lower[offset..].find(SOURCE_MARKER) {
        let start = offset + pos + SOURCE_MARKER.len();
        let Some(len) = sentence[start..].find(')') else {
            break;
        };
        for name in sentence[start..start + len].split(';') {
            let name = name.trim().trim_matches(|c| c == '[' || c == ']' || c == '"' || c == '\'').trim();
            if !name.is_empty() {
                found.push(name.to_string());
            }
        }
        offset = start + len + 1;
    }

    found
}

/// Split a line into sentences.
///
/// A citation that follows the terminator stays with the sentence before it.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();
    // Terminator seen, waiting for the citation that follows it to close
    let mut pending = false;

    for (i, &c) in chars.iter().enumerate() {
        current.push(c);

        let before_space = chars.get(i + 1).map_or(false, |n| n.is_whitespace());

        if pending && c == ')' && (before_space || i + 1 == chars.len()) {
            push_sentence(&mut sentences, &current);
            current.clear();
            pending = false;
        } else if c == '.' && before_space && ends_with_abbreviation(&current) {
            continue;
        } else if matches!(c, '.' | '!' | '?') && before_space {
            let rest: String = chars[i + 1..].iter().collect();
            if rest.trim_start().to_ascii_lowercase().starts_with(SOURCE_MARKER) {
                pending = true;
            } else {
                push_sentence(&mut sentences, &current);
                current.clear();
            }
        }
    }
    push_sentence(&mut sentences, &current);

    sentences
}

/// `text` ends in a period that belongs to an abbreviation such as "vs."
fn ends_with_abbreviation(text: &str) -> bool {
    let word = text
        .trim_end_matches('.')
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or("")
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_lowercase();
    ABBREVIATIONS.contains(&word.as_str())
}

fn push_sentence(sentences: &mut Vec<String>, sentence: &str) {
    let sentence = sentence.trim();
    if !sentence.is_empty() {
        sentences.push(sentence.to_string());
    }
}

/// Headings, separators and blank lines.
///
/// Bold or colon-terminated labels are not structure: they can state
/// claims, so they go through citation checking like any other line.
fn is_structural(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#') || !trimmed.chars().any(char::is_alphanumeric)
}

/// Split off a list marker (`- `, `* `, `• `, `1. `)
fn split_list_prefix(line: &str) -> (&str, &str) {
    let trimmed = line.trim_start();
    let indent = line.len() - trimmed.len();

    for marker in ["- ", "* ", "• "] {
        if trimmed.starts_with(marker) {
            let end = indent + marker.len();
            return (&line[..end], &line[end..]);
        }
    }

    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && trimmed[digits..].starts_with(". ") {
        let end = indent + digits + 2;
        return (&line[..end], &line[end..]);
    }

    ("", line)
}

fn normalize(section: &str) -> String {
    section
        .trim()
        .trim_matches(|c| c == '[' || c == ']' || c == '"' || c == '\'')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn collapse_blank_lines(lines: &[String]) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in lines {
        if line.trim().is_empty() && out.last().map_or(true, |l| l.trim().is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().map_or(false, |l| l.trim().is_empty()) {
        out.pop();
    }
    out.join("\n")
}
