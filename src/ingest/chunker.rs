//! Section splitting and chunking for ingestion.
//!
//! Sections carry the name used in citations; each section is cut into
//! overlapping fixed-size windows before embedding.

/// Maximum number of tokens per chunk (approximate).
const MAX_CHUNK_TOKENS: usize = 512;

/// Number of tokens to overlap between chunks for context continuity.
const OVERLAP_TOKENS: usize = 50;

/// Approximate characters per token (rough estimate for English text).
const CHARS_PER_TOKEN: usize = 4;

/// Maximum characters per chunk.
pub const MAX_CHUNK_CHARS: usize = MAX_CHUNK_TOKENS * CHARS_PER_TOKEN;

/// Overlap characters between chunks.
pub const OVERLAP_CHARS: usize = OVERLAP_TOKENS * CHARS_PER_TOKEN;

/// A named part of the source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub text: String,
}

impl Section {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }
}

/// Embedding-ready piece of a section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub section: String,
    /// Position within the section
    pub index: usize,
    pub text: String,
}

/// Split markdown-ish text on `#` headings.
///
/// Text before the first heading goes into a section named `preamble_title`.
/// Sections with no body text are dropped.
pub fn split_markdown_sections(text: &str, preamble_title: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut title = preamble_title.to_string();
    let mut body = String::new();

    for line in text.lines() {
        if let Some(heading) = parse_heading(line) {
            push_section(&mut sections, &title, &body);
            title = heading.to_string();
            body.clear();
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }
    push_section(&mut sections, &title, &body);

    sections
}

fn parse_heading(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    let heading = rest.trim().trim_end_matches('#').trim();
    (!heading.is_empty()).then_some(heading)
}

fn push_section(sections: &mut Vec<Section>, title: &str, body: &str) {
    let body = body.trim();
    if !body.is_empty() {
        sections.push(Section::new(title, body));
    }
}

/// Chunk every section with the default window
pub fn chunk_sections(sections: &[Section]) -> Vec<Chunk> {
    sections
        .iter()
        .flat_map(|section| {
            sliding_window(&section.text, MAX_CHUNK_CHARS, OVERLAP_CHARS)
                .into_iter()
                .enumerate()
                .map(|(index, text)| Chunk {
                    section: section.title.clone(),
                    index,
                    text,
                })
        })
        .collect()
}

/// Fixed-size overlapping windows measured in characters.
///
/// Windows end at the last paragraph or sentence break in their second half
/// when there is one.
pub fn sliding_window(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    if chars.len() <= max_chars {
        return vec![chars.iter().collect()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        let chunk_end = if end < chars.len() {
            find_break_point(&chars[start..end])
                .map(|offset| start + offset)
                .unwrap_or(end)
        } else {
            end
        };

        let chunk: String = chars[start..chunk_end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if chunk_end >= chars.len() {
            break;
        }

        let step = chunk_end - start;
        start = if step <= overlap { chunk_end } else { chunk_end - overlap };
    }

    chunks
}

/// Offset just past the last break in the second half of the window
fn find_break_point(window: &[char]) -> Option<usize> {
    let half = window.len() / 2;

    let paragraph = window
        .windows(2)
        .enumerate()
        .rev()
        .find(|(i, pair)| *i >= half && pair[0] == '\n' && pair[1] == '\n')
        .map(|(i, _)| i + 2);
    if paragraph.is_some() {
        return paragraph;
    }

    window
        .windows(2)
        .enumerate()
        .rev()
        .find(|(i, pair)| *i >= half && matches!(pair[0], '.' | '!' | '?') && pair[1].is_whitespace())
        .map(|(i, _)| i + 1)
}
