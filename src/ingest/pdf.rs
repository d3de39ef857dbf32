//! PDF text extraction
//!
//! Each page becomes one section named after its page number.

use crate::ingest::chunker::Section;
use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Extract one section per non-empty page
pub fn extract_page_sections(path: &Path) -> Result<Vec<Section>> {
    let doc = lopdf::Document::load(path)
        .with_context(|| format!("Failed to load PDF {}", path.display()))?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut sections = Vec::new();
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(text) => {
                let cleaned = clean_text(&text);
                if !cleaned.is_empty() {
                    sections.push(Section::new(format!("Page {}", page_num), cleaned));
                }
            }
            Err(e) => {
                warn!(page = page_num, error = %e, "Failed to extract text from page, skipping");
            }
        }
    }

    if sections.is_empty() {
        bail!("No text content extracted from PDF {}", path.display());
    }

    Ok(sections)
}

/// Collapse runs of spaces and drop blank lines
fn clean_text(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
