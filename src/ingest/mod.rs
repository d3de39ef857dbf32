//! Document ingestion
//!
//! Loads the source guide, splits it into named sections, chunks and embeds
//! them, and writes the chunks to the vector collection. The CLI runs this
//! once when the collection is missing.

pub mod chunker;
pub mod pdf;

pub use chunker::{Chunk, Section};

use crate::retrieval::vector_store::{SegmentSearch, StoredSegment, VectorStore};
use crate::retrieval::Embedder;
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Chunks embedded per batch
const EMBED_BATCH: usize = 16;

/// Summary of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub document: String,
    pub sections: usize,
    pub chunks: usize,
}

/// Load a document into named sections by file extension
pub fn load_sections(path: &Path) -> Result<Vec<Section>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let sections = match extension.as_str() {
        "pdf" => pdf::extract_page_sections(path)?,
        "md" | "markdown" | "txt" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            chunker::split_markdown_sections(&text, &document_name(path))
        }
        other => bail!("Unsupported document type '{}' for {}", other, path.display()),
    };

    if sections.is_empty() {
        bail!("No text content found in {}", path.display());
    }

    Ok(sections)
}

/// Stable point id for a chunk
pub fn chunk_id(document: &str, chunk: &Chunk) -> String {
    let key = format!("{}:{}:{}", document, chunk.section, chunk.index);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Writes documents into the vector collection
pub struct Ingestor {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl Ingestor {
    pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Ingest `path`, creating the collection if needed
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport> {
        let document = document_name(path);
        let sections = load_sections(path)?;
        let chunks = chunker::chunk_sections(&sections);

        tracing::info!(
            document = %document,
            sections = sections.len(),
            chunks = chunks.len(),
            "Ingesting document"
        );

        self.store.ensure_collection(self.embedder.dimension()).await?;

        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embeddings = self
                .embedder
                .embed_documents(&texts)
                .context("Failed to embed chunks")?;

            let items = batch
                .iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| {
                    let segment = StoredSegment {
                        id: chunk_id(&document, chunk),
                        section: chunk.section.clone(),
                        text: chunk.text.clone(),
                        document: document.clone(),
                        score: 0.0,
                    };
                    (segment, embedding)
                })
                .collect();

            self.store.upsert(items).await?;
        }

        Ok(IngestReport {
            document,
            sections: sections.len(),
            chunks: chunks.len(),
        })
    }

    /// Ingest only when the collection does not exist yet
    pub async fn ingest_if_missing(&self, path: &Path) -> Result<Option<IngestReport>> {
        if self.store.collection_exists().await? {
            tracing::debug!(collection = %self.store.collection(), "Collection present, skipping ingestion");
            return Ok(None);
        }

        if !path.exists() {
            bail!(
                "Vector collection '{}' is missing and source document {} was not found",
                self.store.collection(),
                path.display()
            );
        }

        self.ingest(path).await.map(Some)
    }

    /// Drop the collection and ingest again
    pub async fn reingest(&self, path: &Path) -> Result<IngestReport> {
        self.store.drop_collection().await?;
        self.ingest(path).await
    }
}
