// Retrieval engine - vector search over the guide for a list of sub-queries
use crate::cli::config::RetrievalConfig;
use crate::errors::{PipelineError, Result};
use crate::retrieval::embedding::Embedder;
use crate::retrieval::vector_store::SegmentSearch;
use crate::retrieval::{RetrievedSegment, Retriever, RetrieverContent};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Search parameters for retrieval
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    /// Maximum number of results per sub-query
    pub top_k: usize,
    /// Minimum similarity threshold (0.0 to 1.0)
    pub threshold: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            top_k: 4,
            threshold: 0.3,
        }
    }
}

impl From<&RetrievalConfig> for SearchParams {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            threshold: config.score_threshold,
        }
    }
}

/// Retriever backed by an embedding model and a vector store
pub struct VectorRetriever {
    store: Arc<dyn SegmentSearch>,
    embedder: Arc<dyn Embedder>,
    params: SearchParams,
}

impl VectorRetriever {
    pub fn new(store: Arc<dyn SegmentSearch>, embedder: Arc<dyn Embedder>, params: SearchParams) -> Self {
        Self {
            store,
            embedder,
            params,
        }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    /// Search each sub-query in order, keeping the first occurrence of every segment
    async fn retrieve(&self, sub_queries: &[String]) -> Result<RetrieverContent> {
        let exists = self
            .store
            .collection_exists()
            .await
            .map_err(|e| PipelineError::Infrastructure(format!("Vector store unreachable: {:#}", e)))?;

        if !exists {
            return Err(PipelineError::ToolInvocation(
                "Vector collection does not exist; run ingestion first".to_string(),
            ));
        }

        let queries: Vec<&str> = sub_queries.iter().map(String::as_str).collect();
        let embeddings = self
            .embedder
            .embed_queries(&queries)
            .map_err(|e| PipelineError::ToolInvocation(format!("Failed to embed sub-queries: {:#}", e)))?;

        let mut seen = HashSet::new();
        let mut segments = Vec::new();

        for (sub_query, embedding) in sub_queries.iter().zip(embeddings) {
            let hits = self
                .store
                .search(embedding, self.params.top_k, self.params.threshold)
                .await
                .map_err(|e| {
                    PipelineError::ToolInvocation(format!("Search failed for '{}': {:#}", sub_query, e))
                })?;

            tracing::debug!(sub_query = %sub_query, hits = hits.len(), "Sub-query searched");

            for hit in hits {
                if seen.insert(hit.id.clone()) {
                    segments.push(RetrievedSegment {
                        id: hit.id,
                        section: hit.section,
                        text: hit.text,
                        score: hit.score,
                        sub_query: sub_query.clone(),
                    });
                }
            }
        }

        tracing::info!(
            sub_queries = sub_queries.len(),
            segments = segments.len(),
            "Retrieval complete"
        );

        Ok(RetrieverContent::new(segments))
    }
}
