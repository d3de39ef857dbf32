//! Retrieval tool
//!
//! The synthesizer talks to retrieval only through the [`Retriever`] trait:
//! an ordered list of sub-queries in, aggregated text segments out. The
//! vector-store implementation lives in `engine`; embedding and Qdrant
//! access are in their own modules and are shared with ingestion.

pub mod embedding;
pub mod engine;
pub mod vector_store;

pub use embedding::{Embedder, EmbeddingEngine};
pub use engine::{SearchParams, VectorRetriever};
pub use vector_store::{SegmentSearch, StoredSegment, VectorStore};

use crate::errors::Result;
use crate::llm::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Name of the retrieval tool as advertised to the model
pub const RETRIEVER_TOOL_NAME: &str = "retriever_tool";

/// Retrieval tool contract.
///
/// Soft failures (nothing usable for a sub-query, collection missing) are
/// `PipelineError::ToolInvocation`; an unreachable store is
/// `PipelineError::Infrastructure`.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, sub_queries: &[String]) -> Result<RetrieverContent>;
}

/// One retrieved text unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSegment {
    pub id: String,
    /// Section name used in citations
    pub section: String,
    pub text: String,
    pub score: f32,
    /// Sub-query that first surfaced this segment
    pub sub_query: String,
}

/// Aggregated retrieval output for one tool call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrieverContent {
    pub segments: Vec<RetrievedSegment>,
}

impl RetrieverContent {
    pub fn new(segments: Vec<RetrievedSegment>) -> Self {
        Self { segments }
    }

    /// True when no segment carries usable text
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.text.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Distinct section names in first-seen order
    pub fn sections(&self) -> Vec<&str> {
        let mut sections: Vec<&str> = Vec::new();
        for segment in &self.segments {
            let section = segment.section.as_str();
            if !segment.text.trim().is_empty() && !sections.contains(&section) {
                sections.push(section);
            }
        }
        sections
    }

    /// Text handed to the model as the tool result
    pub fn render(&self) -> String {
        self.segments
            .iter()
            .filter(|s| !s.text.trim().is_empty())
            .map(|s| format!("[Section: {}]\n{}", s.section, s.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Tool definition shown to the synthesizer model
pub fn retriever_tool_definition() -> ToolDefinition {
    ToolDefinition::function(
        RETRIEVER_TOOL_NAME,
        "Search the AWS RAG guide and return matching text segments for each sub-query.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "sub_queries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Self-contained search strings"
                }
            },
            "required": ["sub_queries"]
        }),
    )
}
