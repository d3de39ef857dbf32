// Vector store - Qdrant collection holding the guide's chunks
use anyhow::{Context, Result};
use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        point_id::PointIdOptions, value::Kind, vectors_config::Config,
        with_payload_selector::SelectorOptions, CreateCollection, Distance, PointId, PointStruct,
        SearchPoints, Value as QdrantValue, VectorParams, VectorsConfig, WithPayloadSelector,
    },
};
use std::collections::HashMap;

/// Payload keys
pub const SECTION_KEY: &str = "section";
pub const TEXT_KEY: &str = "text";
pub const DOCUMENT_KEY: &str = "document";

/// Upsert batch size
const UPSERT_BATCH: usize = 64;

/// A chunk as stored in or returned from the collection
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSegment {
    pub id: String,
    pub section: String,
    pub text: String,
    pub document: String,
    pub score: f32,
}

/// Similarity search over stored segments
#[async_trait]
pub trait SegmentSearch: Send + Sync {
    /// Whether the backing collection exists; errors mean the store is unreachable
    async fn collection_exists(&self) -> Result<bool>;

    async fn search(&self, embedding: Vec<f32>, top_k: usize, threshold: f32) -> Result<Vec<StoredSegment>>;
}

/// Qdrant-backed vector store bound to one collection
pub struct VectorStore {
    client: QdrantClient,
    collection: String,
}

impl VectorStore {
    /// Connect to a Qdrant server
    pub fn connect(url: &str, collection: &str) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .context(format!("Failed to create Qdrant client for {}", url))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection with cosine similarity if it is missing
    pub async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        if self.collection_exists().await? {
            return Ok(());
        }

        self.client
            .create_collection(&CreateCollection {
                collection_name: self.collection.clone(),
                vectors_config: Some(VectorsConfig {
                    config: Some(Config::Params(VectorParams {
                        size: dimension as u64,
                        distance: Distance::Cosine.into(),
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })
            .await
            .context(format!("Failed to create collection: {}", self.collection))?;

        tracing::info!(collection = %self.collection, dimension, "Created vector collection");
        Ok(())
    }

    /// Drop the collection if present
    pub async fn drop_collection(&self) -> Result<()> {
        if self.collection_exists().await? {
            self.client
                .delete_collection(&self.collection)
                .await
                .context(format!("Failed to delete collection: {}", self.collection))?;
            tracing::info!(collection = %self.collection, "Dropped vector collection");
        }
        Ok(())
    }

    /// Insert or replace segments with their embeddings
    pub async fn upsert(&self, items: Vec<(StoredSegment, Vec<f32>)>) -> Result<usize> {
        let total = items.len();
        let points: Vec<PointStruct> = items
            .into_iter()
            .map(|(segment, embedding)| {
                let mut payload: HashMap<String, QdrantValue> = HashMap::new();
                payload.insert(SECTION_KEY.to_string(), QdrantValue::from(segment.section));
                payload.insert(TEXT_KEY.to_string(), QdrantValue::from(segment.text));
                payload.insert(DOCUMENT_KEY.to_string(), QdrantValue::from(segment.document));
                PointStruct::new(segment.id, embedding, payload)
            })
            .collect();

        for batch in points.chunks(UPSERT_BATCH) {
            self.client
                .upsert_points_blocking(&self.collection, None, batch.to_vec(), None)
                .await
                .context("Failed to upsert points")?;
        }

        Ok(total)
    }

    /// Number of stored points
    pub async fn count(&self) -> Result<u64> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .context("Failed to get collection info")?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }
}

#[async_trait]
impl SegmentSearch for VectorStore {
    async fn collection_exists(&self) -> Result<bool> {
        let collections = self
            .client
            .list_collections()
            .await
            .context("Failed to list collections")?;

        Ok(collections.collections.iter().any(|c| c.name == self.collection))
    }

    async fn search(&self, embedding: Vec<f32>, top_k: usize, threshold: f32) -> Result<Vec<StoredSegment>> {
        let response = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection.clone(),
                vector: embedding,
                limit: top_k as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                score_threshold: Some(threshold),
                ..Default::default()
            })
            .await
            .context("Failed to search points")?;

        let segments = response
            .result
            .into_iter()
            .map(|point| StoredSegment {
                id: point_id_to_string(&point.id),
                section: payload_string(&point.payload, SECTION_KEY),
                text: payload_string(&point.payload, TEXT_KEY),
                document: payload_string(&point.payload, DOCUMENT_KEY),
                score: point.score,
            })
            .collect();

        Ok(segments)
    }
}

fn payload_string(payload: &HashMap<String, QdrantValue>, key: &str) -> String {
    payload
        .get(key)
        .and_then(|v| match &v.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn point_id_to_string(point_id: &Option<PointId>) -> String {
    point_id
        .as_ref()
        .and_then(|id| match &id.point_id_options {
            Some(PointIdOptions::Num(n)) => Some(n.to_string()),
            Some(PointIdOptions::Uuid(u)) => Some(u.clone()),
            None => None,
        })
        .unwrap_or_else(|| "unknown".to_string())
}
