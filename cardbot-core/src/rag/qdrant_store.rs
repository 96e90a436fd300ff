//! Qdrant vector database storage implementation.
//!
//! Documents are upserted under a stable point id derived from the document
//! id, so storing a document id twice keeps a single point.

use super::store::{source_matches, VectorStore};
use super::types::{Document, SearchResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use qdrant_client::{
    Payload, Qdrant,
    qdrant::{
        vectors_config::Config, CreateCollectionBuilder, DeletePointsBuilder, Distance,
        PointId, PointStruct, RetrievedPoint, ScrollPointsBuilder, SearchPointsBuilder,
        UpsertPointsBuilder, VectorParamsBuilder, VectorsConfig,
    },
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

const SCROLL_PAGE: u32 = 100;

/// Qdrant-based vector store for document embeddings.
#[derive(Clone)]
pub struct QdrantStore {
    client: Arc<Qdrant>,
    collection_name: String,
    vector_size: u64,
}

impl QdrantStore {
    /// Connects to a Qdrant server and ensures the collection exists.
    pub async fn new(url: &str, collection_name: &str, vector_size: u64) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .context("Failed to connect to Qdrant server")?;

        let store = Self {
            client: Arc::new(client),
            collection_name: collection_name.to_string(),
            vector_size,
        };

        store.ensure_collection().await?;

        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection_name)
            .await
            .context("Failed to check collection")?;

        if !exists {
            debug!(collection = %self.collection_name, size = self.vector_size, "Creating Qdrant collection");
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection_name)
                        .vectors_config(VectorsConfig {
                            config: Some(Config::Params(
                                VectorParamsBuilder::new(self.vector_size, Distance::Cosine).build()
                            )),
                        })
                )
                .await
                .context("Failed to create collection")?;
        }

        Ok(())
    }

    /// Visits every point in the collection, one scroll page at a time.
    async fn scroll_all<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&RetrievedPoint) + Send,
    {
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection_name)
                .limit(SCROLL_PAGE)
                .with_payload(true);

            if let Some(off) = offset.take() {
                builder = builder.offset(off);
            }

            let page = self.client
                .scroll(builder)
                .await
                .context("Failed to scroll points")?;

            page.result.iter().for_each(&mut visit);

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(())
    }
}

/// Stable numeric point id for a document id.
fn point_id(document_id: &str) -> u64 {
    let digest = Sha256::digest(document_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn payload_str(payload: &HashMap<String, qdrant_client::qdrant::Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn add(&self, documents: Vec<Document>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let points = documents
            .into_iter()
            .map(|document| {
                let mut payload = serde_json::Map::new();
                for (key, value) in &document.metadata {
                    payload.insert(key.clone(), json!(value));
                }
                payload.insert("content".to_string(), json!(document.content));
                payload.insert("id".to_string(), json!(document.id));

                let payload = Payload::try_from(serde_json::Value::Object(payload))
                    .context("Failed to build point payload")?;
                Ok(PointStruct::new(point_id(&document.id), document.embedding, payload))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points))
            .await
            .context("Failed to upsert points")?;

        Ok(())
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, query_embedding.to_vec(), top_k as u64)
                    .with_payload(true)
            )
            .await
            .context("Failed to search points")?;

        let results = response
            .result
            .into_iter()
            .map(|point| {
                let payload = point.payload;
                let metadata: HashMap<String, String> = payload
                    .iter()
                    .filter(|(k, _)| k.as_str() != "content" && k.as_str() != "id")
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect();

                let document = Document {
                    id: payload_str(&payload, "id").unwrap_or_default(),
                    content: payload_str(&payload, "content").unwrap_or_default(),
                    // Embeddings are not returned with search results
                    embedding: vec![],
                    metadata,
                };

                SearchResult {
                    document,
                    score: point.score,
                }
            })
            .collect();

        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        let info = self
            .client
            .collection_info(&self.collection_name)
            .await
            .context("Failed to get collection info")?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0) as usize)
    }

    async fn clear(&self) -> Result<()> {
        self.client
            .delete_collection(&self.collection_name)
            .await
            .context("Failed to delete collection")?;

        self.ensure_collection().await
    }

    async fn sources(&self) -> Result<Vec<String>> {
        let mut sources = BTreeSet::new();
        self.scroll_all(|point| {
            if let Some(source) = payload_str(&point.payload, "source") {
                sources.insert(source);
            }
        })
        .await?;

        Ok(sources.into_iter().collect())
    }

    async fn remove_by_source(&self, source_path: &str) -> Result<usize> {
        let mut points_to_delete: Vec<PointId> = Vec::new();
        self.scroll_all(|point| {
            let matches = payload_str(&point.payload, "source")
                .is_some_and(|source| source_matches(&source, source_path));
            if let (true, Some(id)) = (matches, &point.id) {
                points_to_delete.push(id.clone());
            }
        })
        .await?;

        let count = points_to_delete.len();

        if !points_to_delete.is_empty() {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&self.collection_name)
                        .points(points_to_delete)
                )
                .await
                .context("Failed to delete points")?;
        }

        Ok(count)
    }
}
