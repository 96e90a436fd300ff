//! Vector store abstraction and factory.
//!
//! This module provides a unified interface for different vector database implementations.

use super::memory_store::MemoryStore;
use super::qdrant_store::QdrantStore;
use super::types::{Document, SearchResult};
use crate::config::{StorageConfig, StorageMode};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Unified interface for vector database operations.
///
/// Implementations handle document storage, similarity search, and metadata
/// queries (in-process [`MemoryStore`], Qdrant over gRPC).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Adds or replaces documents, keyed by document id.
    async fn add(&self, documents: Vec<Document>) -> Result<()>;

    /// Searches for the most similar documents using vector similarity.
    ///
    /// Returns at most `top_k` results, sorted by descending similarity score.
    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// Returns the total number of documents in the store.
    async fn count(&self) -> Result<usize>;

    /// Removes all documents from the store.
    async fn clear(&self) -> Result<()>;

    /// Returns all unique `source` metadata values.
    async fn sources(&self) -> Result<Vec<String>>;

    /// Removes all documents whose source is `source_path` or lies under it.
    ///
    /// Returns the number of documents removed.
    async fn remove_by_source(&self, source_path: &str) -> Result<usize>;
}

/// Creates a vector store instance based on the storage mode.
///
/// - `Memory` mode keeps documents in-process
/// - `Grpc` mode uses Qdrant for remote server connectivity
pub async fn create_vector_store(
    storage_config: &StorageConfig,
    vector_size: u64,
) -> Result<Arc<dyn VectorStore>> {
    match &storage_config.storage_mode {
        StorageMode::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageMode::Grpc { url } => {
            let store = QdrantStore::new(
                url,
                &storage_config.vector_db.collection_name,
                vector_size,
            )
            .await?;
            Ok(Arc::new(store))
        }
    }
}

/// Whether a stored `source` is `path` itself or a file beneath it.
pub(crate) fn source_matches(source: &str, path: &str) -> bool {
    let source = source.replace('\\', "/");
    let path = path.replace('\\', "/");
    let path = path.trim_end_matches('/');
    source == path || source.starts_with(&format!("{}/", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_matches() {
        assert!(source_matches("docs/about.md", "docs/about.md"));
        assert!(source_matches("docs/about.md", "docs"));
        assert!(source_matches("docs/about.md", "docs/"));
        assert!(source_matches("docs\\about.md", "docs"));
        assert!(!source_matches("docs-old/about.md", "docs"));
    }

    #[tokio::test]
    async fn test_create_memory_store() {
        let store = create_vector_store(&StorageConfig::default(), 3).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
