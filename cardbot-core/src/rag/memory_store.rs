//! In-memory vector storage and search.

use super::store::{source_matches, VectorStore};
use super::types::{Document, SearchResult};
use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An in-memory vector store for document embeddings.
///
/// Search is a linear scan scored by cosine similarity. Suitable for small
/// knowledge bases and tests; everything is lost when the process ends.
#[derive(Clone, Default)]
pub struct MemoryStore {
    documents: Arc<RwLock<Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn add(&self, documents: Vec<Document>) -> Result<()> {
        let mut docs = self.documents.write().await;
        for document in documents {
            match docs.iter_mut().find(|d| d.id == document.id) {
                Some(existing) => *existing = document,
                None => docs.push(document),
            }
        }
        Ok(())
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let docs = self.documents.read().await;

        let mut results: Vec<SearchResult> = docs
            .iter()
            .map(|doc| SearchResult {
                document: doc.clone(),
                score: cosine_similarity(query_embedding, &doc.embedding),
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(top_k);

        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.documents.read().await.len())
    }

    async fn clear(&self) -> Result<()> {
        self.documents.write().await.clear();
        Ok(())
    }

    async fn sources(&self) -> Result<Vec<String>> {
        let docs = self.documents.read().await;
        let sources: BTreeSet<String> = docs
            .iter()
            .filter_map(|d| d.source().map(str::to_string))
            .collect();
        Ok(sources.into_iter().collect())
    }

    async fn remove_by_source(&self, source_path: &str) -> Result<usize> {
        let mut docs = self.documents.write().await;
        let before = docs.len();
        docs.retain(|d| !d.source().is_some_and(|s| source_matches(s, source_path)));
        Ok(before - docs.len())
    }
}

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero magnitude.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_orders_and_truncates() {
        let store = MemoryStore::new();
        store
            .add(vec![
                Document::new("cats", "cats", vec![1.0, 0.0, 0.0]),
                Document::new("dogs", "dogs", vec![0.0, 1.0, 0.0]),
                Document::new("both", "both", vec![0.7, 0.7, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.id, "cats");
        assert_eq!(results[1].document.id, "both");
    }

    #[tokio::test]
    async fn test_add_replaces_same_id() {
        let store = MemoryStore::new();
        store.add(vec![Document::new("1", "old", vec![1.0])]).await.unwrap();
        store.add(vec![Document::new("1", "new", vec![1.0])]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let results = store.search(&[1.0], 5).await.unwrap();
        assert_eq!(results[0].document.content, "new");
    }

    #[tokio::test]
    async fn test_remove_by_source_directory() {
        let store = MemoryStore::new();
        store
            .add(vec![
                Document::new("a", "a", vec![1.0]).with_metadata("source", "card/about.md"),
                Document::new("b", "b", vec![1.0]).with_metadata("source", "card/contact.md"),
                Document::new("c", "c", vec![1.0]).with_metadata("source", "notes.md"),
            ])
            .await
            .unwrap();

        assert_eq!(store.sources().await.unwrap(), vec!["card/about.md", "card/contact.md", "notes.md"]);
        assert_eq!(store.remove_by_source("card").await.unwrap(), 2);
        assert_eq!(store.sources().await.unwrap(), vec!["notes.md"]);
    }
}
