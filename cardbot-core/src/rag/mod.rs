//! Retrieval Augmented Generation (RAG) system.
//!
//! The knowledge base holds short documents about the card owner. Each turn
//! of the conversation retrieves the documents most similar to the latest
//! user message and hands their text to the prompt as context.
//!
//! - [`Retriever`]: embeds a query and returns the top-k documents
//! - [`KnowledgeBase`]: ingests files and text into a [`VectorStore`]
//! - [`VectorStore`]: in-memory or Qdrant-backed similarity search
//!
//! Ingestion splits text into overlapping chunks (default 512 bytes with a
//! 50 byte overlap), embeds each chunk and stores it with its source path.

mod embedder;
mod indexer;
mod memory_store;
mod qdrant_store;
mod store;
mod types;

pub use embedder::{Embedder, EmbedderError};
pub use indexer::{chunk_text, collect_files, IndexedFile, IndexerError};
pub use memory_store::MemoryStore;
pub use qdrant_store::QdrantStore;
pub use store::{create_vector_store, VectorStore};
pub use types::{Document, SearchResult};

use crate::config::{IndexerConfig, RagConfig};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Embedder error: {0}")]
    Embedder(#[from] EmbedderError),

    #[error("Indexer error: {0}")]
    Indexer(#[from] IndexerError),

    #[error("Vector store error: {0:#}")]
    Store(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;

const BATCH_SIZE: usize = 32;

/// Joins document contents with a blank line between them.
pub fn format_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Finds the documents most similar to a query.
#[derive(Clone)]
pub struct Retriever {
    embedder: Embedder,
    store: Arc<dyn VectorStore>,
    k: usize,
}

impl Retriever {
    pub fn new(embedder: Embedder, store: Arc<dyn VectorStore>, k: usize) -> Self {
        Self { embedder, store, k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Returns up to `k` documents, most similar first.
    ///
    /// An empty knowledge base returns no documents without embedding the query.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let count = self.store.count().await.map_err(RagError::Store)?;
        if count == 0 || self.k == 0 {
            debug!(count, k = self.k, "Nothing to retrieve");
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        let results = self.store
            .search(&query_embedding, self.k)
            .await
            .map_err(RagError::Store)?;

        for (i, result) in results.iter().enumerate() {
            debug!(rank = i + 1, score = result.score, source = ?result.document.source(), "Retrieved document");
        }
        info!(results = results.len(), "Retrieved context documents");

        Ok(results.into_iter().map(|r| r.document).collect())
    }
}

/// Ingests documents into the vector store.
#[derive(Clone)]
pub struct KnowledgeBase {
    embedder: Embedder,
    store: Arc<dyn VectorStore>,
    chunk_size: usize,
    chunk_overlap: usize,
    indexer: IndexerConfig,
}

impl KnowledgeBase {
    pub fn new(embedder: Embedder, store: Arc<dyn VectorStore>, config: &RagConfig) -> Self {
        Self {
            embedder,
            store,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            indexer: config.indexer.clone(),
        }
    }

    /// A retriever over the same store and embedding model.
    pub fn retriever(&self, k: usize) -> Retriever {
        Retriever::new(self.embedder.clone(), Arc::clone(&self.store), k)
    }

    /// Adds a single piece of text as one document.
    pub async fn add_text(&self, content: &str, source: &str) -> Result<()> {
        let embedding = self.embedder.embed(content).await?;

        let document = Document::new(format!("{}_{}", source, Uuid::new_v4()), content, embedding)
            .with_metadata("source", source);

        self.store.add(vec![document]).await.map_err(RagError::Store)
    }

    /// Indexes a file, or every indexable file under a directory.
    ///
    /// Returns the number of files indexed.
    pub async fn index_path(&self, path: &Path) -> Result<usize> {
        if path.is_dir() {
            self.index_directory(path).await
        } else {
            self.index_file(path).await.map(|_| 1)
        }
    }

    /// Recursively indexes a directory. Returns the number of files indexed.
    pub async fn index_directory(&self, dir_path: &Path) -> Result<usize> {
        let files = collect_files(dir_path, &self.indexer).await?;
        info!(files = files.len(), dir = %dir_path.display(), "Indexing directory");

        let mut indexed_count = 0;
        let mut batch = Vec::new();

        for file in files {
            let source = file.path.to_string_lossy().to_string();
            let chunks = chunk_text(&file.content, self.chunk_size, self.chunk_overlap)?;
            self.remove_stale(&source).await?;
            if chunks.is_empty() {
                warn!(path = %source, "No content to index");
                continue;
            }

            for (i, chunk) in chunks.into_iter().enumerate() {
                batch.push((source.clone(), i, chunk));
                if batch.len() >= BATCH_SIZE {
                    self.process_batch(&mut batch).await?;
                }
            }

            indexed_count += 1;
            debug!(path = %source, "File queued for indexing");
        }

        if !batch.is_empty() {
            self.process_batch(&mut batch).await?;
        }

        Ok(indexed_count)
    }

    /// Indexes a single file. Returns the number of chunks stored.
    pub async fn index_file(&self, file_path: &Path) -> Result<usize> {
        let content = tokio::fs::read_to_string(file_path)
            .await
            .map_err(IndexerError::Io)?;

        let source = file_path.to_string_lossy().to_string();
        let chunks = chunk_text(&content, self.chunk_size, self.chunk_overlap)?;
        let chunk_count = chunks.len();
        self.remove_stale(&source).await?;

        let mut batch = Vec::new();
        for (i, chunk) in chunks.into_iter().enumerate() {
            batch.push((source.clone(), i, chunk));
            if batch.len() >= BATCH_SIZE {
                self.process_batch(&mut batch).await?;
            }
        }
        if !batch.is_empty() {
            self.process_batch(&mut batch).await?;
        }

        info!(path = %source, chunks = chunk_count, "Indexed file");
        Ok(chunk_count)
    }

    /// Drops the chunks stored by a previous indexing of `source`.
    async fn remove_stale(&self, source: &str) -> Result<()> {
        let removed = self.remove_source(source).await?;
        if removed > 0 {
            debug!(path = %source, removed, "Removed previously indexed chunks");
        }
        Ok(())
    }

    async fn process_batch(&self, batch: &mut Vec<(String, usize, String)>) -> Result<()> {
        let texts: Vec<&str> = batch.iter().map(|(_, _, chunk)| chunk.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let documents: Vec<Document> = batch
            .drain(..)
            .zip(embeddings)
            .map(|((source, i, chunk), embedding)| {
                Document::new(format!("{}_chunk_{}", source, i), chunk, embedding)
                    .with_metadata("source", source)
                    .with_metadata("chunk", i.to_string())
            })
            .collect();

        debug!(documents = documents.len(), "Storing batch");
        self.store.add(documents).await.map_err(RagError::Store)
    }

    /// Number of stored documents (chunks, not files).
    pub async fn count(&self) -> Result<usize> {
        self.store.count().await.map_err(RagError::Store)
    }

    pub async fn sources(&self) -> Result<Vec<String>> {
        self.store.sources().await.map_err(RagError::Store)
    }

    /// Removes every document from `source_path` (file or directory).
    pub async fn remove_source(&self, source_path: &str) -> Result<usize> {
        self.store.remove_by_source(source_path).await.map_err(RagError::Store)
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await.map_err(RagError::Store)
    }
}
