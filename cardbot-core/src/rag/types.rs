use std::collections::HashMap;

/// A document stored in the knowledge base.
///
/// Each document holds a piece of text about the card owner, its vector
/// embedding for similarity search, and metadata such as the file it came
/// from.
///
/// # Example
///
/// ```
/// use cardbot_core::rag::Document;
///
/// let doc = Document::new("about_0", "Ada writes Rust at Acme.", vec![0.1, 0.2, 0.3])
///     .with_metadata("source", "about.md");
/// assert_eq!(doc.source(), Some("about.md"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: HashMap<String, String>,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            embedding,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }
}

/// A search result containing a document and its similarity score.
///
/// Returned by vector search operations, ordered by descending similarity score.
/// With cosine similarity, scores range from -1.0 to 1.0.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub document: Document,
    pub score: f32,
}
