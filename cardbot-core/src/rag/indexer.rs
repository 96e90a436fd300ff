//! File collection and text chunking for knowledge base ingestion.

use crate::config::IndexerConfig;
use crate::patterns::{is_binary, should_exclude};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Errors that can occur during file indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// An I/O error occurred while reading files or directories.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid chunking: overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidChunking { chunk_size: usize, overlap: usize },
}

/// Result type for indexing operations.
pub type Result<T> = std::result::Result<T, IndexerError>;

/// Splits text into overlapping chunks of at most `chunk_size` bytes.
///
/// Chunk boundaries are moved to the nearest UTF-8 character boundary, so a
/// multi-byte character is never split.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(IndexerError::InvalidChunking { chunk_size, overlap });
    }

    if text.trim().is_empty() {
        return Ok(vec![]);
    }

    if text.len() <= chunk_size {
        return Ok(vec![text.to_string()]);
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + chunk_size).min(text.len());

        // Find the nearest character boundary at or before 'end'
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        // A single character wider than the chunk: take it whole
        if end == start {
            end = start + 1;
            while end < text.len() && !text.is_char_boundary(end) {
                end += 1;
            }
        }

        chunks.push(text[start..end].to_string());

        if end == text.len() {
            break;
        }

        let next = start + (chunk_size - overlap);
        start = next.min(end).max(start + 1);

        // Adjust start to nearest char boundary
        while start < text.len() && !text.is_char_boundary(start) {
            start += 1;
        }
    }

    Ok(chunks)
}

/// A file that has been collected and read for indexing.
#[derive(Debug, Clone)]
pub struct IndexedFile {
    pub path: PathBuf,
    pub content: String,
}

/// Recursively collects all indexable files under `dir_path`.
///
/// Binary and unreadable files are skipped, as are paths with a component
/// matching `config.exclude_patterns`. When `config.extensions` is non-empty
/// only those extensions are read. Files are returned sorted by path.
pub async fn collect_files(dir_path: impl AsRef<Path>, config: &IndexerConfig) -> Result<Vec<IndexedFile>> {
    let mut files = Vec::new();
    collect_files_recursive(dir_path.as_ref(), &mut files, config).await?;
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn collect_files_recursive<'a>(
    dir: &'a Path,
    files: &'a mut Vec<IndexedFile>,
    config: &'a IndexerConfig,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            // Only the entry itself: the root may live under an excluded name
            if should_exclude(Path::new(&entry.file_name()), &config.exclude_patterns) {
                continue;
            }

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                collect_files_recursive(&path, files, config).await?;
            } else if file_type.is_file() && is_indexable(&path, &config.extensions) {
                match fs::read_to_string(&path).await {
                    Ok(content) => files.push(IndexedFile { path, content }),
                    Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable file"),
                }
            }
        }

        Ok(())
    })
}

/// Checks if a file should be indexed based on its extension.
///
/// If `extensions` is empty, every non-binary file is indexable.
fn is_indexable(path: &Path, extensions: &[String]) -> bool {
    if is_binary(path) {
        return false;
    }

    if extensions.is_empty() {
        return true;
    }

    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e == ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text_small() {
        let chunks = chunk_text("Hello", 10, 2).unwrap();
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn test_chunk_text_with_overlap() {
        let chunks = chunk_text("0123456789ABCDEF", 10, 2).unwrap();
        assert_eq!(chunks, vec!["0123456789", "89ABCDEF"]);
    }

    #[test]
    fn test_chunk_text_blank() {
        assert!(chunk_text("  \n ", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn test_chunk_text_utf8_boundaries() {
        let text = "héllo wörld ünïcode";
        let chunks = chunk_text(text, 5, 1).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 5);
        }
        assert!(chunks.first().unwrap().starts_with('h'));
        assert!(chunks.last().unwrap().ends_with('e'));
    }

    #[test]
    fn test_chunk_text_rejects_overlap() {
        assert!(matches!(
            chunk_text("abc", 4, 4),
            Err(IndexerError::InvalidChunking { .. })
        ));
    }

    #[test]
    fn test_is_indexable() {
        let extensions = vec!["md".to_string(), "txt".to_string()];

        assert!(is_indexable(Path::new("about.md"), &extensions));
        assert!(is_indexable(Path::new("contact.txt"), &extensions));
        assert!(!is_indexable(Path::new("resume.yaml"), &extensions));
        assert!(!is_indexable(Path::new("README"), &extensions));
    }

    #[test]
    fn test_is_indexable_empty_extensions() {
        let empty: Vec<String> = vec![];

        assert!(is_indexable(Path::new("README"), &empty));
        assert!(is_indexable(Path::new("about.md"), &empty));
        assert!(!is_indexable(Path::new("portrait.png"), &empty));
    }

    #[tokio::test]
    async fn test_collect_files_skips_excluded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("about.md"), "Ada Lovelace").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("HEAD"), "ref").unwrap();
        std::fs::create_dir(dir.path().join("projects")).unwrap();
        std::fs::write(dir.path().join("projects").join("engine.md"), "Analytical").unwrap();

        let files = collect_files(dir.path(), &IndexerConfig::default()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();

        assert_eq!(names, vec![PathBuf::from("about.md"), PathBuf::from("projects/engine.md")]);
    }
}
