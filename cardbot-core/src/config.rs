use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the whole assistant.
///
/// Covers the language model, the knowledge base, and where conversation
/// checkpoints live. Every section falls back to its default when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub rag: RagConfig,
    pub storage: StorageConfig,
    pub checkpoint: CheckpointConfig,
    /// Prompt template rendered for every turn.
    ///
    /// May reference `{context}`, `{chat_history}` and `{user_prompt}`.
    pub system_prompt: String,
}

/// Configuration for the AI model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
}

/// Configuration for retrieval and knowledge base ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub embedding_model: String,
    /// Dimension of the vectors produced by `embedding_model`.
    pub embedding_dim: u64,
    /// Number of documents retrieved per question
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub indexer: IndexerConfig,
}

/// Configuration for file indexing behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// File extensions to index (e.g., ["md", "txt"])
    /// Empty list (default) means index all readable text files
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Patterns to exclude - skips directories/files containing these strings
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

fn default_exclude_patterns() -> Vec<String> {
    crate::patterns::default_exclude_patterns()
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

/// Vector database storage mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum StorageMode {
    /// In-process store, lost on exit (default)
    Memory,
    /// gRPC storage - connect to an external Qdrant server
    Grpc { url: String },
}

impl Default for StorageMode {
    fn default() -> Self {
        Self::Memory
    }
}

/// Vector database storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub storage_mode: StorageMode,
    pub vector_db: VectorDbConfig,
}

/// Vector database configuration (collection name, etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbConfig {
    /// Collection/index name for storing vectors
    pub collection_name: String,
}

/// Where conversation checkpoints are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckpointBackend {
    /// In-process map, lost on exit
    Memory,
    Redis { url: String },
}

impl Default for CheckpointBackend {
    fn default() -> Self {
        Self::Memory
    }
}

/// Checkpoint persistence and expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    /// Minutes a thread survives without being written (or read, see below)
    pub ttl_minutes: u64,
    /// Reading a thread resets its expiry
    pub refresh_on_read: bool,
}

impl CheckpointConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen3:0.6b".to_string(),
            base_url: "http://localhost:11434".to_string(),
            temperature: 0.6,
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dim: 768,
            top_k: 4,
            chunk_size: 512,
            chunk_overlap: 50,
            indexer: IndexerConfig::default(),
        }
    }
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            collection_name: "cardbot_kb".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::default(),
            vector_db: VectorDbConfig::default(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::default(),
            ttl_minutes: 60,
            refresh_on_read: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            rag: RagConfig::default(),
            storage: StorageConfig::default(),
            checkpoint: CheckpointConfig::default(),
            system_prompt: crate::prompt::SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Load configuration from `config.yaml` if it exists, otherwise use defaults.
    pub fn load_or_default() -> Self {
        Self::load("config.yaml").unwrap_or_default()
    }

    /// Apply deployment overrides from `CARDBOT_*` environment variables.
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("CARDBOT_REDIS_URL") {
            self.checkpoint.backend = CheckpointBackend::Redis { url };
        }
        if let Some(url) = lookup("CARDBOT_QDRANT_URL") {
            self.storage.storage_mode = StorageMode::Grpc { url };
        }
        if let Some(model) = lookup("CARDBOT_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(base_url) = lookup("CARDBOT_OLLAMA_URL") {
            self.llm.base_url = base_url;
        }
        self
    }
}
