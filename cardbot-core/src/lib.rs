//! cardbot-core - Retrieval-augmented business card assistant
//!
//! Answers visitors' questions about a person from a knowledge base of their
//! documents:
//! - LLM provider abstraction (Ollama)
//! - RAG (vector stores, indexing, retrieval)
//! - Prompt templates
//! - A minimal message graph with per-thread checkpoints (in-memory or Redis)
//! - Configuration management
//!
//! ## Primary API
//!
//! Most users want [`Assistant`]: build it from a [`Config`] and call
//! [`Assistant::run`] with a thread id and the new messages.

// Public modules
pub mod chat;
pub mod checkpoint;
pub mod config;
pub mod graph;
pub mod patterns;
pub mod prompt;
pub mod provider;
pub mod rag;

// Public exports
pub use chat::{format_messages, run_agent, Assistant};
pub use checkpoint::{Checkpoint, CheckpointSaver, MemorySaver, RedisSaver, TtlConfig};
pub use config::{CheckpointBackend, Config, IndexerConfig, StorageMode};
pub use graph::{CompiledGraph, MessagesState, RunConfig, StateGraph};
pub use prompt::{PromptTemplate, SYSTEM_PROMPT};
pub use rag::{Document, KnowledgeBase, Retriever};

// Provider exports
pub use provider::{ChatRequest, ChatResponse, Message, OllamaProvider, Provider, ProviderError, Role};
