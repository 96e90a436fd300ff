//! Thread-scoped conversation checkpoints.
//!
//! A checkpoint is a snapshot of a conversation's messages, saved under the
//! thread id after every graph step. Only the latest checkpoint of a thread
//! is kept. Threads expire after a time-to-live; the backend enforces it.

mod memory_saver;
mod redis_saver;

pub use memory_saver::MemorySaver;
pub use redis_saver::RedisSaver;

use crate::config::{CheckpointBackend, CheckpointConfig};
use crate::provider::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Redis error: {0}")]
    Redis(#[from] bb8_redis::redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(String),

    #[error("Failed to (de)serialize checkpoint: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Snapshot of a thread's conversation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub thread_id: String,
    /// Number of graph steps recorded for this thread
    pub step: u64,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: impl Into<String>, step: u64, messages: Vec<Message>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            step,
            messages,
            created_at: Utc::now(),
        }
    }
}

/// Expiry policy for stored threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlConfig {
    pub default_ttl: Duration,
    pub refresh_on_read: bool,
}

impl TtlConfig {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            refresh_on_read: true,
        }
    }
}

impl From<&CheckpointConfig> for TtlConfig {
    fn from(config: &CheckpointConfig) -> Self {
        Self {
            default_ttl: config.ttl(),
            refresh_on_read: config.refresh_on_read,
        }
    }
}

/// Storage for the latest checkpoint of each thread.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Latest checkpoint of the thread, or `None` if absent or expired.
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Stores `checkpoint` as the thread's latest and resets its expiry.
    async fn put(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Drops everything stored for the thread.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}

/// Opens the saver selected by `config`.
pub async fn open_saver(config: &CheckpointConfig) -> Result<Arc<dyn CheckpointSaver>> {
    let ttl = TtlConfig::from(config);
    match &config.backend {
        CheckpointBackend::Memory => Ok(Arc::new(MemorySaver::new(ttl))),
        CheckpointBackend::Redis { url } => Ok(Arc::new(RedisSaver::connect(url, ttl).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_json_roundtrip_keeps_ids() {
        let checkpoint = Checkpoint::new("thread-1", 2, vec![Message::user("hi").with_id("m1")]);
        let json = serde_json::to_string(&checkpoint).unwrap();
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checkpoint);
    }

    #[test]
    fn test_ttl_from_config() {
        let config = CheckpointConfig {
            ttl_minutes: 5,
            refresh_on_read: false,
            ..CheckpointConfig::default()
        };
        let ttl = TtlConfig::from(&config);
        assert_eq!(ttl.default_ttl, Duration::from_secs(300));
        assert!(!ttl.refresh_on_read);
    }
}
