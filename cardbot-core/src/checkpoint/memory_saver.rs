//! In-process checkpoint saver.

use super::{Checkpoint, CheckpointSaver, Result, TtlConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry {
    checkpoint: Checkpoint,
    expires_at: Instant,
}

/// Keeps the latest checkpoint per thread in memory.
///
/// Expired threads read as absent. They are dropped when read and on every write.
pub struct MemorySaver {
    ttl: TtlConfig,
    threads: Mutex<HashMap<String, Entry>>,
}

impl MemorySaver {
    pub fn new(ttl: TtlConfig) -> Self {
        Self {
            ttl,
            threads: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live (unexpired) threads.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let mut threads = self.threads.lock().await;
        threads.retain(|_, entry| entry.expires_at > now);
        threads.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CheckpointSaver for MemorySaver {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let now = Instant::now();
        let mut threads = self.threads.lock().await;

        let expired = match threads.get_mut(thread_id) {
            None => return Ok(None),
            Some(entry) if entry.expires_at <= now => true,
            Some(entry) => {
                if self.ttl.refresh_on_read {
                    entry.expires_at = now + self.ttl.default_ttl;
                }
                return Ok(Some(entry.checkpoint.clone()));
            }
        };

        if expired {
            threads.remove(thread_id);
        }
        Ok(None)
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        let now = Instant::now();
        let mut threads = self.threads.lock().await;

        // Threads that are never read again are freed here
        threads.retain(|_, entry| entry.expires_at > now);
        threads.insert(
            checkpoint.thread_id.clone(),
            Entry {
                checkpoint,
                expires_at: now + self.ttl.default_ttl,
            },
        );
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.threads.lock().await.remove(thread_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;
    use std::time::Duration;

    fn saver(refresh_on_read: bool) -> MemorySaver {
        MemorySaver::new(TtlConfig {
            default_ttl: Duration::from_secs(60),
            refresh_on_read,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_then_get() {
        let saver = saver(true);
        saver.put(Checkpoint::new("t1", 1, vec![Message::user("hi")])).await.unwrap();

        let checkpoint = saver.get("t1").await.unwrap().unwrap();
        assert_eq!(checkpoint.messages[0].content, "hi");
        assert!(saver.get("t2").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_thread_expires_after_ttl() {
        let saver = saver(false);
        saver.put(Checkpoint::new("t1", 1, vec![])).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(saver.get("t1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(saver.get("t1").await.unwrap().is_none());
        assert!(saver.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_on_read_extends_life() {
        let saver = saver(true);
        saver.put(Checkpoint::new("t1", 1, vec![])).await.unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(saver.get("t1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(saver.get("t1").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_replaces_and_resets_expiry() {
        let saver = saver(false);
        saver.put(Checkpoint::new("t1", 1, vec![])).await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;
        saver.put(Checkpoint::new("t1", 2, vec![])).await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;

        assert_eq!(saver.get("t1").await.unwrap().unwrap().step, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_frees_expired_threads() {
        let saver = saver(false);
        for i in 0..1000 {
            saver.put(Checkpoint::new(format!("t{}", i), 1, vec![])).await.unwrap();
        }

        tokio::time::advance(Duration::from_secs(3600)).await;
        saver.put(Checkpoint::new("fresh", 1, vec![])).await.unwrap();

        assert_eq!(saver.threads.lock().await.len(), 1);
        assert!(saver.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_thread() {
        let saver = saver(true);
        saver.put(Checkpoint::new("t1", 1, vec![])).await.unwrap();
        saver.delete_thread("t1").await.unwrap();
        assert!(saver.get("t1").await.unwrap().is_none());
    }
}
