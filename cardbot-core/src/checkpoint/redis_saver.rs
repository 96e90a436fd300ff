//! Redis-backed checkpoint saver.
//!
//! Each thread's latest checkpoint is one JSON string key written with an
//! expiry; Redis drops the thread when the TTL runs out. Only commands
//! available before Redis 6.2 are used.

use super::{Checkpoint, CheckpointError, CheckpointSaver, Result, TtlConfig};
use async_trait::async_trait;
use bb8_redis::bb8::{Pool, PooledConnection};
use bb8_redis::redis;
use bb8_redis::RedisConnectionManager;
use tracing::debug;

const KEY_PREFIX: &str = "cardbot:checkpoint";

/// Checkpoint saver over a pooled Redis connection.
#[derive(Clone)]
pub struct RedisSaver {
    pool: Pool<RedisConnectionManager>,
    ttl: TtlConfig,
}

impl RedisSaver {
    /// Connects to `url` (e.g. `redis://localhost:6379/0`) and checks the server responds.
    pub async fn connect(url: &str, ttl: TtlConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(url)?;
        let pool = Pool::builder().build(manager).await?;
        let saver = Self { pool, ttl };

        {
            let mut conn = saver.connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        }
        debug!(url = %url, "Connected checkpoint saver to Redis");

        Ok(saver)
    }

    async fn connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| CheckpointError::Pool(e.to_string()))
    }

    fn ttl_seconds(&self) -> u64 {
        self.ttl.default_ttl.as_secs().max(1)
    }
}

fn thread_key(thread_id: &str) -> String {
    format!("{}:{}", KEY_PREFIX, thread_id)
}

#[async_trait]
impl CheckpointSaver for RedisSaver {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let key = thread_key(thread_id);
        let mut conn = self.connection().await?;

        // GET + EXPIRE in one transaction; GETEX would need Redis 6.2
        let payload: Option<String> = if self.ttl.refresh_on_read {
            let (payload,): (Option<String>,) = redis::pipe()
                .atomic()
                .cmd("GET")
                .arg(&key)
                .cmd("EXPIRE")
                .arg(&key)
                .arg(self.ttl_seconds())
                .ignore()
                .query_async(&mut *conn)
                .await?;
            payload
        } else {
            redis::cmd("GET").arg(&key).query_async(&mut *conn).await?
        };

        payload
            .map(|json| serde_json::from_str(&json).map_err(CheckpointError::from))
            .transpose()
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        let key = thread_key(&checkpoint.thread_id);
        let payload = serde_json::to_string(&checkpoint)?;
        let mut conn = self.connection().await?;

        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg(payload)
            .arg("EX")
            .arg(self.ttl_seconds())
            .query_async(&mut *conn)
            .await?;

        debug!(thread_id = %checkpoint.thread_id, step = checkpoint.step, "Stored checkpoint");
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("DEL")
            .arg(thread_key(thread_id))
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;
    use std::time::Duration;

    #[test]
    fn test_thread_key() {
        assert_eq!(thread_key("abc-123"), "cardbot:checkpoint:abc-123");
    }

    #[tokio::test]
    #[ignore] // Requires Redis server running
    async fn test_redis_saver_roundtrip() {
        let saver = RedisSaver::connect("redis://localhost:6379", TtlConfig::new(Duration::from_secs(60)))
            .await
            .unwrap();

        let checkpoint = Checkpoint::new("cardbot-test", 1, vec![Message::user("hi").with_id("m1")]);
        saver.put(checkpoint.clone()).await.unwrap();
        assert_eq!(saver.get("cardbot-test").await.unwrap(), Some(checkpoint));

        saver.delete_thread("cardbot-test").await.unwrap();
        assert!(saver.get("cardbot-test").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis server running
    async fn test_redis_get_refreshes_ttl() {
        let saver = RedisSaver::connect("redis://localhost:6379", TtlConfig::new(Duration::from_secs(600)))
            .await
            .unwrap();
        saver.put(Checkpoint::new("cardbot-ttl", 1, vec![])).await.unwrap();

        let key = thread_key("cardbot-ttl");
        let mut conn = saver.connection().await.unwrap();
        let _: () = redis::cmd("EXPIRE").arg(&key).arg(5).query_async(&mut *conn).await.unwrap();

        assert!(saver.get("cardbot-ttl").await.unwrap().is_some());
        let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut *conn).await.unwrap();
        assert!(ttl > 5, "ttl was {}", ttl);

        drop(conn);
        saver.delete_thread("cardbot-ttl").await.unwrap();
    }
}
