use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::info;

use super::QueueStore;
use crate::error::StoreError;

/// Queue store backed by Redis lists.
///
/// `MultiplexedConnection` is cheap to clone, so each call clones it
/// instead of serialising callers behind a lock.
#[derive(Clone)]
pub struct RedisQueueStore {
    conn: MultiplexedConnection,
}

impl RedisQueueStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(format!("{redis_url}: {e}")))?;
        info!("Connected to Redis at {redis_url}");
        Ok(Self { conn })
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn push_tail(&self, queue: &str, item: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(queue, item).await?;
        Ok(())
    }

    async fn pop_head(&self, queue: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.lpop(queue, None).await?)
    }

    async fn length(&self, queue: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(queue).await?)
    }

    async fn push_front_bounded(&self, list: &str, item: &str, max_len: usize) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let stop = isize::try_from(max_len).unwrap_or(isize::MAX).saturating_sub(1);
        let _: () = redis::pipe()
            .atomic()
            .lpush(list, item)
            .ignore()
            .ltrim(list, 0, stop)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn range(&self, list: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.lrange(list, 0, -1).await?)
    }
}
