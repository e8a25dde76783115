//! Named FIFO queues shared by the generator, player and chat ingester.
//!
//! All coordination between the loops happens through a `QueueStore`;
//! the loops never share in-process state.
//! - `redis_store`: production backend (RPUSH/LPOP/LLEN/LPUSH+LTRIM/LRANGE)
//! - `memory`: single-process backend with the same semantics

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;

use crate::error::StoreError;

pub use self::memory::MemoryQueueStore;
pub use self::redis_store::RedisQueueStore;

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append `item` to the tail of `queue`.
    async fn push_tail(&self, queue: &str, item: &str) -> Result<(), StoreError>;

    /// Remove and return the head of `queue`, if any.
    async fn pop_head(&self, queue: &str) -> Result<Option<String>, StoreError>;

    async fn length(&self, queue: &str) -> Result<usize, StoreError>;

    /// Push `item` to the head of `list` and keep only the `max_len` most recent entries.
    async fn push_front_bounded(&self, list: &str, item: &str, max_len: usize) -> Result<(), StoreError>;

    /// Whole list, head first.
    async fn range(&self, list: &str) -> Result<Vec<String>, StoreError>;
}
