use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::QueueStore;
use crate::error::StoreError;

/// In-process queue store. Queues are created on first use.
#[derive(Default)]
pub struct MemoryQueueStore {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn push_tail(&self, queue: &str, item: &str) -> Result<(), StoreError> {
        let mut queues = self.queues.lock().await;
        queues.entry(queue.to_string()).or_default().push_back(item.to_string());
        Ok(())
    }

    async fn pop_head(&self, queue: &str) -> Result<Option<String>, StoreError> {
        let mut queues = self.queues.lock().await;
        Ok(queues.get_mut(queue).and_then(VecDeque::pop_front))
    }

    async fn length(&self, queue: &str) -> Result<usize, StoreError> {
        let queues = self.queues.lock().await;
        Ok(queues.get(queue).map_or(0, VecDeque::len))
    }

    async fn push_front_bounded(&self, list: &str, item: &str, max_len: usize) -> Result<(), StoreError> {
        let mut queues = self.queues.lock().await;
        let entries = queues.entry(list.to_string()).or_default();
        entries.push_front(item.to_string());
        entries.truncate(max_len);
        Ok(())
    }

    async fn range(&self, list: &str) -> Result<Vec<String>, StoreError> {
        let queues = self.queues.lock().await;
        Ok(queues.get(list).map(|q| q.iter().cloned().collect()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pops_in_push_order() -> Result<(), StoreError> {
        let store = MemoryQueueStore::new();
        for item in ["p1", "p2", "p3"] {
            store.push_tail("podcast", item).await?;
        }

        assert_eq!(store.length("podcast").await?, 3);
        assert_eq!(store.pop_head("podcast").await?.as_deref(), Some("p1"));
        assert_eq!(store.pop_head("podcast").await?.as_deref(), Some("p2"));
        assert_eq!(store.pop_head("podcast").await?.as_deref(), Some("p3"));
        assert_eq!(store.pop_head("podcast").await?, None);
        assert_eq!(store.length("podcast").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn queues_are_independent() -> Result<(), StoreError> {
        let store = MemoryQueueStore::new();
        store.push_tail("chat", "a").await?;
        store.push_tail("reacted", "b").await?;

        assert_eq!(store.pop_head("reacted").await?.as_deref(), Some("b"));
        assert_eq!(store.length("chat").await?, 1);
        assert_eq!(store.length("never-used").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn bounded_history_keeps_most_recent_first() -> Result<(), StoreError> {
        let store = MemoryQueueStore::new();
        for i in 0..150 {
            store.push_front_bounded("topics", &format!("topic {i}"), 100).await?;
        }

        let topics = store.range("topics").await?;
        assert_eq!(topics.len(), 100);
        assert_eq!(topics.first().map(String::as_str), Some("topic 149"));
        assert_eq!(topics.last().map(String::as_str), Some("topic 50"));
        Ok(())
    }
}
