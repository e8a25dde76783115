//! Monologue generation with interleaved chat reactions.
//!
//! Each iteration: hold off until the podcast queue has room, generate a
//! monologue on the current topic, split it into sentences and push them
//! one by one to the podcast queue while answering every pending chat
//! message in between. Reactions are framed by the announced next topic.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chat::ChatMessage;
use crate::config::{GeneratorConfig, QueueNames};
use crate::error::StoreError;
use crate::llm::TextGenerator;
use crate::prompts;
use crate::sanitize;
use crate::shutdown::sleep_or_cancelled;
use crate::store::QueueStore;

/// A generated monologue split for playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monologue {
    pub sentences: Vec<String>,
    /// Empty when the model left out the marker.
    pub next_topic: String,
}

/// Split raw model output at `marker` into period-terminated sentences and the next topic.
pub fn split_monologue(text: &str, marker: &str) -> Monologue {
    let mut parts = text.split(marker);
    let spoken = parts.next().unwrap_or_default().trim();
    let next_topic = parts.next().map(str::trim).unwrap_or_default().to_string();

    let sentences = spoken
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{s}."))
        .collect();

    Monologue { sentences, next_topic }
}

pub struct ContentGenerator {
    store: Arc<dyn QueueStore>,
    llm: Arc<dyn TextGenerator>,
    queues: QueueNames,
    config: GeneratorConfig,
    current_topic: String,
}

impl ContentGenerator {
    pub fn new(store: Arc<dyn QueueStore>, llm: Arc<dyn TextGenerator>, queues: QueueNames, config: GeneratorConfig) -> Self {
        let current_topic = config.initial_topic.clone();
        Self {
            store,
            llm,
            queues,
            config,
            current_topic,
        }
    }

    pub fn current_topic(&self) -> &str {
        &self.current_topic
    }

    /// Generate monologues until cancelled.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!("Content generator started on topic: {}", self.current_topic);

        while !cancel.is_cancelled() {
            if let Err(e) = self.run_once(&cancel).await {
                error!("Generator iteration failed: {e}");
                if !sleep_or_cancelled(self.config.failure_pause(), &cancel).await {
                    break;
                }
            }
        }

        info!("Content generator stopped");
    }

    /// One monologue: wait for queue capacity, generate, then emit with interleaved reactions.
    pub async fn run_once(&mut self, cancel: &CancellationToken) -> Result<(), StoreError> {
        self.wait_for_capacity(cancel).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        let topic = self.current_topic.clone();
        info!("Generating monologue on topic: {topic}");

        let raw = self.generate_monologue(&topic).await?;
        let monologue = split_monologue(raw.as_deref().unwrap_or_default(), &self.config.topic_marker);

        if monologue.sentences.is_empty() {
            if raw.is_none() {
                warn!("Monologue generation failed, retrying in {:?}", self.config.failure_pause());
            } else {
                warn!("Monologue has no sentences, retrying in {:?}", self.config.failure_pause());
            }
            sleep_or_cancelled(self.config.failure_pause(), cancel).await;
            return Ok(());
        }

        self.store
            .push_front_bounded(&self.queues.topics, &topic, self.config.topic_history_len)
            .await?;

        if monologue.next_topic.is_empty() {
            warn!("Monologue has no next topic, staying on: {topic}");
        } else {
            self.current_topic = monologue.next_topic.clone();
        }

        info!("Generated {} sentences", monologue.sentences.len());
        info!("Chat queue: {}", self.store.length(&self.queues.chat).await?);
        info!("Podcast queue: {}", self.store.length(&self.queues.podcast).await?);

        for sentence in &monologue.sentences {
            self.store.push_tail(&self.queues.podcast, sentence).await?;
            self.drain_chat(&self.current_topic).await?;
            if !sleep_or_cancelled(self.config.sentence_pause(), cancel).await {
                return Ok(());
            }
        }
        info!("Finished monologue, next topic: {}", self.current_topic);
        Ok(())
    }

    async fn generate_monologue(&self, topic: &str) -> Result<Option<String>, StoreError> {
        let history = self.store.range(&self.queues.topics).await?;
        let prompt = prompts::build_monologue_prompt(&history, topic, &self.config.topic_marker);
        Ok(self.llm.generate(&prompt).await)
    }

    /// React to every pending chat message.
    pub async fn drain_chat(&self, topic: &str) -> Result<(), StoreError> {
        while let Some(payload) = self.store.pop_head(&self.queues.chat).await? {
            self.react_to_chat(&payload, topic).await?;
        }
        Ok(())
    }

    async fn react_to_chat(&self, payload: &str, topic: &str) -> Result<(), StoreError> {
        let message: ChatMessage = match serde_json::from_str(payload) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to decode chat message {payload:?}: {e}");
                return Ok(());
            }
        };
        info!("New chat message from {}: {}", message.author, message.content);

        let prompt = prompts::build_reaction_prompt(topic, &message.content, &message.author);
        let Some(reply) = self.llm.generate(&prompt).await else {
            warn!("No reply generated for {}, skipping", message.author);
            return Ok(());
        };
        let reply = sanitize::speakable(&reply);
        debug!("Reply to {}: {reply}", message.author);

        self.store.push_tail(&self.queues.reacted, &message.spoken_line()).await?;
        self.store.push_tail(&self.queues.reacted, &reply).await?;
        Ok(())
    }

    /// Block while the podcast queue is at or above the ceiling.
    pub async fn wait_for_capacity(&self, cancel: &CancellationToken) -> Result<(), StoreError> {
        while self.store.length(&self.queues.podcast).await? >= self.config.backpressure_ceiling {
            info!("Podcast queue is full, waiting for playback to catch up");
            if !sleep_or_cancelled(self.config.backpressure_poll(), cancel).await {
                break;
            }
        }
        Ok(())
    }
}
