//! Playback consumer: drains the reacted and podcast queues into speech.
//!
//! Priority is strict and non-preemptive: every pending reaction is played
//! before a single podcast sentence, and a sentence already playing is
//! never interrupted by a new reaction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{PlayerConfig, QueueNames};
use crate::error::StoreError;
use crate::history::{PlaybackHistory, PlaybackRecord};
use crate::shutdown::sleep_or_cancelled;
use crate::speech::SpeechSynthesizer;
use crate::store::QueueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueDepths {
    pub chat: usize,
    pub podcast: usize,
    pub reacted: usize,
}

impl QueueDepths {
    /// Whether the player has anything to speak.
    pub fn has_playable(&self) -> bool {
        self.podcast > 0 || self.reacted > 0
    }
}

pub async fn queue_depths(store: &dyn QueueStore, queues: &QueueNames) -> Result<QueueDepths, StoreError> {
    Ok(QueueDepths {
        chat: store.length(&queues.chat).await?,
        podcast: store.length(&queues.podcast).await?,
        reacted: store.length(&queues.reacted).await?,
    })
}

/// Counters shared with the status API.
#[derive(Debug, Default)]
pub struct PlaybackStats {
    played: AtomicU64,
    failed: AtomicU64,
}

impl PlaybackStats {
    pub fn played(&self) -> u64 {
        self.played.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

pub struct PlaybackConsumer {
    store: Arc<dyn QueueStore>,
    speech: Arc<dyn SpeechSynthesizer>,
    queues: QueueNames,
    config: PlayerConfig,
    history: Option<PlaybackHistory>,
    stats: Arc<PlaybackStats>,
}

impl PlaybackConsumer {
    pub fn new(store: Arc<dyn QueueStore>, speech: Arc<dyn SpeechSynthesizer>, queues: QueueNames, config: PlayerConfig) -> Self {
        Self {
            store,
            speech,
            queues,
            config,
            history: None,
            stats: Arc::new(PlaybackStats::default()),
        }
    }

    pub fn with_history(mut self, history: PlaybackHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn stats(&self) -> Arc<PlaybackStats> {
        self.stats.clone()
    }

    /// Play queued items until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Playback consumer started");

        while !cancel.is_cancelled() {
            let played = match self.drain_once(&cancel).await {
                Ok(n) => n,
                Err(e) => {
                    error!("Playback iteration failed: {e}");
                    0
                }
            };

            if played == 0 && !sleep_or_cancelled(self.config.idle_poll(), &cancel).await {
                break;
            }
        }

        info!(
            "Playback consumer stopped ({} played, {} failed)",
            self.stats.played(),
            self.stats.failed()
        );
    }

    /// One scheduling step. Returns how many items were played.
    ///
    /// If any reaction is pending, the reacted queue is drained completely and
    /// the podcast queue is not touched. Otherwise at most one podcast item is played.
    pub async fn drain_once(&self, cancel: &CancellationToken) -> Result<usize, StoreError> {
        let depths = queue_depths(self.store.as_ref(), &self.queues).await?;
        if depths.has_playable() {
            info!(
                "Queue depths: chat={} podcast={} reacted={}",
                depths.chat, depths.podcast, depths.reacted
            );
        } else {
            debug!("Queue depths: chat={} (nothing to play)", depths.chat);
        }

        let mut played = 0;
        if depths.reacted > 0 {
            while !cancel.is_cancelled() {
                let Some(item) = self.store.pop_head(&self.queues.reacted).await? else {
                    break;
                };
                self.play(&self.queues.reacted, &item).await;
                played += 1;
            }
        } else if let Some(item) = self.store.pop_head(&self.queues.podcast).await? {
            self.play(&self.queues.podcast, &item).await;
            played += 1;
        }

        Ok(played)
    }

    async fn play(&self, queue: &str, text: &str) {
        let started = Instant::now();
        let success = self.speech.synthesize_and_play(text).await;
        let synth_ms = started.elapsed().as_millis() as i64;

        if success {
            self.stats.played.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to play item from {queue}");
        }

        if let Some(history) = &self.history {
            history.append(&PlaybackRecord::now(queue, text, synth_ms, success));
        }
    }
}
