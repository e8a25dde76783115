//! Speech synthesis sinks for the playback consumer.
//!
//! - `http`: remote TTS server + local rodio playback
//! - `SilentSynthesizer`: logs instead of speaking (dry runs)

pub mod http;

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::info;

pub use self::http::HttpSpeechSynthesizer;

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text` and wait for playback to finish. Failures are logged and reported as `false`.
    async fn synthesize_and_play(&self, text: &str) -> bool;

    fn is_speaking(&self) -> bool {
        false
    }

    /// Stop the current utterance, if any.
    fn skip(&self) {}
}

/// Truncate to at most `max_chars` characters.
pub fn cap_text(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Default)]
pub struct SilentSynthesizer {
    spoken: AtomicUsize,
}

impl SilentSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpeechSynthesizer for SilentSynthesizer {
    async fn synthesize_and_play(&self, text: &str) -> bool {
        let n = self.spoken.fetch_add(1, Ordering::Relaxed) + 1;
        info!("[silent #{n}] {text}");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_respects_char_boundaries() {
        assert_eq!(cap_text("привет", 3), "при");
        assert_eq!(cap_text("short", 100), "short");
        assert_eq!(cap_text("", 0), "");
    }

    #[tokio::test]
    async fn silent_synthesizer_always_succeeds() {
        let synth = SilentSynthesizer::new();
        assert!(synth.synthesize_and_play("тест").await);
        assert!(!synth.is_speaking());
    }
}
