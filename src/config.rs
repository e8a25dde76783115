//! Configuration management for podcast-streamer.
//!
//! Loads config from a YAML file in standard locations, then applies
//! deployment overrides from the environment (and `.env`). The result is
//! validated once and passed by value into every component.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ConfigError;

/// Which loops this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    /// Generator, player, chat ingester and status API in one process.
    All,
    Generator,
    Player,
    Chat,
}

impl Role {
    pub fn runs_generator(self) -> bool {
        matches!(self, Self::All | Self::Generator)
    }

    pub fn runs_player(self) -> bool {
        matches!(self, Self::All | Self::Player)
    }

    pub fn runs_chat(self) -> bool {
        matches!(self, Self::All | Self::Chat)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_token: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_token: String::new(),
            model: String::new(),
            max_tokens: 4000,
            timeout_secs: 30,
            max_attempts: 5,
            backoff_base_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 6379,
            db: 0,
        }
    }
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueNames {
    pub chat: String,
    pub podcast: String,
    pub reacted: String,
    pub topics: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            chat: "chat_messages_queue".into(),
            podcast: "podcast_messages_queue".into(),
            reacted: "reacted_to_chat_messages_queue".into(),
            topics: "podcast_topics".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub initial_topic: String,
    pub topic_marker: String,
    pub sentence_pause_ms: u64,
    pub backpressure_ceiling: usize,
    pub backpressure_poll_secs: u64,
    pub topic_history_len: usize,
    pub failure_pause_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            initial_topic: "Зачем философия современному человеку?".into(),
            topic_marker: "НОВАЯ ТЕМА:".into(),
            sentence_pause_ms: 1000,
            backpressure_ceiling: 100,
            backpressure_poll_secs: 10,
            topic_history_len: 100,
            failure_pause_secs: 5,
        }
    }
}

impl GeneratorConfig {
    pub fn sentence_pause(&self) -> Duration {
        Duration::from_millis(self.sentence_pause_ms)
    }

    pub fn backpressure_poll(&self) -> Duration {
        Duration::from_secs(self.backpressure_poll_secs)
    }

    pub fn failure_pause(&self) -> Duration {
        Duration::from_secs(self.failure_pause_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Pause when both playback queues are empty.
    pub idle_poll_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self { idle_poll_ms: 200 }
    }
}

impl PlayerConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackend {
    Http,
    Silent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub backend: SpeechBackend,
    pub url: String,
    pub speaker: String,
    pub sample_rate: u32,
    pub max_chars: usize,
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: SpeechBackend::Http,
            url: "http://127.0.0.1:8000/tts".into(),
            speaker: "baya".into(),
            sample_rate: 24000,
            max_chars: 1000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub enabled: bool,
    pub server: String,
    pub channel: String,
    pub nick: String,
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_url: String,
    pub max_attempts: u32,
    pub max_reauth: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: "irc.chat.twitch.tv:6667".into(),
            channel: String::new(),
            nick: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            access_token: String::new(),
            refresh_token: String::new(),
            token_url: "https://id.twitch.tv/oauth2/token".into(),
            max_attempts: 10,
            max_reauth: 3,
            backoff_base_ms: 1000,
            backoff_max_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8770,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub redis: RedisConfig,
    pub store: StoreConfig,
    pub queues: QueueNames,
    pub generator: GeneratorConfig,
    pub player: PlayerConfig,
    pub speech: SpeechConfig,
    pub chat: ChatConfig,
    pub api: ApiConfig,
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from YAML, then apply environment overrides.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./podcast.yaml
    /// 2. ~/.config/podcast-streamer/podcast.yaml
    /// 3. /etc/podcast-streamer/podcast.yaml
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        // Missing .env is normal outside of deployments
        let _ = dotenv::dotenv();

        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("podcast.yaml")),
                dirs::home_dir().map(|h| h.join(".config/podcast-streamer/podcast.yaml")),
                Some(PathBuf::from("/etc/podcast-streamer/podcast.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let mut config = match resolved {
            Some(config_path) => {
                let config = Self::from_file(&config_path)?;
                info!("Loaded config from {}", config_path.display());
                config
            }
            None => {
                info!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Overlay deployment variables. `lookup` is `std::env::var` outside of tests.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key) {
                *target = value;
            }
        };

        set(&mut self.llm.api_url, "LLM_API_URL");
        set(&mut self.llm.api_token, "LLM_API_TOKEN");
        set(&mut self.llm.model, "LLM_MODEL");
        set(&mut self.redis.host, "REDIS_HOST");
        set(&mut self.chat.channel, "TWITCH_CHANNEL");
        set(&mut self.chat.client_id, "TWITCH_CLIENT_ID");
        set(&mut self.chat.client_secret, "TWITCH_CLIENT_SECRET");
        set(&mut self.chat.access_token, "TWITCH_ACCESS_TOKEN");
        set(&mut self.chat.refresh_token, "TWITCH_REFRESH_TOKEN");
        set(&mut self.speech.url, "TTS_URL");

        if let Some(port) = lookup("REDIS_PORT") {
            match port.parse() {
                Ok(port) => self.redis.port = port,
                Err(e) => warn!("Ignoring REDIS_PORT={port}: {e}"),
            }
        }
        if let Some(db) = lookup("REDIS_DB") {
            match db.parse() {
                Ok(db) => self.redis.db = db,
                Err(e) => warn!("Ignoring REDIS_DB={db}: {e}"),
            }
        }
    }

    /// Check every field the given role depends on, reporting all problems at once.
    pub fn validate(&self, role: Role) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.store.backend == StoreBackend::Redis && self.redis.port == 0 {
            problems.push("redis.port must be non-zero".to_string());
        }
        if self.store.backend == StoreBackend::Memory && role != Role::All {
            problems.push("store.backend=memory only works with --role all".to_string());
        }

        if role.runs_generator() {
            if self.llm.api_url.trim().is_empty() {
                warn!("llm.api_url is not set, text generation will return nothing");
            }
            if self.llm.model.trim().is_empty() {
                problems.push("llm.model (LLM_MODEL) is required".to_string());
            }
            if self.llm.api_token.trim().is_empty() {
                problems.push("llm.api_token (LLM_API_TOKEN) is required".to_string());
            }
            if self.llm.max_attempts == 0 {
                problems.push("llm.max_attempts must be at least 1".to_string());
            }
            if self.generator.topic_marker.trim().is_empty() {
                problems.push("generator.topic_marker must not be empty".to_string());
            }
            if self.generator.backpressure_ceiling == 0 {
                problems.push("generator.backpressure_ceiling must be at least 1".to_string());
            }
            if self.generator.topic_history_len == 0 {
                problems.push("generator.topic_history_len must be at least 1".to_string());
            }
        }

        if role.runs_player() && self.speech.backend == SpeechBackend::Http && self.speech.url.trim().is_empty() {
            problems.push("speech.url (TTS_URL) is required for the http backend".to_string());
        }

        if role.runs_chat() && (self.chat.enabled || role == Role::Chat) {
            for (value, name) in [
                (&self.chat.channel, "chat.channel (TWITCH_CHANNEL)"),
                (&self.chat.nick, "chat.nick"),
                (&self.chat.client_id, "chat.client_id (TWITCH_CLIENT_ID)"),
                (&self.chat.client_secret, "chat.client_secret (TWITCH_CLIENT_SECRET)"),
                (&self.chat.access_token, "chat.access_token (TWITCH_ACCESS_TOKEN)"),
            ] {
                if value.trim().is_empty() {
                    problems.push(format!("{name} is required"));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}
