//! Error types shared across the pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Store connection failed: {0}")]
    Connection(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_yml::Error,
    },
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("TTS request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("TTS server returned status {0}")]
    Status(u16),
    #[error("Failed to decode WAV: {0}")]
    Wav(#[from] hound::Error),
    #[error("Audio output error: {0}")]
    Output(String),
}

#[derive(Error, Debug)]
pub enum ChatError {
    /// The chat server refused the current access token.
    #[error("Chat authentication rejected")]
    AuthRejected,
    #[error("Chat connection closed")]
    Disconnected,
    #[error("Chat I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Chat protocol error: {0}")]
    Protocol(String),
    #[error("Credential refresh failed: {0}")]
    Credentials(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
