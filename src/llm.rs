//! Text generation over a chat-completions style HTTP API.
//!
//! Transient failures (429, 502, timeouts) are retried with exponential
//! backoff; everything else gives up immediately. Callers only ever see
//! `Some(text)` or `None`, failures surface through logs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::chat::credentials::CredentialProvider;
use crate::config::LlmConfig;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Option<String>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [RequestMessage<'a>; 1],
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Delay before retry number `attempt + 1`: `base * 2^attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16))
}

pub struct LlmClient {
    config: LlmConfig,
    client: Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl LlmClient {
    pub fn new(config: LlmConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            client,
            credentials,
        })
    }

    fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.config.backoff_base_ms)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Option<String> {
        let url = self.config.api_url.trim();
        if url.is_empty() {
            error!("LLM API URL is not set");
            return None;
        }

        let body = CompletionRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: [RequestMessage {
                role: "user",
                content: prompt,
            }],
        };
        let token = self.credentials.get_token().await;
        let max_attempts = self.config.max_attempts;

        for attempt in 0..max_attempts {
            debug!("LLM request attempt {}/{max_attempts} ({} prompt chars)", attempt + 1, prompt.len());

            match self.client.post(url).header("X-Auth-Token", &token).json(&body).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::OK {
                        return match resp.json::<CompletionResponse>().await {
                            Ok(data) => {
                                let content = data.choices.into_iter().next().map(|c| c.message.content);
                                if content.is_none() {
                                    error!("LLM API returned no choices");
                                }
                                content
                            }
                            Err(e) => {
                                error!("Failed to parse LLM API response: {e}");
                                None
                            }
                        };
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::BAD_GATEWAY {
                        warn!("LLM API returned {status}, attempt {}", attempt + 1);
                    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        error!("LLM API rejected the auth token ({status})");
                        return None;
                    } else {
                        let text = resp.text().await.unwrap_or_default();
                        error!("LLM API error: {status} {text}");
                        return None;
                    }
                }
                Err(e) if e.is_timeout() => {
                    warn!("LLM API request timed out, attempt {}", attempt + 1);
                }
                Err(e) => {
                    error!("LLM API request failed: {e}");
                    return None;
                }
            }

            if attempt + 1 < max_attempts {
                tokio::time::sleep(backoff_delay(self.backoff_base(), attempt)).await;
            }
        }

        warn!("LLM API still failing after {max_attempts} attempts, giving up");
        None
    }
}
