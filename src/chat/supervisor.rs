//! Reconnect state machine around a chat source.
//!
//! CONNECTING → CONNECTED → (session ends) → CONNECTING
//! CONNECTING/CONNECTED → (token refused) → REAUTHENTICATING → CONNECTING
//! any → (retries exhausted) → FAILED

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::credentials::CredentialProvider;
use super::ChatSource;
use crate::config::ChatConfig;
use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reauthenticating,
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Reauthenticating => write!(f, "REAUTHENTICATING"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Consecutive non-auth failures before giving up.
    pub max_attempts: u32,
    /// Consecutive token refreshes before giving up.
    pub max_reauth: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            max_reauth: config.max_reauth,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_secs(config.backoff_max_secs),
        }
    }

    fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exp).min(self.backoff_max)
    }
}

pub struct ChatSupervisor<S> {
    source: S,
    credentials: Arc<dyn CredentialProvider>,
    policy: RetryPolicy,
    state: ConnectionState,
    failures: u32,
    reauths: u32,
    last_error: Option<ChatError>,
}

impl<S: ChatSource> ChatSupervisor<S> {
    pub fn new(source: S, credentials: Arc<dyn CredentialProvider>, policy: RetryPolicy) -> Self {
        Self {
            source,
            credentials,
            policy,
            state: ConnectionState::Connecting,
            failures: 0,
            reauths: 0,
            last_error: None,
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            info!("Chat: {} → {}", self.state, next);
            self.state = next;
        }
    }

    /// Run until cancelled (`Ok`) or until the retry budget is spent (`Err`).
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ChatError> {
        loop {
            match self.state {
                ConnectionState::Connecting => {
                    let token = self.credentials.get_token().await;
                    let result = tokio::select! {
                        r = self.source.connect(&token) => r,
                        () = cancel.cancelled() => return Ok(()),
                    };
                    match result {
                        Ok(()) => {
                            self.failures = 0;
                            self.reauths = 0;
                            self.transition(ConnectionState::Connected);
                        }
                        Err(ChatError::AuthRejected) => self.transition(ConnectionState::Reauthenticating),
                        Err(e) => {
                            if !self.back_off(e, &cancel).await {
                                return Ok(());
                            }
                        }
                    }
                }
                ConnectionState::Connected => {
                    let result = tokio::select! {
                        r = self.source.pump() => r,
                        () = cancel.cancelled() => return Ok(()),
                    };
                    match result {
                        Ok(()) | Err(ChatError::Disconnected) => {
                            warn!("Chat session ended, reconnecting");
                            self.transition(ConnectionState::Connecting);
                        }
                        Err(ChatError::AuthRejected) => self.transition(ConnectionState::Reauthenticating),
                        Err(e) => {
                            if !self.back_off(e, &cancel).await {
                                return Ok(());
                            }
                        }
                    }
                }
                ConnectionState::Reauthenticating => {
                    if self.reauths >= self.policy.max_reauth {
                        error!("Chat token refused {} times in a row", self.reauths);
                        self.last_error = Some(ChatError::AuthRejected);
                        self.transition(ConnectionState::Failed);
                        continue;
                    }
                    self.reauths += 1;
                    match self.credentials.refresh().await {
                        Ok(_) => self.transition(ConnectionState::Connecting),
                        Err(e) => {
                            error!("Chat token refresh failed: {e}");
                            self.last_error = Some(e);
                            self.transition(ConnectionState::Failed);
                        }
                    }
                }
                ConnectionState::Failed => {
                    return Err(self.last_error.take().unwrap_or(ChatError::Disconnected));
                }
            }
        }
    }

    /// Count an unknown failure and wait before reconnecting.
    /// Returns false if cancelled while waiting.
    async fn back_off(&mut self, err: ChatError, cancel: &CancellationToken) -> bool {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts {
            error!("Chat failed {} times in a row: {err}", self.failures);
            self.last_error = Some(err);
            self.transition(ConnectionState::Failed);
            return true;
        }

        let delay = self.policy.backoff(self.failures);
        warn!("Chat error: {err}, retrying in {delay:?} ({}/{})", self.failures, self.policy.max_attempts);
        self.transition(ConnectionState::Connecting);
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = cancel.cancelled() => false,
        }
    }
}
