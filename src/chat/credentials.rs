//! Access-token providers.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::ChatConfig;
use crate::error::ChatError;

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_token(&self) -> String;

    /// Invalidate the current token and obtain a replacement.
    async fn refresh(&self) -> Result<String, ChatError>;
}

/// A fixed token that cannot be refreshed (LLM API keys).
pub struct StaticCredentials {
    token: String,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn get_token(&self) -> String {
        self.token.clone()
    }

    async fn refresh(&self) -> Result<String, ChatError> {
        Err(ChatError::Credentials("static token cannot be refreshed".into()))
    }
}

struct Tokens {
    access: String,
    refresh: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

/// Twitch OAuth tokens, refreshed with the refresh-token grant.
pub struct TwitchTokenManager {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    tokens: RwLock<Tokens>,
}

impl TwitchTokenManager {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            client: Client::new(),
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            tokens: RwLock::new(Tokens {
                access: config.access_token.clone(),
                refresh: config.refresh_token.clone(),
            }),
        }
    }
}

#[async_trait]
impl CredentialProvider for TwitchTokenManager {
    async fn get_token(&self) -> String {
        self.tokens.read().await.access.clone()
    }

    async fn refresh(&self) -> Result<String, ChatError> {
        let mut tokens = self.tokens.write().await;
        if tokens.refresh.is_empty() {
            return Err(ChatError::Credentials("no refresh token configured".into()));
        }

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", tokens.refresh.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let resp = self
            .client
            .post(&self.token_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ChatError::Credentials(format!("token request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(ChatError::Credentials(format!("token endpoint returned {}", resp.status())));
        }

        let data: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ChatError::Credentials(format!("malformed token response: {e}")))?;

        tokens.access = data.access_token;
        if let Some(refresh) = data.refresh_token {
            tokens.refresh = refresh;
        }
        info!("Chat access token refreshed");
        Ok(tokens.access.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/oauth2/token")
    }

    #[tokio::test]
    async fn static_token_never_refreshes() {
        let creds = StaticCredentials::new("abc");
        assert_eq!(creds.get_token().await, "abc");
        assert!(creds.refresh().await.is_err());
    }

    #[tokio::test]
    async fn refresh_replaces_both_tokens() {
        let app = Router::new().route(
            "/oauth2/token",
            post(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("grant_type").map(String::as_str), Some("refresh_token"));
                assert_eq!(params.get("refresh_token").map(String::as_str), Some("old-refresh"));
                Json(serde_json::json!({"access_token": "new-access", "refresh_token": "new-refresh"}))
            }),
        );

        let config = ChatConfig {
            token_url: serve(app).await,
            client_id: "id".into(),
            client_secret: "secret".into(),
            access_token: "old-access".into(),
            refresh_token: "old-refresh".into(),
            ..ChatConfig::default()
        };
        let manager = TwitchTokenManager::new(&config);

        assert_eq!(manager.get_token().await, "old-access");
        assert_eq!(manager.refresh().await.unwrap(), "new-access");
        assert_eq!(manager.get_token().await, "new-access");
        assert_eq!(manager.tokens.read().await.refresh, "new-refresh");
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails() {
        let manager = TwitchTokenManager::new(&ChatConfig::default());
        assert!(matches!(manager.refresh().await, Err(ChatError::Credentials(_))));
    }
}
