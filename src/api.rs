//! Local HTTP status API.
//!
//! Runs on 127.0.0.1 (port 8770 by default) using axum.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::QueueNames;
use crate::player::{queue_depths, PlaybackStats, QueueDepths};
use crate::speech::SpeechSynthesizer;
use crate::store::QueueStore;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn QueueStore>,
    pub queues: QueueNames,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub stats: Arc<PlaybackStats>,
}

#[derive(Serialize)]
struct StatusResponse {
    queues: QueueDepths,
    speaking: bool,
    played: u64,
    failed: u64,
}

#[derive(Serialize)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SimpleResponse {
    fn ok(status: &str) -> Self {
        Self {
            status: status.into(),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            error: Some(message.into()),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/skip", post(handle_skip))
        .with_state(state)
}

/// Start the status API as a background tokio task.
pub async fn start_api(state: ApiState, port: u16) {
    let app = router(state);
    let addr = format!("127.0.0.1:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind status API on {addr}: {e}");
            return;
        }
    };
    info!("Status API listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Status API server error: {e}");
        }
    });
}

async fn handle_status(
    State(state): State<ApiState>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<SimpleResponse>)> {
    let queues = queue_depths(state.store.as_ref(), &state.queues)
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, Json(SimpleResponse::err(e.to_string()))))?;

    Ok(Json(StatusResponse {
        queues,
        speaking: state.speech.is_speaking(),
        played: state.stats.played(),
        failed: state.stats.failed(),
    }))
}

async fn handle_skip(State(state): State<ApiState>) -> Json<SimpleResponse> {
    state.speech.skip();
    Json(SimpleResponse::ok("skipped"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryQueueStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct SkippableSynth {
        skipped: AtomicBool,
    }

    #[async_trait]
    impl SpeechSynthesizer for SkippableSynth {
        async fn synthesize_and_play(&self, _text: &str) -> bool {
            true
        }

        fn is_speaking(&self) -> bool {
            true
        }

        fn skip(&self) {
            self.skipped.store(true, Ordering::SeqCst);
        }
    }

    async fn serve(state: ApiState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn status_reports_depths_and_skip_stops_speech() {
        let store = Arc::new(MemoryQueueStore::new());
        let queues = QueueNames::default();
        store.push_tail(&queues.podcast, "One.").await.unwrap();
        store.push_tail(&queues.podcast, "Two.").await.unwrap();
        store.push_tail(&queues.reacted, "r").await.unwrap();

        let synth = Arc::new(SkippableSynth::default());
        let base = serve(ApiState {
            store,
            queues,
            speech: synth.clone(),
            stats: Arc::new(PlaybackStats::default()),
        })
        .await;

        let client = reqwest::Client::new();
        let status: serde_json::Value = client
            .get(format!("{base}/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["queues"]["podcast"], 2);
        assert_eq!(status["queues"]["reacted"], 1);
        assert_eq!(status["queues"]["chat"], 0);
        assert_eq!(status["speaking"], true);
        assert_eq!(status["played"], 0);

        let skip: serde_json::Value = client
            .post(format!("{base}/skip"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(skip["status"], "skipped");
        assert!(synth.skipped.load(Ordering::SeqCst));
    }
}
