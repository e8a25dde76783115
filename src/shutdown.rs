//! Cancellable pacing and Ctrl-C handling for the long-running loops.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Sleep for `delay` unless cancelled first. Returns false if cancelled.
pub async fn sleep_or_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        () = cancel.cancelled() => false,
    }
}

/// Cancel `cancel` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
        }
        cancel.cancel();
    });
}
