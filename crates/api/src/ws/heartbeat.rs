use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

/// Spawn a background task that keeps channels alive and reaps dead ones.
///
/// Every `interval` it closes connections silent for longer than
/// `idle_timeout`, then sends a Ping frame and an application heartbeat to
/// the rest. Runs until `cancel` fires.
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    interval: Duration,
    idle_timeout: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Channel heartbeat stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let closed = ws_manager.close_idle(idle_timeout).await;
                    let count = ws_manager.connection_count().await;
                    tracing::debug!(count, closed = closed.len(), "Channel heartbeat");
                    ws_manager.ping_all().await;
                }
            }
        }
    })
}
