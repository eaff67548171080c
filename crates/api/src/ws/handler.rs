use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use toolq_core::messages::{ChannelMessage, Topic, CLIENT_PING};
use toolq_core::types::JobId;

use crate::error::AppResult;
use crate::state::AppState;
use crate::ws::manager::encode;

/// GET /api/v1/ws
///
/// Upgrade to a channel on the global feed: every job update and every
/// pool snapshot.
pub async fn ws_global_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Topic::Global))
}

/// GET /api/v1/ws/jobs/{id}
///
/// Upgrade to a channel for a single job. Unknown jobs are rejected with
/// 404 before the upgrade.
pub async fn ws_job_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    state.scheduler.get(job_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, Topic::Job(job_id))))
}

/// Manage a single channel after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`, the current snapshot
///      for the topic as its first frame.
///   2. Spawns a sender task that forwards messages from the manager channel.
///   3. Processes inbound frames on the current task.
///   4. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, state: AppState, topic: Topic) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let ws_manager = state.ws_manager;
    tracing::info!(conn_id = %conn_id, topic = %topic, "Channel connected");

    let scheduler = &state.scheduler;
    let mut rx = ws_manager
        .add(conn_id.clone(), topic, async move {
            match topic {
                Topic::Global => Some(ChannelMessage::pool(scheduler.pool_status().await)),
                Topic::Job(id) => scheduler.get(id).await.ok().map(ChannelMessage::job),
            }
        })
        .await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Channel sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Receiver loop: the channel is subscribe-only, inbound frames only
    // count as liveness.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) => {
                ws_manager.touch(&conn_id).await;
                if text.as_str().trim() == CLIENT_PING {
                    if let Some(frame) = encode(&ChannelMessage::Heartbeat) {
                        ws_manager.send_to(&conn_id, frame).await;
                    }
                } else {
                    tracing::trace!(conn_id = %conn_id, "Ignoring unsolicited text frame");
                }
            }
            Ok(_) => {
                ws_manager.touch(&conn_id).await;
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "Channel receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
}
