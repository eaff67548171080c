use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use toolq_core::messages::{ChannelMessage, Topic};
use toolq_core::types::Timestamp;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::Sender<Message>;

/// Metadata for a single channel connection.
pub struct WsConnection {
    /// What this connection receives.
    pub topic: Topic,
    /// Bounded outbound queue. A full queue drops the message for this
    /// connection only.
    pub sender: WsSender,
    pub connected_at: Timestamp,
    /// Last inbound frame of any kind (text ping, pong, ...).
    pub last_activity: Timestamp,
}

/// Manages all active channel connections.
///
/// Thread-safe via interior `RwLock`; wrapped in `Arc` and shared across
/// the application.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
    buffer: usize,
}

impl WsManager {
    /// Create an empty manager whose connections buffer at most `buffer`
    /// outbound messages each.
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a new connection whose first frame is `snapshot`.
    ///
    /// The snapshot is read while the map is write-locked, so no push can
    /// be queued ahead of it with older state. Returns the receiver half of
    /// the message channel so the caller can forward messages to the
    /// WebSocket sink. Re-adding an id replaces the previous connection.
    pub async fn add<F>(&self, conn_id: String, topic: Topic, snapshot: F) -> mpsc::Receiver<Message>
    where
        F: Future<Output = Option<ChannelMessage>>,
    {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut conns = self.connections.write().await;
        if let Some(frame) = snapshot.await.as_ref().and_then(encode) {
            let _ = tx.try_send(frame);
        }

        let now = chrono::Utc::now();
        let conn = WsConnection {
            topic,
            sender: tx,
            connected_at: now,
            last_activity: now,
        };
        conns.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID.
    pub async fn remove(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.remove(conn_id) {
            tracing::info!(
                conn_id,
                topic = %conn.topic,
                connected_secs = (chrono::Utc::now() - conn.connected_at).num_seconds(),
                "Channel removed",
            );
        }
    }

    /// Record inbound activity on a connection.
    pub async fn touch(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.get_mut(conn_id) {
            conn.last_activity = chrono::Utc::now();
        }
    }

    /// Queue a message for one connection. Returns whether it was queued.
    pub async fn send_to(&self, conn_id: &str, message: Message) -> bool {
        let conns = self.connections.read().await;
        conns
            .get(conn_id)
            .is_some_and(|conn| try_deliver(conn_id, conn, message))
    }

    /// Queue a message for every connection subscribed to `topic`.
    ///
    /// Returns the number of connections the message was queued for.
    pub async fn publish(&self, topic: Topic, message: Message) -> usize {
        let conns = self.connections.read().await;
        conns
            .iter()
            .filter(|(_, conn)| conn.topic == topic)
            .filter(|(id, conn)| try_deliver(id, conn, message.clone()))
            .count()
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of connections subscribed to `topic`.
    pub async fn subscriber_count(&self, topic: Topic) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|conn| conn.topic == topic)
            .count()
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.try_send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all channel connections");
    }

    /// Send a Ping frame and an application heartbeat to every connection.
    pub async fn ping_all(&self) {
        let heartbeat = encode(&ChannelMessage::Heartbeat);
        let conns = self.connections.read().await;
        for (id, conn) in conns.iter() {
            try_deliver(id, conn, Message::Ping(Bytes::new()));
            if let Some(text) = &heartbeat {
                try_deliver(id, conn, text.clone());
            }
        }
    }

    /// Close and forget connections with no inbound activity for longer
    /// than `timeout`. Returns the ids that were closed.
    pub async fn close_idle(&self, timeout: Duration) -> Vec<String> {
        let Ok(timeout) = chrono::Duration::from_std(timeout) else {
            return Vec::new();
        };
        let cutoff = chrono::Utc::now() - timeout;

        let mut conns = self.connections.write().await;
        let idle: Vec<String> = conns
            .iter()
            .filter(|(_, conn)| conn.last_activity < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &idle {
            if let Some(conn) = conns.remove(id) {
                let _ = conn.sender.try_send(Message::Close(None));
                tracing::info!(conn_id = %id, topic = %conn.topic, "Closing idle channel");
            }
        }
        idle
    }
}

/// Encode a channel message as a text frame.
pub fn encode(message: &ChannelMessage) -> Option<Message> {
    match message.encode() {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode channel message");
            None
        }
    }
}

fn try_deliver(conn_id: &str, conn: &WsConnection, message: Message) -> bool {
    match conn.sender.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!(conn_id = %conn_id, topic = %conn.topic, "Channel buffer full, message dropped");
            false
        }
        // The connection is going away; its handler removes it.
        Err(TrySendError::Closed(_)) => false,
    }
}
