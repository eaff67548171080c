//! Real-time channel client.
//!
//! Subscribes to the server's status feed and keeps the subscription alive:
//! a `ping` text every [`DEFAULT_PING_INTERVAL_SECS`], and reconnects with
//! exponential backoff when the socket drops. Consumers receive
//! [`ChannelEvent`]s; `heartbeat` frames never reach them.
//!
//! State walk: `connecting -> open -> closed -> connecting -> ...`, ending
//! in `disconnected` once the reconnect budget is spent or the client is
//! torn down.
//!
//! [`DEFAULT_PING_INTERVAL_SECS`]: toolq_core::backoff::DEFAULT_PING_INTERVAL_SECS

use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use toolq_core::backoff::{ChannelState, ReconnectDecision, ReconnectPolicy, ReconnectState};
use toolq_core::messages::{ChannelMessage, StatusPayload, CLIENT_PING};

use crate::error::AgentError;

/// What the channel client reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    State(ChannelState),
    Update(StatusPayload),
    /// The channel came back after a drop. Pushes sent while it was down
    /// are lost, so consumers should re-read the full state.
    Reopened,
}

/// Opens one WebSocket session.
#[async_trait]
pub trait Connect: Send + Sync {
    type Stream: Stream<Item = Result<Message, WsError>>
        + Sink<Message, Error = WsError>
        + Unpin
        + Send
        + 'static;

    async fn connect(&self) -> Result<Self::Stream, AgentError>;
}

/// Connects to a `ws://` or `wss://` URL.
#[derive(Debug, Clone)]
pub struct UrlConnector {
    url: String,
}

impl UrlConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connect for UrlConnector {
    type Stream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    async fn connect(&self) -> Result<Self::Stream, AgentError> {
        let (stream, _response) = connect_async(self.url.as_str()).await?;
        Ok(stream)
    }
}

enum SessionEnd {
    /// The socket closed or errored; a reconnect may follow.
    Dropped,
    /// Torn down locally or the consumer went away.
    Stopped,
}

pub struct ChannelClient<C: Connect> {
    connector: C,
    policy: ReconnectPolicy,
    ping_interval: Duration,
    cancel: CancellationToken,
}

impl<C: Connect> ChannelClient<C> {
    pub fn new(connector: C, policy: ReconnectPolicy, ping_interval: Duration) -> Self {
        Self {
            connector,
            policy,
            ping_interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Handle that tears the client down from elsewhere.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the client. Safe to call any number of times.
    pub fn teardown(&self) {
        self.cancel.cancel();
    }

    /// Drive the channel until it is torn down or gives up. Always ends in
    /// [`ChannelState::Disconnected`].
    pub async fn run(self, events: mpsc::Sender<ChannelEvent>) -> ChannelState {
        let mut reconnect = ReconnectState::new(self.policy);
        let mut opened_before = false;

        loop {
            if !self.emit(&events, ChannelEvent::State(ChannelState::Connecting)).await {
                break;
            }

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(stream) => {
                    reconnect.on_open();
                    tracing::info!("Channel open");
                    if !self.emit(&events, ChannelEvent::State(ChannelState::Open)).await {
                        break;
                    }
                    if opened_before && !self.emit(&events, ChannelEvent::Reopened).await {
                        break;
                    }
                    opened_before = true;

                    if let SessionEnd::Stopped = self.run_session(stream, &events).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Channel connect failed");
                }
            }

            match reconnect.on_close() {
                ReconnectDecision::Retry { attempt, delay } => {
                    tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Channel closed, reconnecting");
                    if !self.emit(&events, ChannelEvent::State(ChannelState::Closed)).await {
                        break;
                    }
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                ReconnectDecision::GiveUp => {
                    tracing::error!(attempts = reconnect.attempts(), "Channel reconnects exhausted");
                    break;
                }
            }
        }

        // Best effort: the consumer may already be gone.
        let _ = events
            .send(ChannelEvent::State(ChannelState::Disconnected))
            .await;
        ChannelState::Disconnected
    }

    /// Forward one event. A dropped consumer tears the client down.
    async fn emit(&self, events: &mpsc::Sender<ChannelEvent>, event: ChannelEvent) -> bool {
        if events.send(event).await.is_err() {
            self.cancel.cancel();
            return false;
        }
        true
    }

    async fn run_session(
        &self,
        stream: C::Stream,
        events: &mpsc::Sender<ChannelEvent>,
    ) -> SessionEnd {
        let (mut sink, mut stream) = stream.split();
        let mut ping = interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Stopped;
                }
                _ = ping.tick() => {
                    if let Err(e) = sink.send(Message::Text(CLIENT_PING.into())).await {
                        tracing::warn!(error = %e, "Failed to send channel ping");
                        return SessionEnd::Dropped;
                    }
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => match ChannelMessage::decode(&text) {
                        Ok(ChannelMessage::StatusUpdate(payload)) => {
                            if !self.emit(events, ChannelEvent::Update(payload)).await {
                                return SessionEnd::Stopped;
                            }
                        }
                        Ok(ChannelMessage::Heartbeat) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "Ignoring unreadable channel frame");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Server closed channel");
                        return SessionEnd::Dropped;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite.
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Channel receive error");
                        return SessionEnd::Dropped;
                    }
                    None => return SessionEnd::Dropped,
                }
            }
        }
    }
}
