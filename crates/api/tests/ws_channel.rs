//! Live channel tests: a real server on an ephemeral port and a
//! `tokio-tungstenite` client.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use toolq_api::state::AppState;
use toolq_api::ws::ChannelBroadcaster;
use toolq_core::job::{SubmitJob, Tool};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    cancel: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn start_server() -> TestServer {
    let (app, state) = common::build_test_app();
    let cancel = CancellationToken::new();

    let broadcaster = ChannelBroadcaster::new(
        Arc::clone(&state.ws_manager),
        state.config.pool_push_min_interval(),
    );
    tokio::spawn(broadcaster.run(state.event_bus.subscribe(), cancel.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_cancel = cancel.clone();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
            .unwrap();
    });

    TestServer {
        addr,
        state,
        cancel,
    }
}

/// Next text frame as JSON, skipping control frames.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn submit(target: &str) -> SubmitJob {
    SubmitJob {
        target: target.to_string(),
        tool: Tool::Photostats,
        mode: None,
        scheduled_for: None,
    }
}

// ---------------------------------------------------------------------------
// Test: global channel starts with the pool snapshot, then streams jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn global_channel_receives_snapshot_then_updates() {
    let server = start_server().await;
    let (mut client, _) = connect_async(format!("ws://{}/api/v1/ws", server.addr))
        .await
        .unwrap();

    let snapshot = next_json(&mut client).await;
    assert_eq!(snapshot["type"], "status_update");
    assert_eq!(snapshot["payload"]["status"], "idle");
    assert_eq!(snapshot["payload"]["online_count"], 0);

    let job = server.state.scheduler.submit(submit("col_1")).await.unwrap();

    let update = next_json(&mut client).await;
    assert_eq!(update["type"], "status_update");
    assert_eq!(update["payload"]["id"], job.id.to_string());
    assert_eq!(update["payload"]["status"], "queued");
    assert_eq!(update["payload"]["position"], 1);
}

// ---------------------------------------------------------------------------
// Test: a text ping is answered with a heartbeat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_is_answered_with_heartbeat() {
    let server = start_server().await;
    let (mut client, _) = connect_async(format!("ws://{}/api/v1/ws", server.addr))
        .await
        .unwrap();
    next_json(&mut client).await;

    client.send(Message::Text("ping".into())).await.unwrap();

    let reply = next_json(&mut client).await;
    assert_eq!(reply, serde_json::json!({ "type": "heartbeat" }));
}

// ---------------------------------------------------------------------------
// Test: job channel sees only its own job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn job_channel_streams_only_its_job() {
    let server = start_server().await;
    let scheduler = Arc::clone(&server.state.scheduler);
    let watched = scheduler.submit(submit("watched")).await.unwrap();

    let (mut client, _) = connect_async(format!(
        "ws://{}/api/v1/ws/jobs/{}",
        server.addr, watched.id
    ))
    .await
    .unwrap();

    let snapshot = next_json(&mut client).await;
    assert_eq!(snapshot["payload"]["id"], watched.id.to_string());
    assert_eq!(snapshot["payload"]["status"], "queued");

    // An unrelated job must not show up here.
    scheduler.submit(submit("other")).await.unwrap();
    scheduler.cancel(watched.id).await.unwrap();

    let update = next_json(&mut client).await;
    assert_eq!(update["payload"]["id"], watched.id.to_string());
    assert_eq!(update["payload"]["status"], "cancelled");
}

// ---------------------------------------------------------------------------
// Test: subscribing to an unknown job is refused before the upgrade
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_channel_is_404() {
    let server = start_server().await;
    let result = connect_async(format!(
        "ws://{}/api/v1/ws/jobs/{}",
        server.addr,
        uuid::Uuid::now_v7()
    ))
    .await;

    match result {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 404);
        }
        Err(e) => panic!("expected HTTP 404, got {e:?}"),
        Ok(_) => panic!("expected HTTP 404, the upgrade succeeded"),
    }
}
