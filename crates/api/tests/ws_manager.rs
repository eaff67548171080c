//! Unit tests for `WsManager`.
//!
//! These exercise the channel connection manager directly, without
//! performing any HTTP upgrades: topic routing, bounded buffers, idle
//! reaping and shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use tokio::sync::oneshot;
use toolq_api::ws::WsManager;
use toolq_core::messages::{ChannelMessage, Topic};
use toolq_core::pool::PoolStatus;

fn text(t: &str) -> Message {
    Message::Text(t.to_string().into())
}

// ---------------------------------------------------------------------------
// Test: add/remove bookkeeping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_and_remove_track_connection_count() {
    let manager = WsManager::new(8);
    assert_eq!(manager.connection_count().await, 0);

    let _rx1 = manager.add("conn-1".to_string(), Topic::Global, async { None }).await;
    let _rx2 = manager.add("conn-2".to_string(), Topic::Global, async { None }).await;
    assert_eq!(manager.connection_count().await, 2);

    manager.remove("conn-1").await;
    manager.remove("nonexistent").await;
    assert_eq!(manager.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: publish() only reaches the matching topic
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_routes_by_topic() {
    let manager = WsManager::new(8);
    let job = uuid::Uuid::now_v7();
    let other = uuid::Uuid::now_v7();

    let mut global = manager.add("global".to_string(), Topic::Global, async { None }).await;
    let mut job_rx = manager.add("job".to_string(), Topic::Job(job), async { None }).await;
    let mut other_rx = manager.add("other".to_string(), Topic::Job(other), async { None }).await;

    let sent = manager.publish(Topic::Job(job), text("job update")).await;
    assert_eq!(sent, 1);
    assert!(matches!(job_rx.recv().await, Some(Message::Text(t)) if t == "job update"));
    assert!(global.try_recv().is_err());
    assert!(other_rx.try_recv().is_err());

    assert_eq!(manager.subscriber_count(Topic::Global).await, 1);
}

// ---------------------------------------------------------------------------
// Test: a full buffer drops the message for that connection only
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_buffer_drops_only_for_slow_consumer() {
    let manager = WsManager::new(1);
    let mut slow = manager.add("slow".to_string(), Topic::Global, async { None }).await;
    let mut fast = manager.add("fast".to_string(), Topic::Global, async { None }).await;

    assert_eq!(manager.publish(Topic::Global, text("one")).await, 2);
    assert!(fast.recv().await.is_some());

    // `slow` still holds "one"; "two" is dropped for it only.
    assert_eq!(manager.publish(Topic::Global, text("two")).await, 1);
    assert!(matches!(fast.recv().await, Some(Message::Text(t)) if t == "two"));
    assert!(matches!(slow.recv().await, Some(Message::Text(t)) if t == "one"));
    assert!(slow.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Test: ping_all() sends a Ping frame followed by a heartbeat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_all_sends_ping_and_heartbeat() {
    let manager = WsManager::new(8);
    let mut rx = manager.add("conn-1".to_string(), Topic::Global, async { None }).await;

    manager.ping_all().await;

    assert!(matches!(rx.recv().await, Some(Message::Ping(_))));
    match rx.recv().await {
        Some(Message::Text(t)) => {
            let json: serde_json::Value = serde_json::from_str(t.as_str()).unwrap();
            assert_eq!(json, serde_json::json!({ "type": "heartbeat" }));
        }
        other => panic!("expected heartbeat text, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test: close_idle() reaps only silent connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_idle_reaps_silent_connections() {
    let manager = WsManager::new(8);
    let mut idle = manager.add("idle".to_string(), Topic::Global, async { None }).await;
    let _active = manager.add("active".to_string(), Topic::Global, async { None }).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    manager.touch("active").await;

    let closed = manager.close_idle(Duration::from_millis(25)).await;
    assert_eq!(closed, vec!["idle".to_string()]);
    assert_eq!(manager.connection_count().await, 1);
    assert!(matches!(idle.recv().await, Some(Message::Close(None))));
}

// ---------------------------------------------------------------------------
// Test: shutdown_all() sends Close and clears all connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::new(8);

    let mut rx1 = manager.add("conn-1".to_string(), Topic::Global, async { None }).await;
    let mut rx2 = manager.add("conn-2".to_string(), Topic::Job(uuid::Uuid::now_v7()), async { None }).await;

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);
    assert!(matches!(rx1.recv().await, Some(Message::Close(None))));
    assert!(matches!(rx2.recv().await, Some(Message::Close(None))));
    assert!(rx1.recv().await.is_none(), "Channel should be closed after shutdown");
}

// ---------------------------------------------------------------------------
// Test: publish() skips closed channels without panicking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_skips_closed_channels() {
    let manager = WsManager::new(8);

    let rx1 = manager.add("conn-1".to_string(), Topic::Global, async { None }).await;
    let mut rx2 = manager.add("conn-2".to_string(), Topic::Global, async { None }).await;
    drop(rx1);

    assert_eq!(manager.publish(Topic::Global, text("still alive")).await, 1);
    assert!(matches!(rx2.recv().await, Some(Message::Text(t)) if t == "still alive"));
}

// ---------------------------------------------------------------------------
// Test: the snapshot is the first frame, even with a push racing it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn snapshot_is_queued_before_racing_push() {
    let manager = Arc::new(WsManager::new(8));
    let (push_tx, push_rx) = oneshot::channel();

    let racer = Arc::clone(&manager);
    let mut rx = manager
        .add("conn-1".to_string(), Topic::Global, async move {
            let push = tokio::spawn(async move { racer.publish(Topic::Global, text("update")).await });
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
            let _ = push_tx.send(push);
            Some(ChannelMessage::pool(PoolStatus::derive(&[], 0)))
        })
        .await;

    let delivered = push_rx.await.unwrap().await.unwrap();
    assert_eq!(delivered, 1);

    let Some(Message::Text(first)) = rx.recv().await else {
        panic!("expected the snapshot text frame first");
    };
    let first: serde_json::Value = serde_json::from_str(first.as_str()).unwrap();
    assert_eq!(first["type"], "status_update");
    assert_eq!(first["payload"]["status"], "idle");
    assert!(matches!(rx.recv().await, Some(Message::Text(t)) if t == "update"));
}

#[tokio::test]
async fn missing_snapshot_queues_nothing() {
    let manager = WsManager::new(8);
    let mut rx = manager.add("conn-1".to_string(), Topic::Global, async { None }).await;
    assert!(rx.try_recv().is_err());
}
