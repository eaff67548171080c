use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use toolq_core::backoff::{ChannelState, ReconnectPolicy};
use toolq_core::job::JobStatus;
use toolq_core::messages::StatusPayload;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toolq_agent::channel::{ChannelClient, ChannelEvent, UrlConnector};
use toolq_agent::client::{ApiClient, QueueApi};
use toolq_agent::config::AgentConfig;
use toolq_agent::runner::{SimulatedRunner, Worker, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolq_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid agent configuration");
        std::process::exit(1);
    });
    tracing::info!(
        agent_id = %config.agent_id,
        api_url = %config.api_url,
        ws_url = %config.ws_url,
        "Starting toolq agent",
    );

    let api = Arc::new(ApiClient::new(config.api_url.clone()));
    let worker = Arc::new(Worker::new(
        Arc::clone(&api),
        SimulatedRunner::default(),
        WorkerConfig {
            agent_id: config.agent_id.clone(),
            agent_name: config.agent_name.clone(),
            heartbeat_interval: config.heartbeat_interval,
            claim_poll_interval: config.claim_poll_interval,
        },
    ));
    let cancel = CancellationToken::new();

    // --- Status channel: pushes wake the worker early ---
    let channel = ChannelClient::new(
        UrlConnector::new(config.ws_url.clone()),
        ReconnectPolicy::default(),
        config.ping_interval,
    );
    let channel_token = channel.shutdown_token();
    let (events_tx, mut events_rx) = mpsc::channel(64);
    let channel_handle = tokio::spawn(channel.run(events_tx));

    let waker = worker.waker();
    let reconcile_api = Arc::clone(&api);
    let events_handle = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                ChannelEvent::Update(StatusPayload::Job(job)) if job.status == JobStatus::Queued => {
                    waker.notify_one();
                }
                ChannelEvent::Update(_) => {}
                ChannelEvent::Reopened => match reconcile_api.queue_status().await {
                    Ok(status) => {
                        tracing::info!(queued = status.queued_count, running = status.running_count, "Channel reopened, state re-read");
                        waker.notify_one();
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to re-read queue status"),
                },
                ChannelEvent::State(ChannelState::Disconnected) => {
                    tracing::warn!("Channel disconnected, falling back to polling");
                }
                ChannelEvent::State(state) => tracing::debug!(?state, "Channel state"),
            }
        }
    });

    // --- Worker ---
    let worker_cancel = cancel.clone();
    let worker_task = Arc::clone(&worker);
    let worker_handle = tokio::spawn(async move { worker_task.run(worker_cancel).await });

    shutdown_signal().await;
    tracing::info!("Shutting down agent");

    cancel.cancel();
    channel_token.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(30), worker_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), channel_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), events_handle).await;
    tracing::info!("Agent stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
}
