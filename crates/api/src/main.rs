use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use toolq_db::DbPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toolq_api::config::ServerConfig;
use toolq_api::engine::{restore_jobs, spawn_archive, AgentSweeper, ScheduledPromoter};
use toolq_api::router::build_app_router;
use toolq_api::state::AppState;
use toolq_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolq_api=debug,toolq_queue=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    tracing::info!(
        host = %config.host,
        port = %config.port,
        max_concurrent_jobs = config.max_concurrent_jobs,
        archive = config.database_url.is_some(),
        "Loaded server configuration",
    );

    // --- Database (optional) ---
    let pool = match &config.database_url {
        Some(url) => Some(connect_archive(url).await),
        None => {
            tracing::warn!("DATABASE_URL not set, job state will not survive a restart");
            None
        }
    };

    // --- App state ---
    let state = AppState::new(config.clone(), pool.clone());

    // --- Event services ---
    // Subscribe before restoring so requeued jobs are archived too.
    let archive_handle = pool
        .as_ref()
        .map(|pool| spawn_archive(pool.clone(), &state.event_bus, &state.scheduler));

    if let Some(pool) = &pool {
        restore_jobs(pool, &state.scheduler).await;
    }

    let cancel = CancellationToken::new();

    let broadcaster = ws::ChannelBroadcaster::new(
        Arc::clone(&state.ws_manager),
        config.pool_push_min_interval(),
    );
    let broadcaster_handle = tokio::spawn(broadcaster.run(state.event_bus.subscribe(), cancel.clone()));

    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&state.ws_manager),
        config.ws_heartbeat_interval(),
        config.ws_idle_timeout(),
        cancel.clone(),
    );

    // --- Background engine ---
    let promoter = ScheduledPromoter::new(Arc::clone(&state.scheduler), config.promote_interval());
    let promoter_cancel = cancel.clone();
    let promoter_handle = tokio::spawn(async move {
        promoter.run(promoter_cancel).await;
    });

    let sweeper = AgentSweeper::new(Arc::clone(&state.scheduler));
    let sweeper_cancel = cancel.clone();
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(sweeper_cancel).await;
    });

    tracing::info!("Background services started (broadcaster, heartbeat, promoter, agent sweeper)");

    // --- Router ---
    let ws_manager = Arc::clone(&state.ws_manager);
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), promoter_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), broadcaster_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_handle).await;
    tracing::info!("Background services stopped");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining channels");
    ws_manager.shutdown_all().await;

    // The router and the engine tasks held the last scheduler handles, so
    // the bus is gone and the archive drains what it already received.
    if let Some(handle) = archive_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("Job archive stopped");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Connect to the archive database and apply migrations. Startup-fatal.
async fn connect_archive(database_url: &str) -> DbPool {
    let pool = toolq_db::create_pool(database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    toolq_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    toolq_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    pool
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
