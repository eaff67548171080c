use std::sync::Arc;

use toolq_events::EventBus;
use toolq_queue::Scheduler;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Snapshot archive pool, when `DATABASE_URL` is configured.
    pub pool: Option<toolq_db::DbPool>,
    pub config: Arc<ServerConfig>,
    /// Owner of all queue and pool state. GET handlers and channel pushes
    /// both read from here.
    pub scheduler: Arc<Scheduler>,
    /// Real-time channel connections.
    pub ws_manager: Arc<WsManager>,
    pub event_bus: Arc<EventBus>,
}

impl AppState {
    /// Wire up a scheduler, bus and channel manager from `config`.
    pub fn new(config: ServerConfig, pool: Option<toolq_db::DbPool>) -> Self {
        let event_bus = Arc::new(EventBus::default());
        let scheduler = Arc::new(Scheduler::new(
            config.scheduler_config(),
            Arc::clone(&event_bus),
        ));
        let ws_manager = Arc::new(WsManager::new(config.channel_buffer));
        Self {
            pool,
            config: Arc::new(config),
            scheduler,
            ws_manager,
            event_bus,
        }
    }
}
