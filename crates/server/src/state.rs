use std::sync::Arc;

use stockroom_core::config::AppConfig;
use stockroom_core::notify::EventPublisher;
use stockroom_db::DbPool;

use crate::events::EventHub;

/// Shared handler state. Cloning is cheap; the pool and hub are handles.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub hub: EventHub,
    pub publisher: Arc<dyn EventPublisher>,
    pub session_ttl_hours: u64,
    pub default_low_stock_threshold: i64,
}

impl AppState {
    pub fn new(db_pool: DbPool, config: &AppConfig) -> Self {
        let hub = EventHub::new(config.events.channel_capacity);
        let publisher: Arc<dyn EventPublisher> = Arc::new(hub.clone());
        Self {
            db_pool,
            hub,
            publisher,
            session_ttl_hours: config.auth.session_ttl_hours,
            default_low_stock_threshold: config.inventory.default_low_stock_threshold,
        }
    }

    /// State with a caller-supplied publisher so tests can assert on the
    /// published envelopes instead of racing a broadcast receiver.
    #[cfg(test)]
    pub fn for_tests(db_pool: DbPool, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            db_pool,
            hub: EventHub::new(16),
            publisher,
            session_ttl_hours: 24,
            default_low_stock_threshold: 5,
        }
    }
}
