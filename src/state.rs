use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::engine::dispatch::Dispatcher;
use crate::engine::lifecycle::OrderLifecycle;
use crate::observability::metrics::Metrics;
use crate::realtime::hub::Hub;
use crate::store::MemoryStore;

pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub hub: Arc<Hub>,
    pub dispatcher: Dispatcher,
    pub lifecycle: OrderLifecycle,
    pub metrics: Metrics,
    pub request_timeout: Duration,
    pub scan_period: Duration,
    pub offer_timeout: chrono::Duration,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(Hub::new());
        let metrics = Metrics::new();
        let dispatcher = Dispatcher::new(
            store.clone(),
            hub.clone(),
            metrics.clone(),
            config.dispatch_radius_km,
            config.candidate_limit,
        );
        let lifecycle = OrderLifecycle::new(store.clone(), hub.clone());

        Self {
            store,
            hub,
            dispatcher,
            lifecycle,
            metrics,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            scan_period: Duration::from_secs(config.scan_period_secs),
            offer_timeout: chrono::Duration::seconds(config.offer_timeout_secs as i64),
        }
    }
}
