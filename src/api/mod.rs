//! HTTP query façade and the WebSocket push endpoint.

pub mod routes;
pub mod ws;

use crate::fanout::FanoutHub;
use crate::storage::SeriesStore;
use std::sync::Arc;
use std::time::Duration;

pub use routes::{create_router, ApiError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SeriesStore>,
    pub hub: FanoutHub,
    pub ws_send_timeout: Duration,
}

impl AppState {
    pub fn new(hub: FanoutHub, ws_send_timeout: Duration) -> Self {
        Self {
            store: hub.store().clone(),
            hub,
            ws_send_timeout,
        }
    }

    /// Latest ETH/USD quote, or the configured fallback before the first tick.
    pub fn quote_price(&self) -> f64 {
        self.hub.quote_price()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_matches_push_snapshot() {
        let hub = FanoutHub::new(Arc::new(SeriesStore::default()), 16, 1800.0);
        let state = AppState::new(hub.clone(), Duration::from_secs(1));
        assert_eq!(state.quote_price(), 1800.0);
        assert_eq!(state.quote_price(), hub.snapshot().quote_price);
    }
}
