//! Update fan-out hub.
//!
//! Every subscriber owns a bounded queue. `publish` never waits: a subscriber
//! whose queue is closed or full is unregistered on the spot, so one slow
//! viewer cannot stall the generators or the other viewers.

use crate::models::{InitialData, WsServerEvent};
use crate::storage::SeriesStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 256;

pub type SubscriberId = u64;

/// Receiving end of a registration. Dropping it closes the queue; the hub
/// notices on its next publish.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<WsServerEvent>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event, or `None` once the hub has dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<WsServerEvent>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<WsServerEvent>> {
        self.rx.try_recv().ok()
    }
}

struct HubInner {
    store: Arc<SeriesStore>,
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Arc<WsServerEvent>>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    fallback_price: f64,
}

#[derive(Clone)]
pub struct FanoutHub {
    inner: Arc<HubInner>,
}

impl FanoutHub {
    pub fn new(store: Arc<SeriesStore>, queue_capacity: usize, fallback_price: f64) -> Self {
        Self {
            inner: Arc::new(HubInner {
                store,
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                queue_capacity: queue_capacity.max(2),
                fallback_price,
            }),
        }
    }

    /// Latest ETH/USD quote, or the configured fallback before the first tick.
    pub fn quote_price(&self) -> f64 {
        self.inner
            .store
            .latest_price()
            .map(|p| p.price)
            .unwrap_or(self.inner.fallback_price)
    }

    /// Latest gas sample per chain plus the current quote price.
    pub fn snapshot(&self) -> InitialData {
        InitialData {
            samples: self.inner.store.latest_gas(),
            quote_price: self.quote_price(),
        }
    }

    /// Register a subscriber. Its queue starts with the `initialData` snapshot,
    /// so the snapshot always precedes any update.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.queue_capacity);

        let mut subscribers = self.inner.subscribers.lock();
        // Snapshot under the registry lock so no publish slips between the
        // snapshot and registration.
        let initial = Arc::new(WsServerEvent::InitialData(self.snapshot()));
        if tx.try_send(initial).is_ok() {
            subscribers.insert(id, tx);
        }
        let count = subscribers.len();
        drop(subscribers);

        info!(subscriber = id, subscribers = count, "📡 Subscriber joined");
        Subscription { id, rx }
    }

    /// Idempotent removal. Returns whether the subscriber was still registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.inner.subscribers.lock().remove(&id).is_some();
        if removed {
            info!(subscriber = id, "Subscriber left");
        }
        removed
    }

    /// Push an event to every registered subscriber. Returns how many accepted it.
    pub fn publish(&self, event: WsServerEvent) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0;
        let mut subscribers = self.inner.subscribers.lock();

        subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = *id, kind = event.kind(), "Subscriber queue full, dropping subscriber");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = *id, "Subscriber closed, unregistering");
                false
            }
        });

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    pub fn store(&self) -> &Arc<SeriesStore> {
        &self.inner.store
    }
}
