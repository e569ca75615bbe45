//! # Statistics Aggregator
//!
//! Keeps one pair of counter maps per statistics listener. Every authorized
//! call is counted into every listener registered at the time of the call;
//! a listener drains its own maps on its own cadence.
//!
//! All state sits behind a single mutex so that `record` updates both maps of
//! every listener as one step with respect to `add_listener`,
//! `remove_listener` and `drain`.

use crate::domain::methods::SUBSCRIBE_STATISTICS;
use crate::domain::{ListenerId, StatSnapshot};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Registry of statistics listeners and their counters.
pub struct StatsAggregator {
    inner: Mutex<Inner>,
}

struct Inner {
    next_id: u64,
    listeners: HashMap<ListenerId, StatSnapshot>,
    /// Set once the first statistics-subscription call has been exempted.
    subscription_exempted: bool,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                listeners: HashMap::new(),
                subscription_exempted: false,
            }),
        }
    }

    /// Register a listener with empty counters.
    pub fn add_listener(&self) -> ListenerId {
        let mut inner = self.inner.lock();
        let id = ListenerId::new(inner.next_id);
        inner.next_id += 1;
        inner.listeners.insert(id, StatSnapshot::default());
        debug!(listener_id = %id, "Stats listener added");
        id
    }

    /// Discard a listener's counters.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = self.inner.lock().listeners.remove(&id).is_some();
        if removed {
            debug!(listener_id = %id, "Stats listener removed");
        }
        removed
    }

    /// Count one call to `method` by `consumer` into every listener.
    ///
    /// The first call to the statistics-subscription method in the lifetime
    /// of the aggregator is not counted anywhere.
    pub fn record(&self, method: &str, consumer: &str) {
        let mut inner = self.inner.lock();

        if method == SUBSCRIBE_STATISTICS && !inner.subscription_exempted {
            inner.subscription_exempted = true;
            debug!(consumer, "First statistics subscription exempted from counts");
            return;
        }

        for counters in inner.listeners.values_mut() {
            *counters
                .by_consumer
                .entry(consumer.to_string())
                .or_insert(0) += 1;
            *counters.by_method.entry(method.to_string()).or_insert(0) += 1;
        }
    }

    /// Return the listener's counters and reset them to empty.
    ///
    /// `None` if the listener is not registered.
    pub fn drain(&self, id: ListenerId) -> Option<StatSnapshot> {
        self.inner
            .lock()
            .listeners
            .get_mut(&id)
            .map(std::mem::take)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
