//! # Audit Broadcaster
//!
//! Fans every authorized call out to the currently registered audit
//! listeners. Each listener owns an unbounded FIFO channel, so a listener sees
//! events in the order `publish` was invoked for it.
//!
//! `publish` snapshots the sender set under the lock and delivers after the
//! lock is released.

use crate::domain::{AuditEvent, ListenerId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Receiving end handed to an audit listener.
pub type AuditReceiver = mpsc::UnboundedReceiver<Arc<AuditEvent>>;

/// Registry of audit listeners.
pub struct AuditBroadcaster {
    listeners: Mutex<HashMap<ListenerId, mpsc::UnboundedSender<Arc<AuditEvent>>>>,
    next_id: AtomicU64,
    events_published: AtomicU64,
    deliveries_dropped: AtomicU64,
}

impl AuditBroadcaster {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events_published: AtomicU64::new(0),
            deliveries_dropped: AtomicU64::new(0),
        }
    }

    /// Register a new listener.
    pub fn add_listener(&self) -> (AuditReceiver, ListenerId) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().insert(id, tx);
        debug!(listener_id = %id, "Audit listener added");
        (rx, id)
    }

    /// Drop a listener's channel. Removing an unknown id is a no-op.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = self.listeners.lock().remove(&id).is_some();
        if removed {
            debug!(listener_id = %id, "Audit listener removed");
        }
        removed
    }

    /// Hand `event` to every registered listener.
    ///
    /// Returns the number of listeners the event was delivered to. Listeners
    /// whose receiver is gone are unregistered.
    pub fn publish(&self, event: AuditEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let targets: Vec<_> = self
            .listeners
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        if targets.is_empty() {
            return 0;
        }

        let event = Arc::new(event);
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (id, tx) in targets {
            if tx.send(Arc::clone(&event)).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            self.deliveries_dropped
                .fetch_add(dead.len() as u64, Ordering::Relaxed);
            let mut listeners = self.listeners.lock();
            for id in &dead {
                listeners.remove(id);
            }
            debug!(dropped = dead.len(), "Pruned closed audit listeners");
        }

        debug!(
            consumer = %event.consumer,
            method = %event.method,
            delivered,
            "Audit event published"
        );
        delivered
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Total events passed to `publish`.
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Deliveries that failed because the listener had gone away.
    pub fn deliveries_dropped(&self) -> u64 {
        self.deliveries_dropped.load(Ordering::Relaxed)
    }
}

impl Default for AuditBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(consumer: &str, method: &str) -> AuditEvent {
        AuditEvent::new(consumer, method)
    }

    #[test]
    fn test_publish_no_listeners() {
        let broadcaster = AuditBroadcaster::new();
        assert_eq!(broadcaster.publish(event("alice", "/svc/Foo")), 0);
        assert_eq!(broadcaster.events_published(), 1);
    }

    #[test]
    fn test_fan_out_to_every_listener() {
        let broadcaster = AuditBroadcaster::new();
        let (mut rx1, _) = broadcaster.add_listener();
        let (mut rx2, _) = broadcaster.add_listener();

        assert_eq!(broadcaster.publish(event("alice", "/svc/Foo")), 2);

        assert_eq!(rx1.try_recv().unwrap().consumer, "alice");
        assert_eq!(rx2.try_recv().unwrap().method, "/svc/Foo");
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_per_listener_fifo() {
        let broadcaster = AuditBroadcaster::new();
        let (mut rx, _) = broadcaster.add_listener();

        for i in 0..10 {
            broadcaster.publish(event("alice", &format!("/svc/M{}", i)));
        }
        for i in 0..10 {
            assert_eq!(rx.try_recv().unwrap().method, format!("/svc/M{}", i));
        }
    }

    #[test]
    fn test_handles_monotonic_and_never_reused() {
        let broadcaster = AuditBroadcaster::new();
        let (_rx1, a) = broadcaster.add_listener();
        assert!(broadcaster.remove_listener(a));
        let (_rx2, b) = broadcaster.add_listener();
        assert!(b > a);
    }

    #[test]
    fn test_remove_is_idempotent_and_closes_channel() {
        let broadcaster = AuditBroadcaster::new();
        let (mut rx, id) = broadcaster.add_listener();

        assert!(broadcaster.remove_listener(id));
        assert!(!broadcaster.remove_listener(id));
        assert_eq!(broadcaster.listener_count(), 0);

        // Sender dropped: channel reports closed, nothing further delivered.
        assert_eq!(broadcaster.publish(event("alice", "/svc/Foo")), 0);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let broadcaster = AuditBroadcaster::new();
        let (rx, _) = broadcaster.add_listener();
        let (mut live, _) = broadcaster.add_listener();
        drop(rx);

        assert_eq!(broadcaster.publish(event("bob", "/svc/Bar")), 1);
        assert_eq!(broadcaster.listener_count(), 1);
        assert_eq!(broadcaster.deliveries_dropped(), 1);
        assert!(live.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_publish_and_churn() {
        let broadcaster = Arc::new(AuditBroadcaster::new());
        let (mut stable, _) = broadcaster.add_listener();

        let churn = {
            let broadcaster = Arc::clone(&broadcaster);
            tokio::spawn(async move {
                for _ in 0..200 {
                    let (_rx, id) = broadcaster.add_listener();
                    tokio::task::yield_now().await;
                    broadcaster.remove_listener(id);
                }
            })
        };

        let publishers: Vec<_> = (0..4)
            .map(|n| {
                let broadcaster = Arc::clone(&broadcaster);
                tokio::spawn(async move {
                    for i in 0..50 {
                        broadcaster.publish(event(&format!("c{}", n), &format!("/svc/{}", i)));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        churn.await.unwrap();
        for p in publishers {
            p.await.unwrap();
        }

        let mut received = 0;
        while stable.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 200);
        assert_eq!(broadcaster.listener_count(), 1);
    }
}
