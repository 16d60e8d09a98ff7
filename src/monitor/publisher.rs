//! Fan-out of finished snapshots to subscribers.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tokio::sync::mpsc;

use crate::system::Snapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Subscribers = BTreeMap<SubscriptionId, mpsc::UnboundedSender<Arc<Snapshot>>>;

/// Registered consumers, kept in registration order. Publishing only pushes
/// onto each consumer's unbounded queue, so it never waits on consumer work.
#[derive(Debug, Default)]
pub struct Publisher {
    next_id: AtomicU64,
    subscribers: Mutex<Subscribers>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver every future snapshot to `consumer` on a dedicated thread.
    pub fn subscribe<F>(&self, mut consumer: F) -> SubscriptionId
    where
        F: FnMut(Arc<Snapshot>) + Send + 'static,
    {
        let (id, mut rx) = self.subscribe_channel();

        let spawned = thread::Builder::new()
            .name(format!("taskpulse-consumer-{}", id.0))
            .spawn(move || {
                while let Some(snapshot) = rx.blocking_recv() {
                    let cycle = snapshot.cycle;
                    if catch_unwind(AssertUnwindSafe(|| consumer(snapshot))).is_err() {
                        tracing::error!(subscription = id.0, cycle, "consumer panicked");
                    }
                }
            });

        if let Err(err) = spawned {
            tracing::error!(subscription = id.0, error = %err, "failed to start consumer thread");
            self.unsubscribe(id);
        }
        id
    }

    /// Deliver every future snapshot through a channel the caller drains.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<Arc<Snapshot>>) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);
        tracing::debug!(subscription = id.0, "subscribed");
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(subscription = id.0, "unsubscribed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Hand `snapshot` to each subscriber once, in registration order.
    /// Subscribers whose receiving end is gone are dropped.
    pub fn publish(&self, snapshot: Arc<Snapshot>) {
        let mut subscribers = self.lock();
        subscribers.retain(|id, tx| {
            let delivered = tx.send(Arc::clone(&snapshot)).is_ok();
            if !delivered {
                tracing::debug!(subscription = id.0, "subscriber gone, pruning");
            }
            delivered
        });
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // Nothing here can leave the map half-updated.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    use super::*;
    use crate::system::snapshot::{CpuInfo, MemoryInfo};

    fn snapshot(cycle: u64) -> Arc<Snapshot> {
        Arc::new(Snapshot {
            cycle,
            collected_at_unix_ms: 0,
            cpu: CpuInfo::unavailable(),
            gpu: Vec::new(),
            memory: MemoryInfo::default(),
            disks: Vec::new(),
            processes: Vec::new(),
            network: BTreeMap::new(),
            pinned_pid: None,
            unavailable: BTreeMap::new(),
        })
    }

    #[test]
    fn channel_subscribers_get_each_snapshot_once() {
        let publisher = Publisher::new();
        let (_a, mut rx_a) = publisher.subscribe_channel();
        let (_b, mut rx_b) = publisher.subscribe_channel();

        publisher.publish(snapshot(1));
        publisher.publish(snapshot(2));

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(rx.try_recv().unwrap().cycle, 1);
            assert_eq!(rx.try_recv().unwrap().cycle, 2);
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn same_snapshot_is_shared_not_copied() {
        let publisher = Publisher::new();
        let (_a, mut rx_a) = publisher.subscribe_channel();
        let (_b, mut rx_b) = publisher.subscribe_channel();

        publisher.publish(snapshot(1));
        let a = rx_a.try_recv().unwrap();
        let b = rx_b.try_recv().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let publisher = Publisher::new();
        let (id, mut rx) = publisher.subscribe_channel();
        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));

        publisher.publish(snapshot(1));
        assert!(rx.try_recv().is_err());
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let publisher = Publisher::new();
        let (_id, rx) = publisher.subscribe_channel();
        drop(rx);
        publisher.publish(snapshot(1));
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn slow_callback_does_not_block_publish() {
        let publisher = Publisher::new();
        let (gate_tx, gate_rx) = std_mpsc::channel::<()>();
        let (seen_tx, seen_rx) = std_mpsc::channel::<u64>();
        publisher.subscribe(move |s| {
            let _ = gate_rx.recv();
            let _ = seen_tx.send(s.cycle);
        });

        for cycle in 1..=3 {
            publisher.publish(snapshot(cycle));
        }
        // All three publishes returned while the consumer is still parked.
        for _ in 0..3 {
            gate_tx.send(()).unwrap();
        }
        let seen: Vec<u64> = (0..3)
            .map(|_| seen_rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn panicking_callback_keeps_receiving() {
        let publisher = Publisher::new();
        let (seen_tx, seen_rx) = std_mpsc::channel::<u64>();
        publisher.subscribe(move |s| {
            if s.cycle == 1 {
                panic!("consumer bug");
            }
            let _ = seen_tx.send(s.cycle);
        });

        publisher.publish(snapshot(1));
        publisher.publish(snapshot(2));
        assert_eq!(seen_rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
    }
}
