// Cross-context relay
//
// Moves items from the blocking acquisition thread into the async broadcast
// task. The sending side never blocks and never awaits: items go into a
// bounded lock-free ring, and when the ring is full the oldest pending item
// is evicted. The receiving side parks on a `Notify` until something arrives.

use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub const DEFAULT_CAPACITY: usize = 16;

/// Counters describing relay throughput
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayMetrics {
    pub capacity: usize,
    pub pending: usize,
    pub handed_off: u64,
    pub delivered: u64,
    pub dropped: u64,
}

struct Shared<T> {
    queue: ArrayQueue<T>,
    notify: Notify,
    senders: AtomicUsize,
    closed: AtomicBool,
    handed_off: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl<T> Shared<T> {
    fn metrics(&self) -> RelayMetrics {
        RelayMetrics {
            capacity: self.queue.capacity(),
            pending: self.queue.len(),
            handed_off: self.handed_off.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

/// Create a relay holding at most `capacity` undelivered items
///
/// A capacity of zero is bumped to one.
pub fn channel<T>(capacity: usize) -> (RelaySender<T>, RelayReceiver<T>) {
    let shared = Arc::new(Shared {
        queue: ArrayQueue::new(capacity.max(1)),
        notify: Notify::new(),
        senders: AtomicUsize::new(1),
        closed: AtomicBool::new(false),
        handed_off: AtomicU64::new(0),
        delivered: AtomicU64::new(0),
        dropped: AtomicU64::new(0),
    });

    (
        RelaySender {
            shared: shared.clone(),
        },
        RelayReceiver { shared },
    )
}

/// Producer half. Dropping the last sender closes the relay.
pub struct RelaySender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> RelaySender<T> {
    /// Enqueue an item without blocking
    ///
    /// Returns the evicted item when the relay was full. After the receiver
    /// has closed the relay the item is handed straight back.
    pub fn handoff(&self, item: T) -> Option<T> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Some(item);
        }

        let evicted = self.shared.queue.force_push(item);
        self.shared.handed_off.fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.notify.notify_one();
        evicted
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> RelayMetrics {
        self.shared.metrics()
    }

    /// Read-only view of the counters that does not keep the relay open
    pub fn monitor(&self) -> RelayMonitor
    where
        T: Send + 'static,
    {
        RelayMonitor {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Clone for RelaySender<T> {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Drop for RelaySender<T> {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.close();
        }
    }
}

/// Consumer half, owned by the broadcast task
pub struct RelayReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> RelayReceiver<T> {
    /// Wait for the next item in handoff order
    ///
    /// Returns `None` once the relay is closed and fully drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if let Some(item) = self.try_recv() {
                return Some(item);
            }
            if self.shared.closed.load(Ordering::Acquire) {
                // An item pushed just before the close flag was set
                return self.try_recv();
            }
            self.shared.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<T> {
        let item = self.shared.queue.pop()?;
        self.shared.delivered.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }

    /// Stop accepting new items; pending ones can still be received
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn metrics(&self) -> RelayMetrics {
        self.shared.metrics()
    }

    pub fn monitor(&self) -> RelayMonitor
    where
        T: Send + 'static,
    {
        RelayMonitor {
            shared: self.shared.clone(),
        }
    }
}

/// Type-erased metrics handle for the health endpoint
#[derive(Clone)]
pub struct RelayMonitor {
    shared: Arc<dyn MetricsSource>,
}

impl RelayMonitor {
    pub fn metrics(&self) -> RelayMetrics {
        self.shared.relay_metrics()
    }
}

trait MetricsSource: Send + Sync {
    fn relay_metrics(&self) -> RelayMetrics;
}

impl<T: Send> MetricsSource for Shared<T> {
    fn relay_metrics(&self) -> RelayMetrics {
        self.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_items_arrive_in_order() {
        let (tx, mut rx) = channel(4);
        for i in 0..3 {
            assert!(tx.handoff(i).is_none());
        }

        assert_eq!(rx.recv().await, Some(0));
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_full_relay_drops_oldest() {
        let (tx, mut rx) = channel(3);
        for i in 0..5 {
            tx.handoff(i);
        }

        let metrics = tx.metrics();
        assert_eq!(metrics.dropped, 2);
        assert_eq!(metrics.handed_off, 5);
        assert_eq!(metrics.pending, 3);

        drop(tx);
        let mut received = Vec::new();
        while let Some(i) = rx.recv().await {
            received.push(i);
        }
        assert_eq!(received, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_recv_ends_after_last_sender_dropped() {
        let (tx, mut rx) = channel::<u32>(2);
        let tx2 = tx.clone();
        tx.handoff(7);
        drop(tx);
        assert!(!tx2.is_closed());
        drop(tx2);

        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_wakes_receiver_from_other_thread() {
        let (tx, mut rx) = channel(DEFAULT_CAPACITY);

        let producer = std::thread::spawn(move || {
            for i in 0..100u32 {
                tx.handoff(i);
                if i % 10 == 0 {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        });

        let mut last = None;
        let mut count = 0;
        while let Some(i) = rx.recv().await {
            if let Some(prev) = last {
                assert!(i > prev, "out of order: {} after {}", i, prev);
            }
            last = Some(i);
            count += 1;
        }
        producer.join().unwrap();

        let metrics = rx.metrics();
        assert_eq!(last, Some(99));
        assert_eq!(count as u64 + metrics.dropped, 100);
        assert_eq!(metrics.delivered, count as u64);
    }

    #[tokio::test]
    async fn test_close_rejects_new_items() {
        let (tx, mut rx) = channel(2);
        tx.handoff(1);
        rx.close();

        assert!(tx.is_closed());
        assert_eq!(tx.handoff(2), Some(2));
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_monitor_does_not_hold_relay_open() {
        let (tx, rx) = channel::<u8>(2);
        let monitor = tx.monitor();
        tx.handoff(1);
        drop(tx);

        assert_eq!(monitor.metrics().pending, 1);
        assert!(rx.shared.closed.load(Ordering::Acquire));
    }
}
