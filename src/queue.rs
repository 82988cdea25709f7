//! Thread-safe blocking FIFO queue.
//!
//! [`BlockingQueue`] is the sole synchronization primitive between the MQTT
//! control-plane threads and the acquisition data-plane thread. Two instances
//! bridge the planes: an inbound queue carrying raw command payloads and an
//! outbound queue carrying rendered status messages. Each thread only ever uses
//! one direction of each queue, so the queue's own lock is the only locking in
//! the system.
//!
//! The queue is unbounded and strictly FIFO: items pop in the exact order their
//! pushes acquired the internal lock, regardless of how many producers there are.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Unbounded multi-producer blocking FIFO.
#[derive(Debug, Default)]
pub struct BlockingQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> BlockingQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Append `item` to the tail and wake one blocked waiter. Never fails and
    /// never blocks beyond the internal lock.
    pub fn push(&self, item: T) {
        let mut items = self.items.lock();
        items.push_back(item);
        self.available.notify_one();
    }

    /// Block until an item is available, then remove and return the head.
    pub fn pop(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.available.wait(&mut items);
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    ///
    /// Callers that must observe a [`crate::cancel::CancelToken`] pop with a
    /// short timeout and re-check the token between attempts.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if self.available.wait_until(&mut items, deadline).timed_out() {
                return items.pop_front();
            }
        }
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// True when no items are queued.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn pops_in_push_order() {
        let queue = BlockingQueue::new();
        for i in 0..10 {
            queue.push(i);
        }
        for i in 0..10 {
            assert_eq!(queue.pop(), i);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_blocks_until_push() {
        let queue = Arc::new(BlockingQueue::new());
        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            producer.push("wake".to_string());
        });
        let start = Instant::now();
        assert_eq!(queue.pop(), "wake");
        assert!(start.elapsed() >= Duration::from_millis(40));
        handle.join().ok();
    }

    #[test]
    fn pop_timeout_returns_none_when_empty() {
        let queue: BlockingQueue<u32> = BlockingQueue::new();
        let start = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(50)), None);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn pop_timeout_returns_item_pushed_while_waiting() {
        let queue = Arc::new(BlockingQueue::new());
        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            producer.push(7u32);
        });
        assert_eq!(queue.pop_timeout(Duration::from_secs(2)), Some(7));
        handle.join().ok();
    }

    /// Global FIFO across producers: producers take a ticket and push while
    /// holding a shared lock, so arrival order is well defined; the consumer
    /// must then observe exactly that order.
    #[test]
    fn global_fifo_across_concurrent_producers() {
        let queue = Arc::new(BlockingQueue::new());
        let arrival = Arc::new(Mutex::new(0u64));
        let mut handles = Vec::new();
        for producer in 0..4u64 {
            let queue = Arc::clone(&queue);
            let arrival = Arc::clone(&arrival);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    let mut ticket = arrival.lock();
                    let seq = *ticket;
                    *ticket += 1;
                    queue.push((producer, seq));
                    drop(ticket);
                    thread::yield_now();
                }
            }));
        }
        for handle in handles {
            handle.join().ok();
        }
        let mut per_producer_last: [Option<u64>; 4] = [None; 4];
        for expected in 0..400u64 {
            let (producer, seq) = queue.pop();
            assert_eq!(seq, expected, "arrival order not preserved");
            // per-producer subsequence must also be monotonic
            if let Some(last) = per_producer_last[producer as usize] {
                assert!(seq > last);
            }
            per_producer_last[producer as usize] = Some(seq);
        }
        assert!(queue.is_empty());
    }
}
