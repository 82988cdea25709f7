//! Cooperative cancellation token.
//!
//! Shutdown is signalled through an explicit [`CancelToken`] that is passed into
//! every suspension point: the queue pop, the sensor-poll loop, the streaming
//! receive loop, and the clock-sync waits. Nothing in the system consults global
//! mutable state to decide whether to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of cancellable sleeps. Long waits are sliced so a cancel request
/// is observed within this bound.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Cloneable cancellation token shared between threads.
///
/// All clones observe the same flag; cancelling any clone cancels them all.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `true` if the full duration elapsed, `false` if the sleep was cut
    /// short by a cancel request.
    pub fn sleep_for(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
