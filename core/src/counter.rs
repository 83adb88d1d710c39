//! Success/failure counters shared by the breaker and its state machine guards

use parking_lot::Mutex;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counts {
    success: u64,
    failure: u64,
}

/// Thread-safe pair of monotonic counters
///
/// Both counters sit behind one lock so every operation is serialized with
/// every other, even though the two values are logically independent.
#[derive(Debug, Default)]
pub struct Counter {
    counts: Mutex<Counts>,
}

impl Counter {
    /// Create a counter with both values at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the success count and return the new value
    pub fn increment_success(&self) -> u64 {
        let mut counts = self.counts.lock();
        counts.success = counts.success.saturating_add(1);
        counts.success
    }

    /// Increment the failure count and return the new value
    pub fn increment_failure(&self) -> u64 {
        let mut counts = self.counts.lock();
        counts.failure = counts.failure.saturating_add(1);
        counts.failure
    }

    pub fn reset_success(&self) {
        self.counts.lock().success = 0;
    }

    pub fn reset_failure(&self) {
        self.counts.lock().failure = 0;
    }

    /// Current success count
    pub fn successes(&self) -> u64 {
        self.counts.lock().success
    }

    /// Current failure count
    pub fn failures(&self) -> u64 {
        self.counts.lock().failure
    }

    /// Snapshot of `(successes, failures)` taken under a single lock
    pub fn snapshot(&self) -> (u64, u64) {
        let counts = self.counts.lock();
        (counts.success, counts.failure)
    }
}
