//! Timer scheduling used for the Open -> HalfOpen cooldown
//!
//! This module provides two schedulers:
//! - `ThreadScheduler`: wall-clock timers, one parked worker thread per armed timer
//! - `ManualScheduler`: virtual clock advanced explicitly, for deterministic tests

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

/// One-shot callback run when a timer fires
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled one-shot callback
pub trait TimerHandle: Send + Sync + fmt::Debug {
    /// Prevent the callback from running
    ///
    /// Returns `true` only if this call stopped a pending firing. Cancelling a
    /// timer that already fired or was already cancelled returns `false`.
    fn cancel(&self) -> bool;
}

/// Source of one-shot timers and of the monotonic clock they are measured on
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Run `callback` once after `delay` has elapsed on this scheduler's clock
    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> Box<dyn TimerHandle>;

    /// Monotonic time relative to the scheduler's creation
    fn monotonic_time(&self) -> Duration;
}

const PENDING: u8 = 0;
const CANCELLED: u8 = 1;
const FIRED: u8 = 2;

/// Firing/cancel arbitration shared between a handle and its timer
///
/// Whichever of `try_fire` and `try_cancel` wins the compare-exchange decides
/// whether the callback runs; the loser observes `false`.
#[derive(Debug)]
struct TimerState {
    status: AtomicU8,
}

impl TimerState {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(PENDING),
        }
    }

    fn is_pending(&self) -> bool {
        self.status.load(Ordering::Acquire) == PENDING
    }

    fn try_fire(&self) -> bool {
        self.transition(FIRED)
    }

    fn try_cancel(&self) -> bool {
        self.transition(CANCELLED)
    }

    fn transition(&self, to: u8) -> bool {
        self.status
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Wall-clock scheduler backed by short-lived worker threads
///
/// Each armed timer parks a dedicated thread until its deadline. Cancelling
/// unparks the thread so it exits immediately instead of sleeping out the
/// remaining cooldown.
#[derive(Debug, Clone, Copy)]
pub struct ThreadScheduler {
    start_time: Instant,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> Box<dyn TimerHandle> {
        let state = Arc::new(TimerState::new());
        // None when the deadline is past what Instant can represent; such a
        // timer only ever ends by cancellation
        let deadline = Instant::now().checked_add(delay);
        let worker_state = Arc::clone(&state);

        let spawned = thread::Builder::new()
            .name("breaker-cooldown".to_string())
            .spawn(move || {
                loop {
                    if !worker_state.is_pending() {
                        return;
                    }
                    // Spurious wakeups just loop back to the deadline check
                    match deadline {
                        Some(deadline) => {
                            let now = Instant::now();
                            if now >= deadline {
                                break;
                            }
                            thread::park_timeout(deadline - now);
                        }
                        None => thread::park(),
                    }
                }

                if worker_state.try_fire() {
                    callback();
                }
            });

        let worker = match spawned {
            Ok(handle) => Some(handle.thread().clone()),
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn cooldown timer thread");
                state.try_cancel();
                None
            }
        };

        Box::new(ThreadTimer { state, worker })
    }

    fn monotonic_time(&self) -> Duration {
        self.start_time.elapsed()
    }
}

#[derive(Debug)]
struct ThreadTimer {
    state: Arc<TimerState>,
    worker: Option<Thread>,
}

impl TimerHandle for ThreadTimer {
    fn cancel(&self) -> bool {
        if !self.state.try_cancel() {
            return false;
        }
        if let Some(worker) = &self.worker {
            worker.unpark();
        }
        true
    }
}

struct ManualEntry {
    deadline: Duration,
    seq: u64,
    state: Arc<TimerState>,
    callback: TimerCallback,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_seq: u64,
    timers: Vec<ManualEntry>,
}

/// Scheduler driven by a virtual clock that only moves on `advance`
///
/// Callbacks that come due run on the thread calling `advance`, in deadline
/// order, after the scheduler's own lock has been released.
///
/// # Example
///
/// ```rust
/// use counting_breaker::{CircuitBreaker, ManualScheduler};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let clock = Arc::new(ManualScheduler::new());
/// let breaker = CircuitBreaker::builder("db")
///     .failure_threshold(1)
///     .timeout(Duration::from_secs(10))
///     .scheduler(clock.clone())
///     .build();
///
/// breaker.fail();
/// assert!(!breaker.is_avail());
///
/// clock.advance(Duration::from_secs(10));
/// assert!(breaker.is_avail());
/// ```
#[derive(Default)]
pub struct ManualScheduler {
    clock: Mutex<ManualClock>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward and run every callback whose deadline has passed
    pub fn advance(&self, by: Duration) {
        let mut due = {
            let mut clock = self.clock.lock();
            clock.now = clock.now.saturating_add(by);
            let now = clock.now;

            let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut clock.timers)
                .into_iter()
                .filter(|entry| entry.state.is_pending())
                .partition(|entry| entry.deadline <= now);
            clock.timers = waiting;
            due
        };

        due.sort_by_key(|entry| (entry.deadline, entry.seq));
        for entry in due {
            if entry.state.try_fire() {
                (entry.callback)();
            }
        }
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.clock.lock().now
    }

    /// Number of timers that are still armed
    pub fn pending(&self) -> usize {
        self.clock
            .lock()
            .timers
            .iter()
            .filter(|entry| entry.state.is_pending())
            .count()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> Box<dyn TimerHandle> {
        let state = Arc::new(TimerState::new());
        let mut clock = self.clock.lock();
        let seq = clock.next_seq;
        clock.next_seq += 1;
        let deadline = clock.now.saturating_add(delay);
        clock.timers.push(ManualEntry {
            deadline,
            seq,
            state: Arc::clone(&state),
            callback,
        });

        Box::new(ManualTimer { state })
    }

    fn monotonic_time(&self) -> Duration {
        self.now()
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.clock.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &clock.now)
            .field("timers", &clock.timers.len())
            .finish()
    }
}

#[derive(Debug)]
struct ManualTimer {
    state: Arc<TimerState>,
}

impl TimerHandle for ManualTimer {
    fn cancel(&self) -> bool {
        self.state.try_cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::mpsc;

    fn flag_callback(flag: &Arc<AtomicBool>) -> TimerCallback {
        let flag = Arc::clone(flag);
        Box::new(move || flag.store(true, Ordering::SeqCst))
    }

    #[test]
    fn test_manual_fires_at_deadline() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));

        let _handle = scheduler.schedule_after(Duration::from_secs(30), flag_callback(&fired));
        assert_eq!(scheduler.pending(), 1);

        scheduler.advance(Duration::from_secs(29));
        assert!(!fired.load(Ordering::SeqCst));

        scheduler.advance(Duration::from_secs(1));
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.now(), Duration::from_secs(30));
    }

    #[test]
    fn test_manual_cancel_is_idempotent() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));

        let handle = scheduler.schedule_after(Duration::from_secs(5), flag_callback(&fired));
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(scheduler.pending(), 0);

        scheduler.advance(Duration::from_secs(10));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_manual_cancel_after_fire_returns_false() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));

        let handle = scheduler.schedule_after(Duration::ZERO, flag_callback(&fired));
        scheduler.advance(Duration::ZERO);

        assert!(fired.load(Ordering::SeqCst));
        assert!(!handle.cancel());
    }

    #[test]
    fn test_manual_fires_in_deadline_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (label, secs) in [("late", 20), ("early", 5), ("middle", 10)] {
            let order = Arc::clone(&order);
            let _ = scheduler.schedule_after(
                Duration::from_secs(secs),
                Box::new(move || order.lock().push(label)),
            );
        }

        scheduler.advance(Duration::from_secs(60));
        assert_eq!(*order.lock(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_manual_callback_may_schedule_again() {
        let scheduler = Arc::new(ManualScheduler::new());
        let count = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = Arc::clone(&scheduler);
        let inner_count = Arc::clone(&count);
        let _ = scheduler.schedule_after(
            Duration::from_secs(1),
            Box::new(move || {
                inner_count.fetch_add(1, Ordering::SeqCst);
                let count = Arc::clone(&inner_count);
                let _ = inner_scheduler.schedule_after(
                    Duration::from_secs(1),
                    Box::new(move || {
                        count.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        scheduler.advance(Duration::from_secs(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 1);

        scheduler.advance(Duration::from_secs(1));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_manual_unrepresentable_deadline_saturates() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));

        scheduler.advance(Duration::from_secs(1));
        let handle = scheduler.schedule_after(Duration::MAX, flag_callback(&fired));

        scheduler.advance(Duration::from_secs(3600));
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending(), 1);

        scheduler.advance(Duration::MAX);
        scheduler.advance(Duration::MAX);
        assert_eq!(scheduler.now(), Duration::MAX);
        assert!(fired.load(Ordering::SeqCst));
        assert!(!handle.cancel());
    }

    #[test]
    fn test_thread_scheduler_unrepresentable_deadline_waits_for_cancel() {
        let scheduler = ThreadScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));

        let handle = scheduler.schedule_after(Duration::MAX, flag_callback(&fired));
        thread::sleep(Duration::from_millis(20));
        assert!(!fired.load(Ordering::SeqCst));

        assert!(handle.cancel());
        assert!(!handle.cancel());
    }

    #[test]
    fn test_thread_scheduler_fires() {
        let scheduler = ThreadScheduler::new();
        let (tx, rx) = mpsc::channel();

        let handle = scheduler.schedule_after(
            Duration::from_millis(10),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );

        rx.recv_timeout(Duration::from_secs(5))
            .expect("timer should fire");
        assert!(!handle.cancel());
    }

    #[test]
    fn test_thread_scheduler_cancel_prevents_firing() {
        let scheduler = ThreadScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));

        let handle = scheduler.schedule_after(Duration::from_millis(50), flag_callback(&fired));
        assert!(handle.cancel());

        thread::sleep(Duration::from_millis(100));
        assert!(!fired.load(Ordering::SeqCst));
        assert!(!handle.cancel());
    }

    #[test]
    fn test_thread_scheduler_monotonic_time() {
        let scheduler = ThreadScheduler::new();

        let time1 = scheduler.monotonic_time();
        thread::sleep(Duration::from_millis(10));
        let time2 = scheduler.monotonic_time();

        assert!(time2 > time1);
    }
}
