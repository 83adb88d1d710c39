//! Circuit breaker implementation using state machines
//!
//! The breaker keeps its machine, armed cooldown timer and timer generation
//! behind one mutex. Every signal (`success`, `fail`, `reset` and the cooldown
//! callback) takes that lock for the whole transition, so observers never see
//! a new state paired with stale counters or timer.

use crate::{
    callbacks::Callbacks,
    counter::Counter,
    errors::CircuitError,
    scheduler::{Scheduler, ThreadScheduler, TimerHandle},
    state::State,
};
use parking_lot::Mutex;
use state_machines::state_machine;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Successes needed in HalfOpen to close the circuit
pub const DEFAULT_SUCCESS_THRESHOLD: u64 = 3;
/// Consecutive failures needed in Closed to open the circuit
pub const DEFAULT_FAILURE_THRESHOLD: u64 = 3;
/// Cooldown between opening and the first recovery attempt
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Number of successes required in HalfOpen to close the circuit
    pub success_threshold: u64,

    /// Number of failures required in Closed to open the circuit
    pub failure_threshold: u64,

    /// Cooldown before transitioning from Open to HalfOpen
    pub timeout: Duration,

    /// Jitter factor for the cooldown (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
            jitter_factor: 0.0,
        }
    }
}

impl Config {
    /// Cooldown for the next Open period, with jitter applied
    pub fn cooldown(&self) -> Duration {
        let timeout_us = u64::try_from(self.timeout.as_micros()).unwrap_or(u64::MAX);
        if self.jitter_factor <= 0.0 || timeout_us == 0 {
            return self.timeout;
        }

        // The policy formula is unit-agnostic; micros keep sub-millisecond
        // timeouts from collapsing to zero
        let policy = chrono_machines::Policy {
            max_attempts: 1,
            base_delay_ms: timeout_us,
            multiplier: 1.0,
            max_delay_ms: timeout_us,
        };
        let jittered_us = (policy.calculate_delay(1, self.jitter_factor) as u64).max(1);
        Duration::from_micros(jittered_us)
    }
}

/// Circuit breaker context - shared data across all states
#[derive(Debug, Clone)]
pub(crate) struct CircuitContext {
    pub(crate) name: String,
    pub(crate) config: Config,
    pub(crate) counter: Arc<Counter>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
}

impl Default for CircuitContext {
    fn default() -> Self {
        Self {
            name: String::new(),
            config: Config::default(),
            counter: Arc::new(Counter::new()),
            scheduler: Arc::new(ThreadScheduler::new()),
        }
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    /// Scheduler time at which the circuit opened
    pub opened_at: Duration,
    /// Cooldown armed for this Open period
    pub cooldown: Duration,
}

state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen,
    ],
    events {
        trip {
            guards: [should_open],
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [timeout_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [should_close],
            transition: { from: HalfOpen, to: Closed }
        }
    }
}

impl Circuit<Closed> {
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        ctx.counter.failures() >= ctx.config.failure_threshold
    }
}

impl Circuit<HalfOpen> {
    /// A single failure while probing is conclusive
    fn should_open(&self, _ctx: &CircuitContext) -> bool {
        true
    }

    fn should_close(&self, ctx: &CircuitContext) -> bool {
        ctx.counter.successes() >= ctx.config.success_threshold
    }
}

impl Circuit<Open> {
    fn timeout_elapsed(&self, ctx: &CircuitContext) -> bool {
        let now = ctx.scheduler.monotonic_time();
        self.state_data_open()
            .is_some_and(|data| now.saturating_sub(data.opened_at) >= data.cooldown)
    }
}

struct Inner {
    machine: DynamicCircuit,
    /// Armed cooldown; present exactly while Open and not yet handled
    timer: Option<Box<dyn TimerHandle>>,
    /// Bumped on every arm and reset so late callbacks can tell they are stale
    generation: u64,
}

impl Inner {
    fn state(&self) -> State {
        State::from_machine(self.machine.current_state())
    }

    fn check_invariants(&self) {
        debug_assert_eq!(
            self.timer.is_some(),
            self.state() == State::Opened,
            "cooldown timer must be armed exactly while the circuit is open"
        );
    }
}

struct Shared {
    context: CircuitContext,
    callbacks: Callbacks,
    inner: Mutex<Inner>,
}

impl Shared {
    fn name(&self) -> &str {
        &self.context.name
    }

    /// Move to Open and arm the cooldown. Returns the entered state on success.
    fn trip(self: &Arc<Self>, inner: &mut Inner) -> Option<State> {
        let from = inner.state();
        if inner.machine.handle(CircuitEvent::Trip).is_err() {
            tracing::warn!(circuit = %self.name(), %from, "trip rejected by state machine");
            return None;
        }

        let opened_at = self.context.scheduler.monotonic_time();
        let cooldown = self.context.config.cooldown();
        if let Some(data) = inner.machine.open_data_mut() {
            data.opened_at = opened_at;
            data.cooldown = cooldown;
        }
        self.arm_cooldown(inner, cooldown);

        tracing::info!(
            circuit = %self.name(),
            %from,
            failures = self.context.counter.failures(),
            cooldown_ms = cooldown.as_millis() as u64,
            "circuit opened"
        );
        Some(State::Opened)
    }

    fn arm_cooldown(self: &Arc<Self>, inner: &mut Inner, delay: Duration) {
        inner.generation += 1;
        let generation = inner.generation;
        let weak: Weak<Shared> = Arc::downgrade(self);

        let handle = self.context.scheduler.schedule_after(
            delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.cooldown_elapsed(generation);
                }
            }),
        );

        if let Some(previous) = inner.timer.replace(handle) {
            previous.cancel();
        }
    }

    fn cooldown_elapsed(self: &Arc<Self>, generation: u64) {
        let entered = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                tracing::trace!(circuit = %self.name(), "ignoring superseded cooldown timer");
                return;
            }

            let deadline = inner
                .machine
                .open_data()
                .map(|data| data.opened_at.saturating_add(data.cooldown));

            let entered = if let Some(entered) = self.poll_cooldown(&mut inner) {
                Some(entered)
            } else if let Some(deadline) = deadline {
                // Scheduler fired ahead of its own clock; wait out the rest
                let remaining = deadline.saturating_sub(self.context.scheduler.monotonic_time());
                tracing::warn!(
                    circuit = %self.name(),
                    remaining_ms = remaining.as_millis() as u64,
                    "cooldown fired early, re-arming"
                );
                self.arm_cooldown(&mut inner, remaining);
                None
            } else {
                inner.timer = None;
                None
            };
            inner.check_invariants();
            entered
        };

        self.notify(entered);
    }

    /// Half-open the circuit if its cooldown has run out
    ///
    /// Called from the timer callback and on every signal or state read, so
    /// an Open circuit still recovers when its timer never delivers.
    fn poll_cooldown(&self, inner: &mut Inner) -> Option<State> {
        if inner.state() != State::Opened
            || inner.machine.handle(CircuitEvent::AttemptReset).is_err()
        {
            return None;
        }

        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
        inner.generation += 1;
        self.context.counter.reset_success();
        tracing::debug!(circuit = %self.name(), "circuit half-opened");
        Some(State::HalfOpened)
    }

    fn notify(&self, entered: Option<State>) {
        if let Some(state) = entered {
            self.callbacks.trigger(state, self.name());
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.get_mut().timer.take() {
            timer.cancel();
        }
    }
}

/// Circuit breaker public API
///
/// Cloning is cheap; clones share the same breaker.
#[derive(Clone)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker (use builder() for more options)
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        let context = CircuitContext {
            name: name.into(),
            config,
            ..Default::default()
        };

        Self::with_context_and_callbacks(context, Callbacks::new())
    }

    /// Create a circuit breaker with custom context and callbacks (used by builder)
    pub(crate) fn with_context_and_callbacks(context: CircuitContext, callbacks: Callbacks) -> Self {
        let machine = DynamicCircuit::new(context.clone());

        Self {
            shared: Arc::new(Shared {
                context,
                callbacks,
                inner: Mutex::new(Inner {
                    machine,
                    timer: None,
                    generation: 0,
                }),
            }),
        }
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }

    /// Report a failed attempt against the protected dependency
    pub fn fail(&self) {
        let shared = &self.shared;
        let (lapsed, entered) = {
            let mut inner = shared.inner.lock();
            let lapsed = shared.poll_cooldown(&mut inner);
            let entered = match inner.state() {
                State::Opened => {
                    tracing::trace!(circuit = %shared.name(), "failure ignored while open");
                    None
                }
                State::HalfOpened => shared.trip(&mut inner),
                State::Closed => {
                    let failures = shared.context.counter.increment_failure();
                    if failures >= shared.context.config.failure_threshold {
                        shared.trip(&mut inner)
                    } else {
                        None
                    }
                }
            };
            inner.check_invariants();
            (lapsed, entered)
        };

        shared.notify(lapsed);
        shared.notify(entered);
    }

    /// Report a successful attempt against the protected dependency
    pub fn success(&self) {
        let shared = &self.shared;
        let (lapsed, entered) = {
            let mut inner = shared.inner.lock();
            let lapsed = shared.poll_cooldown(&mut inner);
            let entered = match inner.state() {
                State::HalfOpened => {
                    let successes = shared.context.counter.increment_success();
                    if successes >= shared.context.config.success_threshold
                        && inner.machine.handle(CircuitEvent::Close).is_ok()
                    {
                        shared.context.counter.reset_failure();
                        tracing::info!(circuit = %shared.name(), successes, "circuit closed");
                        Some(State::Closed)
                    } else {
                        None
                    }
                }
                State::Closed | State::Opened => None,
            };
            inner.check_invariants();
            (lapsed, entered)
        };

        shared.notify(lapsed);
        shared.notify(entered);
    }

    /// Whether the dependency may be called right now
    pub fn is_avail(&self) -> bool {
        self.state().is_avail()
    }

    /// Cancel any cooldown, zero both counters and return to Closed
    pub fn reset(&self) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();

        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
        inner.generation += 1;
        shared.context.counter.reset_success();
        shared.context.counter.reset_failure();
        // Recreate machine in Closed state
        inner.machine = DynamicCircuit::new(shared.context.clone());
        inner.check_invariants();

        tracing::debug!(circuit = %shared.name(), "circuit reset");
    }

    /// Execute a fallible operation with circuit breaker protection
    ///
    /// The operation is skipped with `CircuitError::Open` while the circuit
    /// is open; otherwise its result is reported as a success or failure.
    pub fn call<T, E, F>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if !self.is_avail() {
            return Err(CircuitError::Open {
                circuit: self.shared.name().to_string(),
            });
        }

        match f() {
            Ok(val) => {
                self.success();
                Ok(val)
            }
            Err(e) => {
                self.fail();
                Err(CircuitError::Execution(e))
            }
        }
    }

    /// Current state
    pub fn state(&self) -> State {
        let shared = &self.shared;
        let (state, lapsed) = {
            let mut inner = shared.inner.lock();
            let lapsed = shared.poll_cooldown(&mut inner);
            (inner.state(), lapsed)
        };

        shared.notify(lapsed);
        state
    }

    /// Get current state name
    pub fn state_name(&self) -> &'static str {
        self.state().as_str()
    }

    pub fn is_open(&self) -> bool {
        self.state() == State::Opened
    }

    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == State::HalfOpened
    }

    /// Current `(successes, failures)` counts
    pub fn counts(&self) -> (u64, u64) {
        self.shared.context.counter.snapshot()
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn config(&self) -> &Config {
        &self.shared.context.config
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (successes, failures) = self.counts();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.shared.name())
            .field("state", &self.state())
            .field("successes", &successes)
            .field("failures", &failures)
            .field("config", &self.shared.context.config)
            .finish()
    }
}
