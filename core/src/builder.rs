//! Builder API for ergonomic circuit breaker configuration

use crate::{
    callbacks::Callbacks,
    circuit::{CircuitBreaker, CircuitContext, Config},
    counter::Counter,
    errors::ConfigError,
    scheduler::{Scheduler, ThreadScheduler},
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
///
/// Options apply in call order, so a later call for the same setting wins.
pub struct CircuitBuilder {
    name: String,
    config: Config,
    scheduler: Option<Arc<dyn Scheduler>>,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            scheduler: None,
            callbacks: Callbacks::new(),
        }
    }

    /// Set the success threshold (successes needed to close from half-open)
    pub fn success_threshold(mut self, threshold: u64) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Set the failure threshold (failures needed to open from closed)
    pub fn failure_threshold(mut self, threshold: u64) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set the cooldown before an open circuit starts probing
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the scheduler that runs cooldown timers
    ///
    /// Defaults to a [`ThreadScheduler`]. Pass a
    /// [`ManualScheduler`](crate::ManualScheduler) to control time in tests.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Build the circuit breaker
    ///
    /// Thresholds are not validated: a zero threshold is satisfied by the
    /// first signal of its kind. Use [`try_build`](Self::try_build) to reject
    /// such configurations instead.
    pub fn build(self) -> CircuitBreaker {
        if self.config.failure_threshold == 0 || self.config.success_threshold == 0 {
            tracing::warn!(
                circuit = %self.name,
                failure_threshold = self.config.failure_threshold,
                success_threshold = self.config.success_threshold,
                "zero threshold configured, circuit trips on the first signal"
            );
        }

        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(ThreadScheduler::new()));

        let context = CircuitContext {
            name: self.name,
            config: self.config,
            counter: Arc::new(Counter::new()),
            scheduler,
        };

        CircuitBreaker::with_context_and_callbacks(context, self.callbacks)
    }

    /// Build the circuit breaker, rejecting zero thresholds
    pub fn try_build(self) -> Result<CircuitBreaker, ConfigError> {
        if self.config.success_threshold == 0 {
            return Err(ConfigError::ZeroSuccessThreshold);
        }
        if self.config.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        Ok(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualScheduler;

    #[test]
    fn test_builder_defaults() {
        let circuit = CircuitBuilder::new("test").build();

        assert_eq!(circuit.state_name(), "closed");
        assert!(circuit.is_closed());
        assert_eq!(circuit.config(), &Config::default());
        assert_eq!(circuit.config().success_threshold, 3);
        assert_eq!(circuit.config().failure_threshold, 3);
        assert_eq!(circuit.config().timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_custom_config() {
        let circuit = CircuitBuilder::new("test")
            .failure_threshold(10)
            .success_threshold(4)
            .timeout(Duration::from_secs(60))
            .build();

        assert_eq!(circuit.name(), "test");
        assert_eq!(circuit.config().failure_threshold, 10);
        assert_eq!(circuit.config().success_threshold, 4);
        assert_eq!(circuit.config().timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_later_options_win() {
        let circuit = CircuitBuilder::new("test")
            .failure_threshold(7)
            .timeout(Duration::from_secs(1))
            .failure_threshold(2)
            .timeout(Duration::from_secs(5))
            .build();

        assert_eq!(circuit.config().failure_threshold, 2);
        assert_eq!(circuit.config().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_factor_is_clamped() {
        let circuit = CircuitBuilder::new("test").jitter_factor(3.0).build();
        assert_eq!(circuit.config().jitter_factor, 1.0);

        let circuit = CircuitBuilder::new("test").jitter_factor(-1.0).build();
        assert_eq!(circuit.config().jitter_factor, 0.0);
    }

    #[test]
    fn test_try_build_rejects_zero_thresholds() {
        let err = CircuitBuilder::new("test")
            .success_threshold(0)
            .try_build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroSuccessThreshold);

        let err = CircuitBuilder::new("test")
            .failure_threshold(0)
            .try_build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroFailureThreshold);

        assert!(CircuitBuilder::new("test").try_build().is_ok());
    }

    #[test]
    fn test_builder_with_callbacks() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let opened = Arc::new(AtomicBool::new(false));
        let opened_clone = opened.clone();

        let circuit = CircuitBuilder::new("test")
            .failure_threshold(2)
            .scheduler(Arc::new(ManualScheduler::new()))
            .on_open(move |_name| {
                opened_clone.store(true, Ordering::SeqCst);
            })
            .build();

        circuit.fail();
        circuit.fail();

        assert!(opened.load(Ordering::SeqCst));
    }
}
