//! counting-breaker - consecutive-count circuit breaker
//!
//! This crate provides a thread-safe circuit breaker with:
//! - State machine for the breaker lifecycle (Closed → Opened → HalfOpened)
//! - Consecutive failure/success thresholds driving each transition
//! - Timer-driven cooldown with a pluggable scheduler
//! - Manual scheduler for deterministic tests
//!
//! Callers report outcomes with `success()`/`fail()` and consult
//! `is_avail()` before each attempt. The breaker never performs I/O itself.
//!
//! # Example
//!
//! ```rust
//! use counting_breaker::CircuitBreaker;
//! use std::time::Duration;
//!
//! let circuit = CircuitBreaker::builder("my_service")
//!     .failure_threshold(3)
//!     .success_threshold(2)
//!     .timeout(Duration::from_secs(30))
//!     .on_open(|name| println!("Circuit {} opened!", name))
//!     .build();
//!
//! if circuit.is_avail() {
//!     // Your service call here
//!     let outcome: Result<(), String> = Ok(());
//!     match outcome {
//!         Ok(_) => circuit.success(),
//!         Err(_) => circuit.fail(),
//!     }
//! }
//!
//! // Or let the breaker report the outcome for you
//! let result = circuit.call(|| Ok::<_, String>("success"));
//! assert!(result.is_ok());
//! ```

pub mod builder;
pub mod callbacks;
mod circuit;
pub mod counter;
pub mod errors;
pub mod scheduler;
pub mod state;

pub use builder::CircuitBuilder;
pub use circuit::{
    CircuitBreaker, Config, DEFAULT_FAILURE_THRESHOLD, DEFAULT_SUCCESS_THRESHOLD, DEFAULT_TIMEOUT,
};
pub use counter::Counter;
pub use errors::{CircuitError, ConfigError};
pub use scheduler::{ManualScheduler, Scheduler, ThreadScheduler, TimerCallback, TimerHandle};
pub use state::State;
