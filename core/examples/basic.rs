//! Basic circuit breaker usage example
//!
//! Run with `RUST_LOG=debug` to see the breaker's transition logs.

use counting_breaker::{CircuitBreaker, ManualScheduler};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Circuit Breaker Basic Example ===\n");

    // A manual clock lets the example skip the cooldown instantly
    let clock = Arc::new(ManualScheduler::new());
    let circuit = CircuitBreaker::builder("payment_api")
        .failure_threshold(3)
        .success_threshold(2)
        .timeout(Duration::from_secs(5))
        .scheduler(clock.clone())
        .on_open(|name| println!("🔴 Circuit '{}' opened!", name))
        .on_close(|name| println!("🟢 Circuit '{}' closed!", name))
        .on_half_open(|name| println!("🟡 Circuit '{}' half-open, testing...", name))
        .build();

    println!("Initial state: {}\n", circuit.state_name());

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match circuit.call(move || Ok::<_, String>(format!("Payment {}", i))) {
            Ok(result) => println!("✓ {}", result),
            Err(e) => println!("✗ Error: {}", e),
        }
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- Triggering failures ---");
    for i in 1..=3 {
        match circuit.call(move || Err::<String, _>(format!("Payment failed {}", i))) {
            Ok(_) => println!("✓ Success"),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("State: {} (circuit opened)\n", circuit.state_name());

    println!("--- Attempting call while open ---");
    match circuit.call(|| Ok::<_, String>("Should be rejected")) {
        Ok(_) => println!("✓ Success"),
        Err(e) => println!("✗ {}", e),
    }
    println!();

    println!("--- Waiting out the cooldown ---");
    clock.advance(Duration::from_secs(5));
    println!("State: {}\n", circuit.state_name());

    println!("--- Probing recovery ---");
    for _ in 0..2 {
        circuit.success();
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- Resetting circuit ---");
    circuit.fail();
    circuit.reset();
    println!("State after reset: {}", circuit.state_name());
}
