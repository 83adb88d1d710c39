//! Error types for circuit breaker operations

use thiserror::Error;

/// Errors returned by [`CircuitBreaker::call`](crate::CircuitBreaker::call)
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// Circuit is open, the call was not attempted
    #[error("Circuit '{circuit}' is open")]
    Open { circuit: String },
    /// The wrapped operation failed
    #[error("Circuit execution failed: {0}")]
    Execution(E),
}

/// Invalid configuration rejected by [`CircuitBuilder::try_build`](crate::CircuitBuilder::try_build)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("success threshold must be at least 1")]
    ZeroSuccessThreshold,
    #[error("failure threshold must be at least 1")]
    ZeroFailureThreshold,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_message() {
        let err: CircuitError<String> = CircuitError::Open {
            circuit: "payments".to_string(),
        };
        assert_eq!(err.to_string(), "Circuit 'payments' is open");
    }

    #[test]
    fn test_execution_error_message() {
        let err = CircuitError::Execution("timeout");
        assert_eq!(err.to_string(), "Circuit execution failed: timeout");
    }

    #[test]
    fn test_config_error_message() {
        assert_eq!(
            ConfigError::ZeroFailureThreshold.to_string(),
            "failure threshold must be at least 1"
        );
    }
}
