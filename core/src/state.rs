//! Public view of the circuit state

use std::fmt;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Dependency assumed healthy; failures are counted toward the threshold
    Closed,
    /// Probing recovery; successes are counted toward closing, any failure reopens
    HalfOpened,
    /// Dependency assumed unhealthy; calls are denied until the cooldown elapses
    Opened,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::HalfOpened => "halfopened",
            State::Opened => "opened",
        }
    }

    /// Whether callers may attempt work in this state
    pub fn is_avail(self) -> bool {
        matches!(self, State::Closed | State::HalfOpened)
    }

    /// Map a state machine state name onto the public state
    pub(crate) fn from_machine(name: &str) -> Self {
        match name {
            "Closed" => State::Closed,
            "HalfOpen" => State::HalfOpened,
            "Open" => State::Opened,
            other => unreachable!("unknown circuit state: {other}"),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability() {
        assert!(State::Closed.is_avail());
        assert!(State::HalfOpened.is_avail());
        assert!(!State::Opened.is_avail());
    }

    #[test]
    fn test_display() {
        assert_eq!(State::Closed.to_string(), "closed");
        assert_eq!(State::HalfOpened.to_string(), "halfopened");
        assert_eq!(State::Opened.to_string(), "opened");
    }

    #[test]
    fn test_from_machine_names() {
        assert_eq!(State::from_machine("Closed"), State::Closed);
        assert_eq!(State::from_machine("HalfOpen"), State::HalfOpened);
        assert_eq!(State::from_machine("Open"), State::Opened);
    }

    #[test]
    #[should_panic(expected = "unknown circuit state")]
    fn test_unknown_machine_state_is_a_bug() {
        State::from_machine("Ajar");
    }
}
