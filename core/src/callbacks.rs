//! Transition hooks for circuit breaker state changes

use crate::State;
use std::sync::Arc;

type Hook = Arc<dyn Fn(&str) + Send + Sync>;

/// Callbacks for circuit breaker transitions
///
/// Hooks run after the breaker has released its lock, so a hook may call
/// back into the same breaker.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<Hook>,
    pub on_close: Option<Hook>,
    pub on_half_open: Option<Hook>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the hook registered for entering `state`
    pub fn trigger(&self, state: State, circuit: &str) {
        let hook = match state {
            State::Opened => &self.on_open,
            State::Closed => &self.on_close,
            State::HalfOpened => &self.on_half_open,
        };
        if let Some(callback) = hook {
            callback(circuit);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}
