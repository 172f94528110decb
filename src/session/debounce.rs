//! Leading-edge debounce

use std::time::{Duration, Instant};

/// Leading-edge debounce: the first call fires, and later calls only fire
/// once `window` has passed since the previous call. Every call, fired or
/// not, restarts the window.
#[derive(Debug, Clone)]
pub(crate) struct LeadingDebounce {
    window: Duration,
    last_call: Option<Instant>,
}

impl LeadingDebounce {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            last_call: None,
        }
    }

    /// Record a call at `now`; returns whether it fires
    pub(crate) fn ready(&mut self, now: Instant) -> bool {
        let fire = match self.last_call {
            Some(last) => now.saturating_duration_since(last) >= self.window,
            None => true,
        };
        self.last_call = Some(now);
        fire
    }
}
