//! What the event tap calls for every key-down.

use keybounce_filter::{Debouncer, Decision, FilterConfig, KeyObservation};
use tracing::{debug, info};

/// Called synchronously by the tap, once per key-down, in arrival order.
/// Must not block: it runs inline with every keystroke.
pub trait KeyHandler {
    fn on_key_down(&mut self, observation: KeyObservation) -> Decision;
}

/// Runs observations through a [`Debouncer`] and counts the outcomes.
pub struct FilterHandler {
    debouncer: Debouncer,
    passed: u64,
    suppressed: u64,
}

impl FilterHandler {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            debouncer: Debouncer::new(config),
            passed: 0,
            suppressed: 0,
        }
    }

    pub fn passed(&self) -> u64 {
        self.passed
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

impl KeyHandler for FilterHandler {
    fn on_key_down(&mut self, observation: KeyObservation) -> Decision {
        let last = self.debouncer.state().last_timestamp();
        let decision = self.debouncer.decide(observation);
        match decision {
            Decision::Pass => self.passed += 1,
            Decision::Suppress => {
                self.suppressed += 1;
                debug!(
                    keycode = observation.keycode,
                    after_us = observation.timestamp.micros_since(last) as i64,
                    total = self.suppressed,
                    "suppressed bounce"
                );
            }
        }
        decision
    }
}

impl Drop for FilterHandler {
    fn drop(&mut self) {
        info!(
            keycode = self.debouncer.config().target_keycode,
            passed = self.passed,
            suppressed = self.suppressed,
            "filter stopped"
        );
    }
}

/// Logs every key-down and lets it through.
#[derive(Default)]
pub struct KeyLogger {
    last: Option<KeyObservation>,
}

impl KeyHandler for KeyLogger {
    fn on_key_down(&mut self, observation: KeyObservation) -> Decision {
        let since_last_ms = self
            .last
            .map(|prev| observation.timestamp.micros_since(prev.timestamp) as f64 / 1000.0);
        match since_last_ms {
            Some(ms) => info!(keycode = observation.keycode, "key down ({:.1} ms since previous)", ms),
            None => info!(keycode = observation.keycode, "key down"),
        }
        self.last = Some(observation);
        Decision::Pass
    }
}
