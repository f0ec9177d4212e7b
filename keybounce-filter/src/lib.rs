//! Single-key bounce suppression.
//!
//! A worn switch can report one physical press as two key-down events a few
//! milliseconds apart. The filter in this crate watches one target key and
//! suppresses any press of it that follows an accepted press of the same key
//! within a short window. Every other key passes.
//!
//! This crate is `no_std` and allocation-free so it can sit inline in the
//! event path of any host adapter.

#![cfg_attr(not(test), no_std)]

use core::time::Duration;

/// Platform key identifier (macOS `CGKeyCode`, Linux evdev key code).
pub type Keycode = u16;

/// Default debounce window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(200);

/// A point on a monotonic clock, in microseconds since an adapter-chosen origin.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The clock origin, usually process start.
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis.saturating_mul(1000))
    }

    /// Offset from the origin. Saturates past ~584k years.
    pub fn from_duration(since_origin: Duration) -> Self {
        Timestamp(u64::try_from(since_origin.as_micros()).unwrap_or(u64::MAX))
    }

    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Signed microseconds from `earlier` to `self`. Negative if the clock
    /// stepped backwards.
    pub fn micros_since(self, earlier: Timestamp) -> i128 {
        self.0 as i128 - earlier.0 as i128
    }
}

/// One key-down occurrence.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KeyObservation {
    pub keycode: Keycode,
    pub timestamp: Timestamp,
}

impl KeyObservation {
    pub const fn new(keycode: Keycode, timestamp: Timestamp) -> Self {
        Self { keycode, timestamp }
    }
}

/// What the adapter should do with an observed event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Deliver the event unchanged.
    Pass,
    /// Deliver a no-op in place of the event.
    Suppress,
}

impl Decision {
    pub fn is_suppress(self) -> bool {
        self == Decision::Suppress
    }
}

/// Fixed filter parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FilterConfig {
    /// The one key subject to suppression.
    pub target_keycode: Keycode,
    /// Maximum gap (inclusive) for a repeat press to count as a bounce.
    pub window: Duration,
}

impl FilterConfig {
    /// Config for `target_keycode` with the default 200 ms window.
    pub const fn new(target_keycode: Keycode) -> Self {
        Self {
            target_keycode,
            window: DEFAULT_WINDOW,
        }
    }

    pub const fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    fn window_micros(&self) -> i128 {
        i128::try_from(self.window.as_micros()).unwrap_or(i128::MAX)
    }
}

/// The last accepted observation.
///
/// Only [`decide`] writes to it, and it takes `&mut`, so one caller at a time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct FilterState {
    /// `None` until the first observation is accepted.
    last_keycode: Option<Keycode>,
    last_timestamp: Timestamp,
}

impl FilterState {
    /// Fresh state: no prior key, reference time at the clock origin.
    pub const fn new() -> Self {
        Self {
            last_keycode: None,
            last_timestamp: Timestamp::ZERO,
        }
    }

    pub fn last_keycode(&self) -> Option<Keycode> {
        self.last_keycode
    }

    pub fn last_timestamp(&self) -> Timestamp {
        self.last_timestamp
    }
}

/// Classify one key-down observation.
///
/// A press is a bounce when it is the target key, the last accepted press was
/// also the target key, and no more than `config.window` has elapsed since
/// that accepted press. Bounces leave `state` untouched, so elapsed time is
/// always measured from the last accepted press and a burst of duplicates is
/// suppressed as a whole. Anything else is accepted and becomes the new
/// reference point.
pub fn decide(
    observation: KeyObservation,
    config: &FilterConfig,
    state: &mut FilterState,
) -> Decision {
    let elapsed = observation.timestamp.micros_since(state.last_timestamp);

    let bounce = observation.keycode == config.target_keycode
        && state.last_keycode == Some(config.target_keycode)
        && elapsed <= config.window_micros();

    if bounce {
        return Decision::Suppress;
    }

    state.last_keycode = Some(observation.keycode);
    state.last_timestamp = observation.timestamp;
    Decision::Pass
}

/// A filter config and its state, owned together.
#[derive(Clone, Debug)]
pub struct Debouncer {
    config: FilterConfig,
    state: FilterState,
}

impl Debouncer {
    pub const fn new(config: FilterConfig) -> Self {
        Self {
            config,
            state: FilterState::new(),
        }
    }

    pub fn decide(&mut self, observation: KeyObservation) -> Decision {
        decide(observation, &self.config, &mut self.state)
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Forget the last accepted press.
    pub fn reset(&mut self) {
        self.state = FilterState::new();
    }
}
