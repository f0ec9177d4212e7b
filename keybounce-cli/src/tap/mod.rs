//! Global keyboard event taps.
//!
//! - macOS: Quartz event tap via `core-graphics`. Needs root or the
//!   Accessibility permission.
//! - Linux: evdev grab plus a uinput re-emitter. Needs root or membership
//!   of the `input` group, and write access to `/dev/uinput`.
//!
//! Each backend samples a monotonic clock on arrival, hands the key-down to
//! a [`KeyHandler`], and on [`Decision::Suppress`](keybounce_filter::Decision)
//! replaces the event with one carrying an invalid key code. The replacement
//! is still delivered so the tap stays healthy.

use std::path::PathBuf;
use std::time::Instant;

use keybounce_filter::Timestamp;
use thiserror::Error;

use crate::handler::KeyHandler;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
mod linux;

#[derive(Debug, Error)]
pub enum TapError {
    #[error("failed to create event tap (run as root or grant Accessibility access to this binary)")]
    CreateTap,
    #[error("failed to create run loop source for event tap")]
    RunLoopSource,
    #[error("no keyboard found under /dev/input (pass --device, and check you are in the `input` group)")]
    NoKeyboard,
    #[error("{path}: {source}")]
    Device {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("global key event taps are not supported on this platform")]
    Unsupported,
}

/// Options the platform backends may use.
#[derive(Debug, Default, Clone)]
pub struct TapOptions {
    /// Input device to grab (Linux). Autodetected when `None`.
    pub device: Option<PathBuf>,
}

/// Monotonic clock anchored at tap start.
#[cfg_attr(not(any(target_os = "macos", target_os = "linux")), allow(dead_code))]
pub(crate) struct Clock {
    origin: Instant,
}

#[cfg_attr(not(any(target_os = "macos", target_os = "linux")), allow(dead_code))]
impl Clock {
    pub(crate) fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub(crate) fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.origin.elapsed())
    }
}

/// Install the tap and deliver events to `handler` until the process is
/// killed or the event source goes away.
#[cfg(target_os = "macos")]
pub fn run<H: KeyHandler>(handler: H, _options: &TapOptions) -> Result<(), TapError> {
    macos::run(handler)
}

#[cfg(target_os = "linux")]
pub fn run<H: KeyHandler>(handler: H, options: &TapOptions) -> Result<(), TapError> {
    linux::run(handler, options)
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub fn run<H: KeyHandler>(_handler: H, _options: &TapOptions) -> Result<(), TapError> {
    Err(TapError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = Clock::start();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_error_messages() {
        let err = TapError::Device {
            path: PathBuf::from("/dev/input/event9"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("/dev/input/event9: "));
        assert!(TapError::CreateTap.to_string().contains("Accessibility"));
    }
}
