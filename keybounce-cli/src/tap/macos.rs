//! Quartz event tap backend.

use std::cell::{OnceCell, RefCell};

use core_foundation::base::TCFType;
use core_foundation::mach_port::{CFMachPort, CFMachPortRef};
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventTapProxy, CGEventType, EventField,
};
use keybounce_filter::{KeyObservation, Keycode};
use tracing::{info, warn};

use super::{Clock, TapError};
use crate::handler::KeyHandler;

/// Written over the keycode field of a suppressed event. No key maps to it.
const INVALID_KEYCODE: i64 = -1;

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
}

/// What the callback does with an event of a given type.
#[derive(Debug, PartialEq, Eq)]
enum TapAction {
    Filter,
    /// Quartz turned the tap off. It stays off until re-enabled.
    Reenable,
    Ignore,
}

fn classify(event_type: CGEventType) -> TapAction {
    match event_type {
        CGEventType::KeyDown => TapAction::Filter,
        CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
            TapAction::Reenable
        }
        _ => TapAction::Ignore,
    }
}

fn enable_port(port: &CFMachPort) {
    unsafe { CGEventTapEnable(port.as_concrete_TypeRef(), true) };
}

pub fn run<H: KeyHandler>(handler: H) -> Result<(), TapError> {
    let clock = Clock::start();
    // The tap callback is `Fn`. Quartz delivers on this thread only, one
    // event at a time, so the borrow never overlaps.
    let handler = RefCell::new(handler);
    // Filled in once the tap exists; the callback needs it to re-enable.
    let port: OnceCell<CFMachPort> = OnceCell::new();

    let tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::Default,
        vec![CGEventType::KeyDown],
        |_proxy: CGEventTapProxy, event_type: CGEventType, event: &CGEvent| {
            match classify(event_type) {
                TapAction::Filter => {}
                TapAction::Reenable => {
                    warn!("event tap disabled by the system ({:?}), re-enabling", event_type);
                    if let Some(port) = port.get() {
                        enable_port(port);
                    }
                    return None;
                }
                TapAction::Ignore => return None,
            }

            let timestamp = clock.now();
            let raw = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
            let Ok(keycode) = Keycode::try_from(raw) else {
                return None;
            };

            let decision = handler
                .borrow_mut()
                .on_key_down(KeyObservation::new(keycode, timestamp));
            if decision.is_suppress() {
                event.set_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE, INVALID_KEYCODE);
            }
            // `None` hands the original (possibly rewritten) event back to Quartz.
            None
        },
    )
    .map_err(|()| TapError::CreateTap)?;

    let _ = port.set(tap.mach_port.clone());

    let source = tap
        .mach_port
        .create_runloop_source(0)
        .map_err(|()| TapError::RunLoopSource)?;
    let run_loop = CFRunLoop::get_current();
    run_loop.add_source(&source, unsafe { kCFRunLoopCommonModes });
    tap.enable();

    info!("event tap installed");
    CFRunLoop::run_current();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_tap_is_reenabled() {
        assert_eq!(classify(CGEventType::TapDisabledByTimeout), TapAction::Reenable);
        assert_eq!(classify(CGEventType::TapDisabledByUserInput), TapAction::Reenable);
    }

    #[test]
    fn test_only_key_down_is_filtered() {
        assert_eq!(classify(CGEventType::KeyDown), TapAction::Filter);
        assert_eq!(classify(CGEventType::KeyUp), TapAction::Ignore);
        assert_eq!(classify(CGEventType::FlagsChanged), TapAction::Ignore);
    }
}
