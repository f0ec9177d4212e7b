//! evdev grab backend.
//!
//! The physical keyboard is grabbed so nothing else sees its events, and a
//! uinput device advertising the same keys re-emits them frame by frame.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{Device, EventType, InputEvent, Key};
use keybounce_filter::{Decision, KeyObservation};
use tracing::{debug, info};

use super::{Clock, TapError, TapOptions};
use crate::handler::KeyHandler;

const VIRTUAL_NAME: &str = "keybounce virtual keyboard";

/// `EV_KEY` value for a press (0 is release, 2 autorepeat).
const KEY_DOWN: i32 = 1;

/// Poll interval while waiting for held keys to be released before grabbing.
const RELEASE_POLL: Duration = Duration::from_millis(10);

pub fn run<H: KeyHandler>(mut handler: H, options: &TapOptions) -> Result<(), TapError> {
    let (path, mut device) = match &options.device {
        Some(path) => (path.clone(), open(path)?),
        None => find_keyboard()?,
    };

    let mut output = create_virtual(&device)?;

    // Grabbing while a key is down would leave it stuck for everything
    // downstream, since its release would only reach the virtual device.
    wait_for_release(&device, &path)?;
    device
        .grab()
        .map_err(|source| TapError::Device { path: path.clone(), source })?;

    info!(
        device = %path.display(),
        name = device.name().unwrap_or("unnamed"),
        "grabbed keyboard"
    );

    let clock = Clock::start();
    let mut frame: Vec<InputEvent> = Vec::with_capacity(16);
    loop {
        let events = device
            .fetch_events()
            .map_err(|source| TapError::Device { path: path.clone(), source })?;
        for event in events {
            if event.event_type() == EventType::SYNCHRONIZATION {
                // `emit` terminates each batch with its own SYN_REPORT.
                if !frame.is_empty() {
                    output.emit(&frame)?;
                    frame.clear();
                }
                continue;
            }
            frame.push(filter_event(event, &mut handler, &clock));
        }
    }
}

/// Run one input event through the handler.
fn filter_event<H: KeyHandler>(event: InputEvent, handler: &mut H, clock: &Clock) -> InputEvent {
    if event.event_type() != EventType::KEY || event.value() != KEY_DOWN {
        return event;
    }

    let observation = KeyObservation::new(event.code(), clock.now());
    match handler.on_key_down(observation) {
        Decision::Pass => event,
        // KEY_RESERVED is never advertised by the virtual device, so the
        // kernel discards the event.
        Decision::Suppress => InputEvent::new(EventType::KEY, Key::KEY_RESERVED.code(), event.value()),
    }
}

fn open(path: &Path) -> Result<Device, TapError> {
    Device::open(path).map_err(|source| TapError::Device {
        path: path.to_path_buf(),
        source,
    })
}

fn is_keyboard(device: &Device) -> bool {
    if device.name() == Some(VIRTUAL_NAME) {
        return false;
    }
    device
        .supported_keys()
        .map_or(false, |keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_ENTER))
}

/// First `/dev/input/event*` device that looks like a full keyboard.
fn find_keyboard() -> Result<(PathBuf, Device), TapError> {
    for (path, device) in evdev::enumerate() {
        if is_keyboard(&device) {
            debug!(device = %path.display(), "autodetected keyboard");
            return Ok((path, device));
        }
    }
    Err(TapError::NoKeyboard)
}

fn create_virtual(device: &Device) -> Result<VirtualDevice, TapError> {
    let keys = device.supported_keys().ok_or(TapError::NoKeyboard)?;
    let virtual_device = VirtualDeviceBuilder::new()?
        .name(VIRTUAL_NAME)
        .with_keys(keys)?
        .build()?;
    Ok(virtual_device)
}

fn wait_for_release(device: &Device, path: &Path) -> Result<(), TapError> {
    loop {
        let held = device.get_key_state().map_err(|source| TapError::Device {
            path: path.to_path_buf(),
            source,
        })?;
        if held.iter().next().is_none() {
            return Ok(());
        }
        thread::sleep(RELEASE_POLL);
    }
}
