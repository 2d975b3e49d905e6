use crate::controller::device::{DevicePoller, DeviceState, RawDeviceState};
use chrono::Local;
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

// Standard gamepad button order; mapping indices point into this list
const BUTTON_ORDER: [Button; 17] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
    Button::Mode,
];

const AXIS_ORDER: [Axis; 4] = [
    Axis::LeftStickX,
    Axis::LeftStickY,
    Axis::RightStickX,
    Axis::RightStickY,
];

// Poller settings
#[derive(Clone, Debug)]
pub struct PollerSettings {
    pub poll_interval_ms: u64,
    pub joystick_deadzone: f32,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 4,
            joystick_deadzone: 0.05,
        }
    }
}

// Poller errors
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error("Failed to initialize gamepad backend: {0}")]
    InitializationError(String),

    #[error("Poller thread error: {0}")]
    ThreadError(String),
}

/// Gamepad poller backed by gilrs.
///
/// The gilrs context lives on its own thread, pumps events and publishes the
/// full state of every connected pad through a watch channel. `poll` only
/// clones the latest published value.
pub struct GilrsPoller {
    devices: watch::Receiver<Vec<DeviceState>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl GilrsPoller {
    pub fn spawn(settings: Option<PollerSettings>) -> Result<Self, PollerError> {
        let settings = settings.unwrap_or_default();
        info!("Spawning gilrs poller with settings: {:?}", settings);

        let (device_tx, device_rx) = watch::channel(Vec::new());
        let (init_tx, init_rx) = std_mpsc::sync_channel::<Result<(), String>>(1);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let handle = std::thread::Builder::new()
            .name("gilrs-poller".to_string())
            .spawn(move || {
                let gilrs = match Gilrs::new() {
                    Ok(g) => {
                        info!("Successfully initialized gilrs");
                        let _ = init_tx.send(Ok(()));
                        g
                    }
                    Err(e) => {
                        error!("Failed to initialize gilrs: {}", e);
                        let _ = init_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                run_poll_loop(gilrs, settings, device_tx, thread_running);
            })
            .map_err(|e| PollerError::ThreadError(e.to_string()))?;

        match init_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(PollerError::InitializationError(e));
            }
            Err(e) => {
                let _ = handle.join();
                return Err(PollerError::ThreadError(e.to_string()));
            }
        }

        Ok(Self {
            devices: device_rx,
            running,
            thread: Mutex::new(Some(handle)),
        })
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(e) => {
                warn!("Poller thread handle poisoned: {}", e);
                None
            }
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Gilrs poller thread panicked");
            } else {
                info!("Gilrs poller stopped");
            }
        }
    }
}

impl DevicePoller for GilrsPoller {
    fn poll(&self) -> Vec<DeviceState> {
        self.devices.borrow().clone()
    }
}

impl Drop for GilrsPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_poll_loop(
    mut gilrs: Gilrs,
    settings: PollerSettings,
    device_tx: watch::Sender<Vec<DeviceState>>,
    running: Arc<AtomicBool>,
) {
    info!("Starting gilrs poll loop");
    log_gamepads(&gilrs);

    let mut event_count = 0u64;
    let mut last_log_time = Local::now();
    let log_interval = chrono::Duration::seconds(30);

    while running.load(Ordering::SeqCst) {
        // Drain pending events so gilrs updates its cached pad state
        while let Some(Event { id, event, .. }) = gilrs.next_event() {
            event_count += 1;
            match event {
                EventType::Connected => info!("Gamepad {} connected", id),
                EventType::Disconnected => warn!("Gamepad {} disconnected", id),
                _ => debug!("Gamepad {} event: {:?}", id, event),
            }
        }

        let states: Vec<DeviceState> = gilrs
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .map(|(id, gamepad)| read_gamepad(id, &gamepad, settings.joystick_deadzone))
            .collect();
        device_tx.send_replace(states);

        let now = Local::now();
        if now - last_log_time > log_interval {
            info!(
                "Gilrs poller stats: {} events in last {} seconds",
                event_count,
                log_interval.num_seconds()
            );
            event_count = 0;
            last_log_time = now;
        }

        std::thread::sleep(Duration::from_millis(settings.poll_interval_ms));
    }
    info!("Gilrs poll loop finished");
}

fn log_gamepads(gilrs: &Gilrs) {
    let gamepads: Vec<(GamepadId, Gamepad<'_>)> = gilrs.gamepads().collect();
    if gamepads.is_empty() {
        warn!("No gamepad connected, polling in idle mode");
        return;
    }
    info!("Found {} gamepads:", gamepads.len());
    for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
        info!(
            "  [{}] ID: {}, Name: {}, UUID: {:?}",
            idx,
            id,
            gamepad.name(),
            gamepad.uuid()
        );
    }
}

fn read_gamepad(id: GamepadId, gamepad: &Gamepad<'_>, deadzone: f32) -> DeviceState {
    let buttons = BUTTON_ORDER
        .iter()
        .map(|button| gamepad.is_pressed(*button))
        .collect();
    let axes = AXIS_ORDER
        .iter()
        .map(|axis| apply_deadzone(gamepad.value(*axis), deadzone))
        .collect();

    DeviceState {
        id: id.to_string(),
        name: gamepad.name().to_string(),
        state: RawDeviceState { buttons, axes },
    }
}

// Rescales the value to the range outside the deadzone
fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadzone_zeroes_small_values() {
        assert_eq!(apply_deadzone(0.04, 0.05), 0.0);
        assert_eq!(apply_deadzone(-0.04, 0.05), 0.0);
    }

    #[test]
    fn test_deadzone_rescales_to_full_range() {
        assert!((apply_deadzone(1.0, 0.05) - 1.0).abs() < 1e-6);
        assert!((apply_deadzone(-1.0, 0.05) + 1.0).abs() < 1e-6);
        assert!((apply_deadzone(0.525, 0.05) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_layout_covers_standard_pad() {
        assert_eq!(BUTTON_ORDER[0], Button::South);
        assert_eq!(BUTTON_ORDER[12], Button::DPadUp);
        assert_eq!(AXIS_ORDER.len(), 4);
    }
}
