//! Raw device state and the polling seam the sampler reads from.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// One device's buttons and axes at a point in time.
///
/// Button and axis order follows the standard gamepad layout the poller
/// publishes; mappings refer to positions in these arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDeviceState {
    pub buttons: Vec<bool>,
    pub axes: Vec<f32>,
}

/// A connected device as seen by one poll
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub id: String,
    pub name: String,
    pub state: RawDeviceState,
}

/// Source of per-tick device snapshots.
///
/// `poll` must return immediately; it is called from the sampler tick.
pub trait DevicePoller: Send + Sync {
    fn poll(&self) -> Vec<DeviceState>;

    /// Looks up the device with `id` in a fresh poll.
    fn poll_device(&self, id: &str) -> Option<DeviceState> {
        self.poll().into_iter().find(|device| device.id == id)
    }
}

/// Poller returning whatever was last stored in it.
#[derive(Debug, Clone, Default)]
pub struct StaticPoller {
    devices: Arc<Mutex<Vec<DeviceState>>>,
}

impl StaticPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_devices(&self, devices: Vec<DeviceState>) {
        if let Ok(mut guard) = self.devices.lock() {
            *guard = devices;
        }
    }

    pub fn set_state(&self, id: &str, state: RawDeviceState) {
        if let Ok(mut guard) = self.devices.lock() {
            match guard.iter_mut().find(|device| device.id == id) {
                Some(device) => device.state = state,
                None => guard.push(DeviceState {
                    id: id.to_string(),
                    name: format!("static-{}", id),
                    state,
                }),
            }
        }
    }

    pub fn remove(&self, id: &str) {
        if let Ok(mut guard) = self.devices.lock() {
            guard.retain(|device| device.id != id);
        }
    }
}

impl DevicePoller for StaticPoller {
    fn poll(&self) -> Vec<DeviceState> {
        self.devices
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_poller_selects_by_id() {
        let poller = StaticPoller::new();
        poller.set_state(
            "0",
            RawDeviceState {
                buttons: vec![true],
                axes: vec![],
            },
        );
        poller.set_state("1", RawDeviceState::default());

        assert_eq!(poller.poll().len(), 2);
        assert_eq!(
            poller.poll_device("0").map(|d| d.state.buttons),
            Some(vec![true])
        );
        poller.remove("0");
        assert!(poller.poll_device("0").is_none());
    }
}
