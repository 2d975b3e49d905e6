//! Controller subsystem for gamepad input handling
//!
//! 1. [`device`] - Raw device state and the polling seam
//! 2. [`gilrs_poller`] - Hardware polling thread backed by gilrs
//! 3. [`sampler`] - Fixed-rate sampling loop producing snapshots
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► GilrsPoller ──► GamepadSampler ──► Emitter
//!             (watch)          (50 ms ticks)
//! ```

pub mod device;
pub mod gilrs_poller;
pub mod sampler;

pub use device::{DevicePoller, DeviceState, RawDeviceState, StaticPoller};
pub use gilrs_poller::{GilrsPoller, PollerError, PollerSettings};
pub use sampler::{
    EdgeDetector, GamepadSampler, SamplerControls, SamplerHandle, SamplerMode, SamplerSettings,
    SamplerUpdates, TickStats,
};
