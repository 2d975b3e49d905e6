//! # Audio
//!
//! Microphone capture for the talk channel and local playback of trigger
//! sounds.
//!
//! ```text
//! CaptureSource ──► Vec<f32> buffers ──► downsample ──► Emitter (audio)
//! ```

pub mod capture;
pub mod cpal_source;
pub mod downsample;
pub mod sound;

pub use capture::{
    CaptureDevice, CaptureError, CaptureHandle, CaptureSettings, CaptureSource, ScriptedCapture,
};
pub use cpal_source::{CpalCapture, FrameAccumulator};
pub use downsample::{downsample, DownsampleError};
pub use sound::{RecordingSoundPlayer, SoundPlayer, WavSoundBoard};
