//! Trigger sounds played locally when the trigger action fires.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SoundError {
    #[error("Invalid sound name: {0:?}")]
    InvalidName(String),

    #[error("Failed to decode sound: {0}")]
    Decode(#[from] hound::Error),

    #[error("No output device available")]
    NoDevice,

    #[error("Output stream error: {0}")]
    Stream(String),
}

pub trait SoundPlayer: Send + Sync {
    /// Starts playing `sound` without waiting for it to finish.
    fn play(&self, sound: &str);
}

/// Mono samples decoded from a WAV file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSound {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedSound {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Plays `<dir>/<name>.wav` on the default output device.
#[derive(Debug, Clone)]
pub struct WavSoundBoard {
    dir: PathBuf,
}

impl WavSoundBoard {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn sound_path(&self, sound: &str) -> Result<PathBuf, SoundError> {
        if sound.is_empty() || sound.contains(['/', '\\']) || sound.contains("..") {
            return Err(SoundError::InvalidName(sound.to_string()));
        }
        Ok(self.dir.join(format!("{}.wav", sound)))
    }

    /// Names of the `.wav` files in the sound directory.
    pub fn available(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "wav"))
            .filter_map(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }
}

impl SoundPlayer for WavSoundBoard {
    fn play(&self, sound: &str) {
        let path = match self.sound_path(sound) {
            Ok(path) => path,
            Err(e) => {
                warn!("Not playing trigger sound: {}", e);
                return;
            }
        };
        let spawned = std::thread::Builder::new()
            .name("trigger-sound".to_string())
            .spawn(move || {
                if let Err(e) = decode_wav(&path).and_then(|sound| play_blocking(&sound)) {
                    warn!("Failed to play {:?}: {}", path, e);
                }
            });
        if let Err(e) = spawned {
            warn!("Failed to spawn sound thread: {}", e);
        }
    }
}

pub fn decode_wav(path: &Path) -> Result<DecodedSound, SoundError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = (spec.channels as usize).max(1);
    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok(DecodedSound {
        samples,
        sample_rate: spec.sample_rate,
    })
}

fn play_blocking(sound: &DecodedSound) -> Result<(), SoundError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(SoundError::NoDevice)?;
    let supported = device
        .default_output_config()
        .map_err(|e| SoundError::Stream(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    let samples = Arc::new(sound.samples.clone());
    // Nearest-sample stepping from the file rate to the device rate
    let step = sound.sample_rate as f64 / config.sample_rate.0.max(1) as f64;

    let stream = match sample_format {
        SampleFormat::F32 => build_output::<f32>(&device, &config, samples, step)?,
        SampleFormat::I16 => build_output::<i16>(&device, &config, samples, step)?,
        SampleFormat::U16 => build_output::<u16>(&device, &config, samples, step)?,
        other => return Err(SoundError::Stream(format!("Unsupported sample format {:?}", other))),
    };
    stream.play().map_err(|e| SoundError::Stream(e.to_string()))?;
    debug!("Playing trigger sound for {:?}", sound.duration());

    std::thread::sleep(sound.duration() + Duration::from_millis(100));
    Ok(())
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    samples: Arc<Vec<f32>>,
    step: f64,
) -> Result<cpal::Stream, SoundError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = (config.channels as usize).max(1);
    let mut position = 0.0f64;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(position as usize).copied().unwrap_or(0.0);
                    position += step;
                    for channel_sample in frame.iter_mut() {
                        *channel_sample = T::from_sample(sample);
                    }
                }
            },
            |err| warn!("Sound output stream error: {}", err),
            None,
        )
        .map_err(|e| SoundError::Stream(e.to_string()))
}

/// Records requested sounds instead of playing them.
#[derive(Debug, Default)]
pub struct RecordingSoundPlayer {
    played: Mutex<Vec<String>>,
    plays: AtomicUsize,
}

impl RecordingSoundPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

impl SoundPlayer for RecordingSoundPlayer {
    fn play(&self, sound: &str) {
        info!("Trigger sound requested: {}", sound);
        self.plays.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut played) = self.played.lock() {
            played.push(sound.to_string());
        }
    }
}
