use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use super::capture::{CaptureDevice, CaptureError, CaptureSource};

/// Collects mono samples into fixed-size frames.
#[derive(Debug)]
pub struct FrameAccumulator {
    frame: Vec<f32>,
    size: usize,
}

impl FrameAccumulator {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            frame: Vec::with_capacity(size),
            size,
        }
    }

    /// Adds a sample, returning the frame once it is full.
    pub fn push(&mut self, sample: f32) -> Option<Vec<f32>> {
        self.frame.push(sample);
        if self.frame.len() >= self.size {
            Some(std::mem::replace(
                &mut self.frame,
                Vec::with_capacity(self.size),
            ))
        } else {
            None
        }
    }

    pub fn pending(&self) -> usize {
        self.frame.len()
    }
}

/// Default input device of the default cpal host.
///
/// The stream is not `Send` on every platform, so it is built, played and
/// dropped on a dedicated thread that lives for the length of the session.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalCapture;

impl CaptureSource for CpalCapture {
    fn open(
        &self,
        buffer_size: usize,
        buffers: mpsc::Sender<Vec<f32>>,
    ) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<u32, CaptureError>>(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let streaming = Arc::new(AtomicBool::new(true));
        let callback_streaming = streaming.clone();

        let thread = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let stream = match open_input_stream(buffer_size, buffers, callback_streaming) {
                    Ok((stream, sample_rate)) => {
                        let _ = ready_tx.send(Ok(sample_rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Returns on close_stream or when the device handle is gone
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Microphone stream dropped");
            })
            .map_err(|e| CaptureError::ThreadError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => Ok(Box::new(CpalDevice {
                sample_rate,
                streaming,
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(e) => {
                let _ = thread.join();
                Err(CaptureError::ThreadError(e.to_string()))
            }
        }
    }
}

struct CpalDevice {
    sample_rate: u32,
    streaming: Arc<AtomicBool>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureDevice for CpalDevice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close_stream(&mut self) {
        self.streaming.store(false, Ordering::SeqCst);
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }

    fn close(&mut self) {
        self.close_stream();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Microphone thread panicked");
            }
            info!("Microphone released");
        }
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_input_stream(
    buffer_size: usize,
    buffers: mpsc::Sender<Vec<f32>>,
    streaming: Arc<AtomicBool>,
) -> Result<(Stream, u32), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::DeviceUnavailable("No input device available".to_string()))?;
    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0;
    info!(
        "Opening microphone {:?}: {} Hz, {} channel(s), {:?}",
        device.name().unwrap_or_default(),
        sample_rate,
        config.channels,
        sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, buffer_size, buffers, streaming)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, buffer_size, buffers, streaming)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, buffer_size, buffers, streaming)?,
        other => {
            return Err(CaptureError::StreamError(format!(
                "Unsupported sample format {:?}",
                other
            )))
        }
    };
    stream
        .play()
        .map_err(|e| CaptureError::StreamError(e.to_string()))?;

    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    buffer_size: usize,
    buffers: mpsc::Sender<Vec<f32>>,
    streaming: Arc<AtomicBool>,
) -> Result<Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = (config.channels as usize).max(1);
    let mut accumulator = FrameAccumulator::new(buffer_size);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !streaming.load(Ordering::SeqCst) {
                    return;
                }
                // First channel only
                for frame in data.chunks(channels) {
                    if let Some(first) = frame.first() {
                        if let Some(full) = accumulator.push(f32::from_sample(*first)) {
                            if buffers.try_send(full).is_err() {
                                trace!("Capture queue full, dropping buffer");
                            }
                        }
                    }
                }
            },
            |err| error!("Microphone stream error: {}", err),
            None,
        )
        .map_err(|e| CaptureError::StreamError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_emits_full_frames() {
        let mut accumulator = FrameAccumulator::new(3);
        assert_eq!(accumulator.push(0.1), None);
        assert_eq!(accumulator.push(0.2), None);
        assert_eq!(accumulator.push(0.3), Some(vec![0.1, 0.2, 0.3]));
        assert_eq!(accumulator.pending(), 0);

        accumulator.push(0.4);
        assert_eq!(accumulator.pending(), 1);
    }

    #[test]
    fn test_accumulator_zero_size_is_one() {
        let mut accumulator = FrameAccumulator::new(0);
        assert_eq!(accumulator.push(0.5), Some(vec![0.5]));
    }
}
