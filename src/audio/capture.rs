//! Microphone capture loop.
//!
//! A session acquires the capture device, spawns a forwarder task that
//! downsamples every buffer and hands it to the emitter, and releases
//! everything again on stop.
//!
//! # State Machine
//!
//! ```text
//! Acquiring ──► Streaming ──► Released
//!     │
//!     └── acquisition failure: nothing held, error returned
//! ```
//!
//! Resources are released in a fixed order: microphone stream, forwarder
//! task, device context. Each step is skipped if already released.

use crate::audio::downsample::{downsample, DownsampleError};
use crate::link::{AudioBlock, Emitter, OutboundMessage};
use statum::{machine, state};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// Capture errors
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Failed to open capture stream: {0}")]
    StreamError(String),

    #[error("Link is not connected")]
    LinkUnavailable,

    #[error("Invalid sample rates: {0}")]
    Rates(#[from] DownsampleError),

    #[error("Capture thread error: {0}")]
    ThreadError(String),
}

/// An opened capture device.
pub trait CaptureDevice: Send {
    fn sample_rate(&self) -> u32;

    /// Stops buffer delivery. Safe to call more than once.
    fn close_stream(&mut self);

    /// Releases the device context. Safe to call more than once.
    fn close(&mut self);
}

/// Opens capture devices that push fixed-size buffers into `buffers`.
pub trait CaptureSource: Send + Sync {
    fn open(
        &self,
        buffer_size: usize,
        buffers: mpsc::Sender<Vec<f32>>,
    ) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub target_sample_rate: u32,
    pub buffer_size: usize,
    pub channel_capacity: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            buffer_size: 4096,
            channel_capacity: 8,
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum CaptureState {
    Acquiring,
    Streaming,
    Released,
}

#[machine]
pub struct CaptureSession<S: CaptureState> {
    settings: CaptureSettings,
    active: Arc<AtomicBool>,
    microphone: Option<Box<dyn CaptureDevice>>,
    processor: Option<JoinHandle<()>>,
}

impl<S: CaptureState> CaptureSession<S> {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn release_resources(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(microphone) = self.microphone.as_mut() {
            debug!("Closing microphone stream");
            microphone.close_stream();
        }
        if let Some(processor) = self.processor.take() {
            debug!("Stopping capture forwarder");
            processor.abort();
        }
        if let Some(mut microphone) = self.microphone.take() {
            debug!("Releasing capture device");
            microphone.close();
        }
    }
}

impl CaptureSession<Acquiring> {
    pub fn create(settings: CaptureSettings) -> Self {
        debug!("Creating capture session with settings: {:?}", settings);
        Self::new(settings, Arc::new(AtomicBool::new(false)), None, None)
    }

    /// Opens the device and starts forwarding. On failure every resource
    /// acquired so far is released again.
    pub fn acquire(
        mut self,
        source: &dyn CaptureSource,
        emitter: Emitter,
    ) -> Result<CaptureSession<Streaming>, CaptureError> {
        let (buffer_tx, buffer_rx) = mpsc::channel(self.settings.channel_capacity.max(1));

        let microphone = source.open(self.settings.buffer_size, buffer_tx)?;
        let source_rate = microphone.sample_rate();
        let target_rate = self.settings.target_sample_rate;
        self.microphone = Some(microphone);

        if source_rate == 0 || target_rate == 0 {
            self.release_resources();
            return Err(CaptureError::Rates(DownsampleError::ZeroRate));
        }
        if target_rate > source_rate {
            self.release_resources();
            return Err(CaptureError::Rates(DownsampleError::Upsampling {
                source_rate,
                target_rate,
            }));
        }

        self.active.store(true, Ordering::SeqCst);
        self.processor = Some(tokio::spawn(forward_buffers(
            buffer_rx,
            self.active.clone(),
            emitter,
            source_rate,
            target_rate,
        )));

        info!(
            "Capture streaming: {} Hz -> {} Hz, {} samples per buffer",
            source_rate, target_rate, self.settings.buffer_size
        );
        Ok(self.transition())
    }
}

impl CaptureSession<Streaming> {
    pub fn release(mut self) -> CaptureSession<Released> {
        self.release_resources();
        info!("Capture session released");
        self.transition()
    }
}

impl CaptureSession<Released> {
    pub fn holds_resources(&self) -> bool {
        self.microphone.is_some() || self.processor.is_some()
    }
}

async fn forward_buffers(
    mut buffers: mpsc::Receiver<Vec<f32>>,
    active: Arc<AtomicBool>,
    emitter: Emitter,
    source_rate: u32,
    target_rate: u32,
) {
    let mut forwarded = 0u64;
    while let Some(buffer) = buffers.recv().await {
        if !active.load(Ordering::SeqCst) {
            debug!("Capture inactive, ignoring buffer");
            break;
        }
        match downsample(&buffer, source_rate, target_rate) {
            Ok(samples) => {
                let block = AudioBlock {
                    samples,
                    sample_rate: target_rate,
                };
                if emitter.emit(OutboundMessage::Audio(block)) {
                    forwarded += 1;
                }
            }
            Err(e) => {
                error!("Downsampling failed, stopping capture: {}", e);
                active.store(false, Ordering::SeqCst);
                break;
            }
        }
    }
    debug!("Capture forwarder finished after {} blocks", forwarded);
}

/// Talk toggle owning at most one streaming session.
pub struct CaptureHandle {
    source: Arc<dyn CaptureSource>,
    emitter: Emitter,
    settings: CaptureSettings,
    session: Option<CaptureSession<Streaming>>,
}

impl CaptureHandle {
    pub fn new(source: Arc<dyn CaptureSource>, emitter: Emitter, settings: CaptureSettings) -> Self {
        Self {
            source,
            emitter,
            settings,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.is_active())
            .unwrap_or(false)
    }

    /// Starts transmitting. A no-op while a session is already active.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.is_active() {
            debug!("Capture already active, ignoring start");
            return Ok(());
        }
        // A session that stopped itself still holds its device
        self.stop();

        if !self.emitter.is_connected() {
            warn!("Not starting capture: link is not connected");
            return Err(CaptureError::LinkUnavailable);
        }

        let session = CaptureSession::create(self.settings.clone())
            .acquire(self.source.as_ref(), self.emitter.clone())
            .map_err(|e| {
                error!("Failed to start capture: {}", e);
                e
            })?;
        self.session = Some(session);
        Ok(())
    }

    /// Stops transmitting and releases the device. Safe to call repeatedly.
    pub fn stop(&mut self) {
        match self.session.take() {
            Some(session) => {
                let released = session.release();
                debug!("Capture resources held after release: {}", released.holds_resources());
            }
            None => debug!("Capture already stopped"),
        }
    }

    /// Flips the talk toggle; returns the new state.
    pub fn toggle(&mut self) -> Result<bool, CaptureError> {
        if self.is_active() {
            self.stop();
            Ok(false)
        } else {
            self.start()?;
            Ok(true)
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Capture source fed by hand, recording how its devices are released.
#[derive(Clone, Default)]
pub struct ScriptedCapture {
    sample_rate: u32,
    fail_open: bool,
    sender: Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>,
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl ScriptedCapture {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    /// A source whose `open` always fails, like a denied microphone.
    pub fn unavailable() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Delivers one buffer; false if no stream is open or the queue is full.
    pub fn push(&self, buffer: Vec<f32>) -> bool {
        match self.sender.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|sender| sender.try_send(buffer).is_ok())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl CaptureSource for ScriptedCapture {
    fn open(
        &self,
        _buffer_size: usize,
        buffers: mpsc::Sender<Vec<f32>>,
    ) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        if self.fail_open {
            return Err(CaptureError::DeviceUnavailable(
                "microphone permission denied".to_string(),
            ));
        }
        if let Ok(mut guard) = self.sender.lock() {
            *guard = Some(buffers);
        }
        if let Ok(mut events) = self.events.lock() {
            events.push("open");
        }
        Ok(Box::new(ScriptedDevice {
            sample_rate: self.sample_rate,
            sender: self.sender.clone(),
            events: self.events.clone(),
            stream_open: true,
            context_open: true,
        }))
    }
}

struct ScriptedDevice {
    sample_rate: u32,
    sender: Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>,
    events: Arc<Mutex<Vec<&'static str>>>,
    stream_open: bool,
    context_open: bool,
}

impl ScriptedDevice {
    fn record(&self, event: &'static str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl CaptureDevice for ScriptedDevice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close_stream(&mut self) {
        if self.stream_open {
            self.stream_open = false;
            if let Ok(mut guard) = self.sender.lock() {
                guard.take();
            }
            self.record("close_stream");
        }
    }

    fn close(&mut self) {
        if self.context_open {
            self.context_open = false;
            self.record("close");
        }
    }
}
