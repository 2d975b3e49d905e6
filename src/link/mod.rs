//! # Robot Link
//!
//! Outbound path from the console pipelines to the robot. The link itself
//! (broker connection, reconnect, handshake) is a collaborator behind the
//! [`Link`] trait; the pipelines only see the [`Emitter`].
//!
//! ```text
//! Sampler ──┐
//!           ├──► Emitter ──► Link::send ──► robot
//! Capture ──┘      │
//!                  └── Link::is_connected (read-only)
//! ```
//!
//! The emitter never buffers or retries: a message that cannot be delivered
//! right now is dropped and the next tick replaces it.

pub mod message;
pub mod mqtt_link;

pub use message::{AudioBlock, GamepadSnapshot, OutboundMessage, SnapshotValue};
pub use mqtt_link::{MqttLink, RobotFeedback};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Link rejected message: {0}")]
    Rejected(String),
}

/// Fire-and-forget transport to the robot.
pub trait Link: Send + Sync {
    fn send(&self, message: &OutboundMessage) -> Result<(), LinkError>;

    fn is_connected(&self) -> bool;
}

/// Shared hand-off used by both pipelines.
#[derive(Clone)]
pub struct Emitter {
    link: Arc<dyn Link>,
}

impl Emitter {
    pub fn new(link: Arc<dyn Link>) -> Self {
        Self { link }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Forwards `message` if the link is up. Returns whether it was handed
    /// to the link; a disconnected link is not an error.
    pub fn emit(&self, message: OutboundMessage) -> bool {
        if !self.link.is_connected() {
            debug!("Link down, dropping {} message", message.channel());
            return false;
        }
        match self.link.send(&message) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send {} message: {}", message.channel(), e);
                false
            }
        }
    }
}

/// In-memory link that records everything sent while connected.
#[derive(Debug, Default)]
pub struct MemoryLink {
    connected: AtomicBool,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl MemoryLink {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    pub fn take_sent(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }
}

impl Link for MemoryLink {
    fn send(&self, message: &OutboundMessage) -> Result<(), LinkError> {
        let mut guard = self
            .sent
            .lock()
            .map_err(|e| LinkError::Rejected(e.to_string()))?;
        guard.push(message.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio() -> OutboundMessage {
        OutboundMessage::Audio(AudioBlock {
            samples: vec![1, 2],
            sample_rate: 8000,
        })
    }

    #[test]
    fn test_emit_is_noop_while_disconnected() {
        let link = Arc::new(MemoryLink::new(false));
        let emitter = Emitter::new(link.clone());

        assert!(!emitter.emit(audio()));
        assert!(link.sent().is_empty());

        link.set_connected(true);
        assert!(emitter.emit(audio()));
        assert_eq!(link.sent().len(), 1);
    }

    #[test]
    fn test_nothing_is_replayed_after_reconnect() {
        let link = Arc::new(MemoryLink::new(false));
        let emitter = Emitter::new(link.clone());
        for _ in 0..5 {
            emitter.emit(audio());
        }
        link.set_connected(true);
        emitter.emit(audio());
        assert_eq!(link.take_sent().len(), 1);
        assert!(link.sent().is_empty());
    }
}
