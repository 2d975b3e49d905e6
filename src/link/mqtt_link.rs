use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{AudioBlock, Link, LinkError, OutboundMessage};
use crate::config::LinkConfig;

/// rumqttc's default packet limit
const DEFAULT_MAX_PACKET_SIZE: usize = 10 * 1024;

/// Fixed header, topic length prefix and packet id
const PUBLISH_OVERHEAD: usize = 16;

/// Packet limit large enough for a full audio block of `audio_samples`
/// samples published on `<prefix>/audio`.
pub fn max_packet_size(config: &LinkConfig, audio_samples: usize) -> usize {
    let topic = config.topic_prefix.len() + "/audio".len();
    let audio = AudioBlock::max_encoded_len(audio_samples) + topic + PUBLISH_OVERHEAD;
    audio.max(DEFAULT_MAX_PACKET_SIZE)
}

/// Message published by the robot on its feedback topics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotFeedback {
    pub topic: String,
    pub payload: String,
}

/// MQTT link to the robot.
///
/// Outbound messages go through `try_publish`, so `send` never waits on the
/// broker. Connectivity is derived from the event loop: set on ConnAck,
/// cleared on disconnect or connection error.
pub struct MqttLink {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    topic_prefix: String,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttLink {
    /// `audio_samples` is the largest audio block the link must carry;
    /// downsampled blocks are never longer than the capture buffer.
    pub fn connect(
        config: &LinkConfig,
        audio_samples: usize,
        feedback_tx: mpsc::Sender<RobotFeedback>,
    ) -> Self {
        info!(
            "Connecting MQTT link to {}:{} as {}",
            config.host, config.port, config.client_id
        );
        let mut mqtt_options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if !config.user.is_empty() {
            mqtt_options.set_credentials(config.user.clone(), config.password.clone());
        }
        let packet_limit = max_packet_size(config, audio_samples);
        debug!("MQTT packet limit {} bytes", packet_limit);
        mqtt_options.set_max_packet_size(packet_limit, packet_limit);

        let (client, eventloop) = AsyncClient::new(mqtt_options, config.request_capacity);
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            connected.clone(),
            format!("{}/feedback/#", config.topic_prefix),
            Duration::from_millis(config.reconnect_delay_ms),
            feedback_tx,
        ));

        Self {
            client,
            connected,
            topic_prefix: config.topic_prefix.clone(),
            task: Mutex::new(Some(task)),
        }
    }

    pub fn topic_for(&self, message: &OutboundMessage) -> String {
        format!("{}/{}", self.topic_prefix, message.channel())
    }

    pub fn shutdown(&self) {
        info!("Shutting down MQTT link");
        if let Err(e) = self.client.try_disconnect() {
            debug!("Disconnect request not queued: {}", e);
        }
        self.connected.store(false, Ordering::SeqCst);
        if let Ok(mut guard) = self.task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

impl Link for MqttLink {
    fn send(&self, message: &OutboundMessage) -> Result<(), LinkError> {
        let payload = message.to_json()?;
        self.client
            .try_publish(self.topic_for(message), QoS::AtMostOnce, false, payload)
            .map_err(|e| LinkError::Rejected(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    feedback_topic: String,
    reconnect_delay: Duration,
    feedback_tx: mpsc::Sender<RobotFeedback>,
) {
    info!("MQTT event loop started");
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!("MQTT link connected: {:?}", ack.code);
                connected.store(true, Ordering::SeqCst);
                if let Err(e) = client.try_subscribe(feedback_topic.clone(), QoS::AtMostOnce) {
                    warn!("Failed to subscribe to {}: {}", feedback_topic, e);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let feedback = RobotFeedback {
                    topic: publish.topic.clone(),
                    payload: String::from_utf8_lossy(&publish.payload).into_owned(),
                };
                if let Err(e) = feedback_tx.try_send(feedback) {
                    debug!("Dropping robot feedback: {}", e);
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("MQTT broker closed the connection");
                connected.store(false, Ordering::SeqCst);
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    error!("MQTT link lost: {}", e);
                } else {
                    debug!("MQTT connection attempt failed: {}", e);
                }
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scale_audio_block_fits_packet_limit() {
        let config = LinkConfig::default();
        let limit = max_packet_size(&config, 4096);
        assert!(limit > DEFAULT_MAX_PACKET_SIZE);

        let message = OutboundMessage::Audio(AudioBlock {
            samples: vec![-32767; 4096],
            sample_rate: 16000,
        });
        let topic = format!("{}/{}", config.topic_prefix, message.channel());
        let packet = message.to_json().unwrap().len() + topic.len() + PUBLISH_OVERHEAD;
        assert!(packet <= limit);
    }

    #[test]
    fn test_small_buffers_keep_default_limit() {
        assert_eq!(max_packet_size(&LinkConfig::default(), 256), DEFAULT_MAX_PACKET_SIZE);
    }
}
