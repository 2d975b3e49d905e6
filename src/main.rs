use color_eyre::{eyre::eyre, Result};
use robolink::audio::{CaptureHandle, CaptureSettings, CpalCapture, WavSoundBoard};
use robolink::config::ConsoleConfig;
use robolink::console::{Command, HELP};
use robolink::controller::{
    DevicePoller, GamepadSampler, GilrsPoller, PollerSettings, SamplerControls, SamplerHandle,
    SamplerSettings, SamplerUpdates,
};
use robolink::link::{Emitter, MqttLink, RobotFeedback};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = ConsoleConfig::path()?;
    ConsoleConfig::ensure_default(&config_path).await?;
    let mut config = ConsoleConfig::load(&config_path).await?;
    info!("Using configuration {:?}", config_path);

    let (feedback_tx, feedback_rx) = mpsc::channel(100);
    let link = Arc::new(MqttLink::connect(&config.link, config.audio.buffer_size, feedback_tx));
    let emitter = Emitter::new(link.clone());
    let _feedback_task = tokio::spawn(log_robot_feedback(feedback_rx));

    let poller = Arc::new(
        GilrsPoller::spawn(Some(PollerSettings {
            poll_interval_ms: config.sampler.poll_interval_ms,
            joystick_deadzone: config.sampler.joystick_deadzone,
        }))
        .map_err(|e| eyre!("Failed to start gamepad poller: {}", e))?,
    );

    let (updates, controls) = SamplerControls::channel(
        config.mapping_store()?,
        config.action_groups()?,
        config.sampler.device.clone(),
        config.audio.trigger_sound.clone(),
    );
    let sounds = WavSoundBoard::new(config.audio.sound_dir.clone());
    let sampler = GamepadSampler::create(
        poller.clone(),
        emitter.clone(),
        Arc::new(sounds.clone()),
        controls,
        Some(SamplerSettings {
            tick_interval_ms: config.sampler.tick_interval_ms,
            trigger_action: config.sampler.trigger_action,
            trigger_threshold: config.sampler.trigger_threshold,
        }),
    );
    let mut sampler_handle = SamplerHandle::spawn(sampler);

    let mut capture = CaptureHandle::new(
        Arc::new(CpalCapture),
        emitter,
        CaptureSettings {
            target_sample_rate: config.audio.target_sample_rate,
            buffer_size: config.audio.buffer_size,
            channel_capacity: config.audio.channel_capacity,
        },
    );

    let mut console = Console {
        config: &mut config,
        config_path: &config_path,
        updates: &updates,
        poller: poller.as_ref(),
        sounds: &sounds,
        capture: &mut capture,
    };

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !console.handle(&line).await {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        }
    }

    info!("Shutting down");
    capture.stop();
    sampler_handle.stop().await;
    poller.shutdown();
    link.shutdown();
    Ok(())
}

struct Console<'a> {
    config: &'a mut ConsoleConfig,
    config_path: &'a Path,
    updates: &'a SamplerUpdates,
    poller: &'a dyn DevicePoller,
    sounds: &'a WavSoundBoard,
    capture: &'a mut CaptureHandle,
}

impl Console<'_> {
    // Returns false once the console should exit
    async fn handle(&mut self, line: &str) -> bool {
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                return true;
            }
        };
        debug!("Console command: {:?}", command);

        match command {
            Command::Help => println!("{}", HELP),
            Command::Devices => {
                let selected = self.updates.selected_device();
                let devices = self.poller.poll();
                if devices.is_empty() {
                    println!("no gamepads connected");
                }
                for device in devices {
                    let marker = if selected.as_deref() == Some(device.id.as_str()) { "*" } else { " " };
                    println!("{} {}  {}", marker, device.id, device.name);
                }
            }
            Command::SelectDevice(id) => self.updates.select_device(id),
            Command::Sounds => {
                let selected = self.updates.selected_sound();
                for sound in self.sounds.available() {
                    let marker = if selected.as_deref() == Some(sound.as_str()) { "*" } else { " " };
                    println!("{} {}", marker, sound);
                }
            }
            Command::SelectSound(sound) => self.updates.select_sound(sound),
            Command::Talk => match self.capture.toggle() {
                Ok(true) => println!("transmitting"),
                Ok(false) => println!("muted"),
                Err(e) => println!("cannot transmit: {}", e),
            },
            Command::Mappings => {
                for mapping in self.updates.mappings().to_mappings() {
                    println!(
                        "{:<12} {:?} {}",
                        mapping.action.as_str(),
                        mapping.control_kind,
                        mapping.control_index
                    );
                }
            }
            Command::Bind(action, control) => {
                if let Err(e) = self.updates.edit_mappings(|store| store.bind(action, control)) {
                    println!("{}", e);
                }
            }
            Command::Unbind(action) => {
                self.updates.edit_mappings(|store| store.unbind(action));
            }
            Command::Save => {
                self.config.mappings = self.updates.mappings().to_mappings();
                self.config.sampler.device = self.updates.selected_device();
                self.config.audio.trigger_sound = self.updates.selected_sound();
                if let Err(e) = self.config.save(self.config_path).await {
                    error!("Failed to save configuration: {}", e);
                }
            }
            Command::Quit => return false,
        }
        true
    }
}

async fn log_robot_feedback(mut feedback_rx: mpsc::Receiver<RobotFeedback>) {
    while let Some(feedback) = feedback_rx.recv().await {
        if feedback.topic.ends_with("/log") {
            info!("robot: {}", feedback.payload);
        } else if feedback.topic.ends_with("/error") {
            warn!("robot error: {}", feedback.payload);
        } else {
            debug!("robot feedback on {}: {}", feedback.topic, feedback.payload);
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
