//! Gamepad sampler: the fixed-rate loop turning device state into snapshots.
//!
//! # State Machine
//!
//! ```text
//!  ┌──────────► Polling ──poll_device──► Resolving ──resolve──► Emitting ─┐
//!  │                                                                      │
//!  └──────────────────────────────── emit ────────────────────────────────┘
//! ```
//!
//! One full cycle runs per tick. Independently of the cycle the sampler is
//! either [`SamplerMode::Idle`] or [`SamplerMode::Sampling`]; the mode is
//! re-evaluated on every poll. An idle tick still emits a snapshot with
//! `connected: false` and neutral `speed`/`turn`.
//!
//! Device selection, the trigger sound and mapping edits arrive through
//! watch channels ([`SamplerControls`]) and are read fresh on every tick.

use chrono::Local;
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::audio::SoundPlayer;
use crate::controller::device::{DevicePoller, DeviceState};
use crate::link::{Emitter, GamepadSnapshot, OutboundMessage};
use crate::mapping::resolver::resolve_in;
use crate::mapping::{combine, ActionGroups, ActionKey, MappingStore};

/// Rising-edge detector for one boolean signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeDetector {
    previous: bool,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the current level; true only on a false-to-true transition.
    pub fn update(&mut self, active: bool) -> bool {
        let fired = active && !self.previous;
        self.previous = active;
        fired
    }

    pub fn reset(&mut self) {
        self.previous = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerMode {
    /// No link, no selected device, or the selected device is gone
    Idle,
    Sampling,
}

// Sampler settings
#[derive(Clone, Debug)]
pub struct SamplerSettings {
    pub tick_interval_ms: u64,
    pub trigger_action: ActionKey,
    /// Normalized value at or above which the trigger action counts as held
    pub trigger_threshold: f32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            trigger_action: ActionKey::Use,
            trigger_threshold: 0.5,
        }
    }
}

/// Counters since the sampler was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub emitted: u64,
    pub triggers: u64,
}

/// Read side of the out-of-band configuration.
#[derive(Clone, Debug)]
pub struct SamplerControls {
    pub mappings: watch::Receiver<MappingStore>,
    pub device: watch::Receiver<Option<String>>,
    pub trigger_sound: watch::Receiver<Option<String>>,
    pub groups: ActionGroups,
}

/// Write side of the out-of-band configuration.
#[derive(Debug)]
pub struct SamplerUpdates {
    mappings: watch::Sender<MappingStore>,
    device: watch::Sender<Option<String>>,
    trigger_sound: watch::Sender<Option<String>>,
}

impl SamplerControls {
    pub fn channel(
        mappings: MappingStore,
        groups: ActionGroups,
        device: Option<String>,
        trigger_sound: Option<String>,
    ) -> (SamplerUpdates, SamplerControls) {
        let (mappings_tx, mappings_rx) = watch::channel(mappings);
        let (device_tx, device_rx) = watch::channel(device);
        let (sound_tx, sound_rx) = watch::channel(trigger_sound);
        (
            SamplerUpdates {
                mappings: mappings_tx,
                device: device_tx,
                trigger_sound: sound_tx,
            },
            SamplerControls {
                mappings: mappings_rx,
                device: device_rx,
                trigger_sound: sound_rx,
                groups,
            },
        )
    }
}

impl SamplerUpdates {
    pub fn select_device(&self, id: Option<String>) {
        info!("Selected device: {:?}", id);
        self.device.send_replace(id);
    }

    pub fn select_sound(&self, sound: Option<String>) {
        info!("Selected trigger sound: {:?}", sound);
        self.trigger_sound.send_replace(sound);
    }

    /// Applies `edit` to a copy of the current store and publishes it.
    pub fn edit_mappings<T>(&self, edit: impl FnOnce(&mut MappingStore) -> T) -> T {
        let mut store = self.mappings.borrow().clone();
        let result = edit(&mut store);
        self.mappings.send_replace(store);
        result
    }

    pub fn mappings(&self) -> MappingStore {
        self.mappings.borrow().clone()
    }

    pub fn selected_device(&self) -> Option<String> {
        self.device.borrow().clone()
    }

    pub fn selected_sound(&self) -> Option<String> {
        self.trigger_sound.borrow().clone()
    }
}

/// Result of one poll
#[derive(Debug, Clone)]
pub struct PolledDevice {
    pub mode: SamplerMode,
    pub device: Option<DeviceState>,
}

#[state]
#[derive(Debug, Clone)]
pub enum SamplerState {
    Polling,
    Resolving(PolledDevice),
    Emitting(GamepadSnapshot),
}

#[machine]
pub struct GamepadSampler<S: SamplerState> {
    poller: Arc<dyn DevicePoller>,
    emitter: Emitter,
    sounds: Arc<dyn SoundPlayer>,
    controls: SamplerControls,
    settings: SamplerSettings,
    edge: EdgeDetector,
    mode: SamplerMode,
    stats: TickStats,
}

impl<S: SamplerState> GamepadSampler<S> {
    pub fn mode(&self) -> SamplerMode {
        self.mode
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }
}

impl GamepadSampler<Polling> {
    pub fn create(
        poller: Arc<dyn DevicePoller>,
        emitter: Emitter,
        sounds: Arc<dyn SoundPlayer>,
        controls: SamplerControls,
        settings: Option<SamplerSettings>,
    ) -> Self {
        let settings = settings.unwrap_or_default();
        info!("Creating Gamepad Sampler with settings: {:?}", settings);
        Self::new(
            poller,
            emitter,
            sounds,
            controls,
            settings,
            EdgeDetector::new(),
            SamplerMode::Idle,
            TickStats::default(),
        )
    }

    /// Runs one complete poll, resolve and emit cycle.
    pub fn tick(self) -> GamepadSampler<Polling> {
        self.poll_device().resolve().emit()
    }

    pub fn poll_device(mut self) -> GamepadSampler<Resolving> {
        let selected = self.controls.device.borrow().clone();
        let device = selected.as_deref().and_then(|id| {
            let device = self.poller.poll_device(id);
            if device.is_none() {
                debug!("Selected device {} not present", id);
            }
            device
        });

        let mode = if self.emitter.is_connected() && device.is_some() {
            SamplerMode::Sampling
        } else {
            SamplerMode::Idle
        };
        if mode != self.mode {
            info!("Sampler mode {:?} -> {:?}", self.mode, mode);
            self.mode = mode;
        }

        self.transition_with(PolledDevice { mode, device })
    }
}

impl GamepadSampler<Resolving> {
    pub fn resolve(mut self) -> GamepadSampler<Emitting> {
        let timestamp = Local::now().timestamp_millis();
        let polled = self.get_state_data().cloned();

        let (snapshot, trigger_held) = match polled {
            Some(PolledDevice {
                mode: SamplerMode::Sampling,
                device: Some(device),
            }) => {
                let store = self.controls.mappings.borrow();
                let mut snapshot = GamepadSnapshot::new(timestamp, true);
                snapshot.merge(&combine(&self.controls.groups, &store, &device.state));
                snapshot.set_diagnostics(&device.state.buttons, &device.state.axes);

                let trigger = resolve_in(&store, self.settings.trigger_action, &device.state);
                (
                    snapshot,
                    trigger.normalized() >= self.settings.trigger_threshold,
                )
            }
            _ => (GamepadSnapshot::new(timestamp, false), false),
        };

        if self.edge.update(trigger_held) {
            self.fire_trigger();
        }

        self.transition_with(snapshot)
    }

    fn fire_trigger(&mut self) {
        self.stats.triggers += 1;
        let sound = self.controls.trigger_sound.borrow().clone();
        match sound {
            Some(sound) => {
                debug!("Trigger {} pressed, playing {}", self.settings.trigger_action, sound);
                self.sounds.play(&sound);
            }
            None => debug!("Trigger {} pressed, no sound selected", self.settings.trigger_action),
        }
    }
}

impl GamepadSampler<Emitting> {
    /// Hands the snapshot to the emitter, whatever it contains.
    pub fn emit(mut self) -> GamepadSampler<Polling> {
        if let Some(snapshot) = self.get_state_data() {
            if self.emitter.emit(OutboundMessage::Gamepad(snapshot.clone())) {
                self.stats.emitted += 1;
            }
        }
        self.stats.ticks += 1;
        self.transition()
    }
}

/// Running sampler task
pub struct SamplerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    pub fn spawn(sampler: GamepadSampler<Polling>) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        info!("Spawning Gamepad Sampler task");
        let task = tokio::spawn(async move {
            info!("Gamepad Sampler task started");
            run_sampler_loop(sampler, task_cancel).await;
            info!("Gamepad Sampler task finished");
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Stops future ticks and waits for the task to exit.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Sampler task failed: {}", e);
            }
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_sampler_loop(mut sampler: GamepadSampler<Polling>, cancel: CancellationToken) {
    let period = Duration::from_millis(sampler.settings().tick_interval_ms.max(1));
    info!("Starting sampler loop with {:?} interval", period);

    let mut interval_timer = tokio::time::interval(period);
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut reported = TickStats::default();
    let mut last_stats_time = Local::now();
    let stats_interval = chrono::Duration::seconds(30);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Sampler cancelled");
                break;
            }
            _ = interval_timer.tick() => {}
        }

        sampler = sampler.tick();

        let now = Local::now();
        if now - last_stats_time > stats_interval {
            let stats = sampler.stats();
            let elapsed_seconds = (now - last_stats_time).num_seconds().max(1);
            info!(
                "Sampler stats: {} ticks, {} emitted, {} triggers in {} seconds ({:?})",
                stats.ticks - reported.ticks,
                stats.emitted - reported.emitted,
                stats.triggers - reported.triggers,
                elapsed_seconds,
                sampler.mode()
            );
            reported = stats;
            last_stats_time = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RecordingSoundPlayer;
    use crate::controller::device::{RawDeviceState, StaticPoller};
    use crate::link::{MemoryLink, SnapshotValue};

    struct Rig {
        poller: StaticPoller,
        link: Arc<MemoryLink>,
        sounds: Arc<RecordingSoundPlayer>,
        updates: SamplerUpdates,
        sampler: GamepadSampler<Polling>,
    }

    fn rig(device: Option<&str>) -> Rig {
        let poller = StaticPoller::new();
        let link = Arc::new(MemoryLink::new(true));
        let sounds = Arc::new(RecordingSoundPlayer::new());
        let (updates, controls) = SamplerControls::channel(
            MappingStore::default_bindings(),
            ActionGroups::default_drive(),
            device.map(str::to_string),
            Some("horn".to_string()),
        );
        let sampler = GamepadSampler::create(
            Arc::new(poller.clone()),
            Emitter::new(link.clone()),
            sounds.clone(),
            controls,
            None,
        );
        Rig {
            poller,
            link,
            sounds,
            updates,
            sampler,
        }
    }

    fn buttons(pressed: &[usize]) -> RawDeviceState {
        let mut buttons = vec![false; 17];
        for index in pressed {
            buttons[*index] = true;
        }
        RawDeviceState {
            buttons,
            axes: vec![0.0; 4],
        }
    }

    fn last_snapshot(link: &MemoryLink) -> GamepadSnapshot {
        match link.sent().pop() {
            Some(OutboundMessage::Gamepad(snapshot)) => snapshot,
            other => panic!("expected gamepad snapshot, got {:?}", other),
        }
    }

    fn text(value: &str) -> SnapshotValue {
        SnapshotValue::Text(value.to_string())
    }

    #[test]
    fn test_edge_fires_on_rising_transitions_only() {
        let mut edge = EdgeDetector::new();
        let fired: Vec<usize> = [false, true, true, false, true]
            .into_iter()
            .enumerate()
            .filter(|(_, active)| edge.update(*active))
            .map(|(index, _)| index)
            .collect();
        assert_eq!(fired, vec![1, 4]);

        edge.reset();
        assert!(edge.update(true));
    }

    #[test]
    fn test_idle_tick_without_device_still_emits() {
        let mut rig = rig(None);
        for _ in 0..3 {
            rig.sampler = rig.sampler.tick();
        }

        assert_eq!(rig.sampler.mode(), SamplerMode::Idle);
        assert_eq!(rig.link.sent().len(), 3);
        let snapshot = last_snapshot(&rig.link);
        assert!(!snapshot.is_connected());
        assert_eq!(snapshot.get("speed"), Some(&text("0.00")));
        assert_eq!(snapshot.get("turn"), Some(&text("0.00")));
        assert!(snapshot.contains_key("timestamp"));
        assert!(!snapshot.contains_key("_raw_buttons"));
    }

    #[test]
    fn test_sampling_resolves_groups_and_diagnostics() {
        let mut rig = rig(Some("pad0"));
        // forward (12) and turn left (14)
        rig.poller.set_state("pad0", buttons(&[12, 14]));

        rig.sampler = rig.sampler.tick();
        assert_eq!(rig.sampler.mode(), SamplerMode::Sampling);

        let snapshot = last_snapshot(&rig.link);
        assert!(snapshot.is_connected());
        assert_eq!(snapshot.get("speed"), Some(&text("1.00")));
        assert_eq!(snapshot.get("turn"), Some(&text("-1.00")));
        assert_eq!(snapshot.get("use"), Some(&SnapshotValue::Flag(false)));
        assert_eq!(snapshot.get("_raw_axes"), Some(&text("[0.00,0.00,0.00,0.00]")));
        assert!(snapshot.contains_key("_raw_buttons"));
    }

    #[test]
    fn test_trigger_plays_once_per_press() {
        let mut rig = rig(Some("pad0"));
        for held in [false, true, true, false, true] {
            let pressed: &[usize] = if held { &[0] } else { &[] };
            rig.poller.set_state("pad0", buttons(pressed));
            rig.sampler = rig.sampler.tick();
        }

        assert_eq!(rig.sounds.played(), vec!["horn", "horn"]);
        assert_eq!(rig.sampler.stats().triggers, 2);
        assert_eq!(rig.sampler.stats().ticks, 5);
    }

    #[test]
    fn test_sound_change_applies_next_tick() {
        let mut rig = rig(Some("pad0"));
        rig.poller.set_state("pad0", buttons(&[0]));
        rig.sampler = rig.sampler.tick();

        rig.updates.select_sound(Some("beep".to_string()));
        rig.poller.set_state("pad0", buttons(&[]));
        rig.sampler = rig.sampler.tick();
        rig.poller.set_state("pad0", buttons(&[0]));
        rig.sampler = rig.sampler.tick();

        rig.updates.select_sound(None);
        rig.poller.set_state("pad0", buttons(&[]));
        rig.sampler = rig.sampler.tick();
        rig.poller.set_state("pad0", buttons(&[0]));
        rig.sampler = rig.sampler.tick();

        assert_eq!(rig.sounds.played(), vec!["horn", "beep"]);
        assert_eq!(rig.sampler.stats().triggers, 3);
    }

    #[test]
    fn test_device_loss_and_link_loss_go_idle() {
        let mut rig = rig(Some("pad0"));
        rig.poller.set_state("pad0", buttons(&[12]));
        rig.sampler = rig.sampler.tick();
        assert_eq!(rig.sampler.mode(), SamplerMode::Sampling);

        rig.poller.remove("pad0");
        rig.sampler = rig.sampler.tick();
        assert_eq!(rig.sampler.mode(), SamplerMode::Idle);
        assert!(!last_snapshot(&rig.link).is_connected());

        rig.poller.set_state("pad0", buttons(&[12]));
        rig.link.set_connected(false);
        rig.sampler = rig.sampler.tick();
        assert_eq!(rig.sampler.mode(), SamplerMode::Idle);
        assert_eq!(rig.sampler.stats().emitted, 2);
        assert_eq!(rig.sampler.stats().ticks, 3);
    }

    #[test]
    fn test_mapping_edit_applies_next_tick() {
        let mut rig = rig(Some("pad0"));
        rig.poller.set_state("pad0", buttons(&[12]));
        rig.updates.edit_mappings(|store| store.unbind(ActionKey::Forward));

        rig.sampler = rig.sampler.tick();
        assert_eq!(last_snapshot(&rig.link).get("speed"), Some(&text("0.00")));
    }

    #[tokio::test]
    async fn test_handle_ticks_until_stopped() {
        let rig = rig(None);
        let link = rig.link.clone();
        let mut handle = SamplerHandle::spawn(rig.sampler);
        assert!(handle.is_running());

        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.stop().await;
        let sent = link.sent().len();
        assert!(sent >= 2, "only {} snapshots sent", sent);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(link.sent().len(), sent);
        assert!(!handle.is_running());
    }
}
