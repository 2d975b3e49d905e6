//! Console configuration, persisted as a single TOML file.
//!
//! Missing sections fall back to defaults so an old or partial file still
//! loads. Mapping and group lists are validated on load; an invalid file is
//! reported instead of being silently repaired.

use crate::mapping::{ActionGroup, ActionGroups, ActionKey, Mapping, MappingStore};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_DIR: &str = "robolink";
const CONFIG_FILE: &str = "config.toml";
const CONFIG_ENV: &str = "ROBOLINK_CONFIG";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Topics are `<prefix>/gamepad`, `<prefix>/audio`, `<prefix>/feedback/#`
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
    pub user: String,
    pub password: String,
    pub reconnect_delay_ms: u64,
    pub request_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "robolink-console".to_string(),
            topic_prefix: "robot".to_string(),
            keep_alive_secs: 5,
            user: String::new(),
            password: String::new(),
            reconnect_delay_ms: 1000,
            request_capacity: 64,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SamplerConfig {
    pub tick_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub joystick_deadzone: f32,
    /// Gamepad id to sample; unset leaves the sampler idle
    pub device: Option<String>,
    pub trigger_action: ActionKey,
    pub trigger_threshold: f32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            poll_interval_ms: 4,
            joystick_deadzone: 0.05,
            device: None,
            trigger_action: ActionKey::Use,
            trigger_threshold: 0.5,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub target_sample_rate: u32,
    pub buffer_size: usize,
    /// Buffers queued between the capture callback and the forwarder
    pub channel_capacity: usize,
    pub sound_dir: PathBuf,
    pub trigger_sound: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let sound_dir = dirs::data_dir()
            .map(|dir| dir.join(CONFIG_DIR).join("sounds"))
            .unwrap_or_else(|| PathBuf::from("sounds"));
        Self {
            target_sample_rate: 16000,
            buffer_size: 4096,
            channel_capacity: 8,
            sound_dir,
            trigger_sound: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default = "default_mappings")]
    pub mappings: Vec<Mapping>,
    #[serde(default = "default_groups")]
    pub groups: Vec<ActionGroup>,
}

fn default_mappings() -> Vec<Mapping> {
    MappingStore::default_bindings().to_mappings()
}

fn default_groups() -> Vec<ActionGroup> {
    ActionGroups::default_drive().as_slice().to_vec()
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            sampler: SamplerConfig::default(),
            audio: AudioConfig::default(),
            mappings: default_mappings(),
            groups: default_groups(),
        }
    }
}

impl ConsoleConfig {
    /// `$ROBOLINK_CONFIG`, or `<config dir>/robolink/config.toml`.
    pub fn path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let mut path = dirs::config_dir().ok_or_else(|| eyre!("No config directory available"))?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    /// Writes the default configuration if no file exists yet.
    pub async fn ensure_default(path: &Path) -> Result<()> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?;
        if !exists {
            info!("No configuration at {:?}, writing defaults", path);
            Self::default().save(path).await?;
        }
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {:?}: {}", path, e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {:?}: {}", path, e))?;
        config.validate()?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;
        info!("Configuration saved to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.mapping_store()?;
        self.action_groups()?;
        if self.sampler.tick_interval_ms == 0 {
            return Err(eyre!("sampler.tick_interval_ms must be positive"));
        }
        // Also rejects NaN
        if !(0.0..1.0).contains(&self.sampler.joystick_deadzone) {
            return Err(eyre!("sampler.joystick_deadzone must be in [0, 1)"));
        }
        if self.audio.target_sample_rate == 0 || self.audio.buffer_size == 0 {
            return Err(eyre!("audio.target_sample_rate and audio.buffer_size must be positive"));
        }
        Ok(())
    }

    pub fn mapping_store(&self) -> Result<MappingStore> {
        MappingStore::from_mappings(&self.mappings).map_err(|e| eyre!("Invalid mappings: {}", e))
    }

    pub fn action_groups(&self) -> Result<ActionGroups> {
        ActionGroups::new(self.groups.clone()).map_err(|e| eyre!("Invalid groups: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{Control, ControlKind};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_default_config_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        ConsoleConfig::ensure_default(&path).await.unwrap();
        let loaded = ConsoleConfig::load(&path).await.unwrap();

        assert_eq!(loaded, ConsoleConfig::default());
        assert_eq!(loaded.sampler.tick_interval_ms, 50);
        assert_eq!(
            loaded.mapping_store().unwrap().get(ActionKey::Use),
            Some(Control::Button(0))
        );
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let toml = r#"
[link]
host = "robot.local"

[[mappings]]
action = "forward"
control_index = 1
control_kind = "axis"

[[mappings]]
action = "use"
control_index = -1
control_kind = "button"
"#;
        tokio::fs::write(&path, toml).await.unwrap();

        let config = ConsoleConfig::load(&path).await.unwrap();
        assert_eq!(config.link.host, "robot.local");
        assert_eq!(config.link.port, 1883);
        assert_eq!(config.groups.len(), 2);
        assert_eq!(
            config.mappings[0],
            Mapping {
                action: ActionKey::Forward,
                control_index: 1,
                control_kind: ControlKind::Axis,
            }
        );
        let store = config.mapping_store().unwrap();
        assert_eq!(store.get(ActionKey::Use), Some(Control::Unbound));
    }

    #[tokio::test]
    async fn test_overlapping_groups_fail_to_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let toml = r#"
[[groups]]
key = "speed"
actions = ["forward", "backward"]

[[groups]]
key = "boost"
actions = ["forward"]
"#;
        tokio::fs::write(&path, toml).await.unwrap();
        assert!(ConsoleConfig::load(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_deadzone_must_stay_below_one() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        for deadzone in ["1.0", "-0.1", "nan"] {
            let toml = format!("[sampler]\njoystick_deadzone = {}\n", deadzone);
            tokio::fs::write(&path, toml).await.unwrap();
            assert!(ConsoleConfig::load(&path).await.is_err(), "deadzone {}", deadzone);
        }

        tokio::fs::write(&path, "[sampler]\njoystick_deadzone = 0.0\n").await.unwrap();
        assert!(ConsoleConfig::load(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_group_named_like_snapshot_key_fails_to_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let toml = r#"
[[groups]]
key = "connected"
actions = ["forward", "backward"]
"#;
        tokio::fs::write(&path, toml).await.unwrap();
        assert!(ConsoleConfig::load(&path).await.is_err());
    }
}
