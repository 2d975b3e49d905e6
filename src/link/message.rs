//! Outbound wire shapes.

use crate::mapping::resolver::format_scalar;
use crate::mapping::{Combined, ControlValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const KEY_TIMESTAMP: &str = "timestamp";
pub const KEY_CONNECTED: &str = "connected";
pub const KEY_SPEED: &str = "speed";
pub const KEY_TURN: &str = "turn";
pub const KEY_RAW_AXES: &str = "_raw_axes";
pub const KEY_RAW_BUTTONS: &str = "_raw_buttons";

/// A single snapshot value.
///
/// Serialized untagged, so the snapshot is a flat JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    Flag(bool),
    Integer(i64),
    Text(String),
}

impl From<ControlValue> for SnapshotValue {
    fn from(value: ControlValue) -> Self {
        match value {
            ControlValue::Flag(flag) => SnapshotValue::Flag(flag),
            ControlValue::Signed(scalar) => SnapshotValue::Text(format_scalar(scalar)),
        }
    }
}

/// One tick's complete control state.
///
/// Always carries `timestamp`, `connected`, `speed` and `turn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GamepadSnapshot {
    entries: BTreeMap<String, SnapshotValue>,
}

impl GamepadSnapshot {
    pub fn new(timestamp_ms: i64, connected: bool) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(KEY_TIMESTAMP.to_string(), SnapshotValue::Integer(timestamp_ms));
        entries.insert(KEY_CONNECTED.to_string(), SnapshotValue::Flag(connected));
        entries.insert(KEY_SPEED.to_string(), SnapshotValue::Text(format_scalar(0.0)));
        entries.insert(KEY_TURN.to_string(), SnapshotValue::Text(format_scalar(0.0)));
        Self { entries }
    }

    /// Merges combiner output; the fixed keys can be overwritten by groups
    /// of the same name but never removed.
    pub fn merge(&mut self, combined: &Combined) {
        for (key, value) in &combined.entries {
            self.entries.insert(key.clone(), SnapshotValue::from(*value));
        }
    }

    pub fn set_diagnostics(&mut self, buttons: &[bool], axes: &[f32]) {
        let buttons = serde_json::to_string(buttons).unwrap_or_default();
        let axes = format!(
            "[{}]",
            axes.iter()
                .map(|a| format_scalar(*a))
                .collect::<Vec<_>>()
                .join(",")
        );
        self.entries
            .insert(KEY_RAW_BUTTONS.to_string(), SnapshotValue::Text(buttons));
        self.entries
            .insert(KEY_RAW_AXES.to_string(), SnapshotValue::Text(axes));
    }

    pub fn get(&self, key: &str) -> Option<&SnapshotValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.get(KEY_CONNECTED), Some(SnapshotValue::Flag(true)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One downsampled audio buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioBlock {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioBlock {
    /// Upper bound on the JSON size of a block holding `sample_count` samples.
    pub fn max_encoded_len(sample_count: usize) -> usize {
        // Widest sample is "-32768," and the widest rate is u32::MAX
        const ENVELOPE: &str = r#"{"samples":[],"sampleRate":4294967295}"#;
        ENVELOPE.len() + sample_count * "-32768,".len()
    }
}

/// Everything the console sends to the robot
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Gamepad(GamepadSnapshot),
    Audio(AudioBlock),
}

impl OutboundMessage {
    pub fn channel(&self) -> &'static str {
        match self {
            OutboundMessage::Gamepad(_) => "gamepad",
            OutboundMessage::Audio(_) => "audio",
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            OutboundMessage::Gamepad(snapshot) => serde_json::to_vec(snapshot),
            OutboundMessage::Audio(block) => serde_json::to_vec(block),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_fresh_snapshot_has_fixed_keys() {
        let snapshot = GamepadSnapshot::new(1234, false);
        let json: Value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["timestamp"], 1234);
        assert_eq!(json["connected"], false);
        assert_eq!(json["speed"], "0.00");
        assert_eq!(json["turn"], "0.00");
    }

    #[test]
    fn test_merge_formats_scalars() {
        let mut snapshot = GamepadSnapshot::new(0, true);
        snapshot.merge(&Combined {
            entries: vec![
                ("speed".to_string(), ControlValue::Signed(-0.5)),
                ("use".to_string(), ControlValue::Flag(true)),
            ],
            processed: vec![],
        });
        assert_eq!(snapshot.get("speed"), Some(&SnapshotValue::Text("-0.50".into())));
        assert_eq!(snapshot.get("use"), Some(&SnapshotValue::Flag(true)));
        assert!(snapshot.is_connected());
    }

    #[test]
    fn test_diagnostics_are_strings() {
        let mut snapshot = GamepadSnapshot::new(0, true);
        snapshot.set_diagnostics(&[true, false], &[0.5, -0.123]);
        assert_eq!(
            snapshot.get(KEY_RAW_BUTTONS),
            Some(&SnapshotValue::Text("[true,false]".into()))
        );
        assert_eq!(
            snapshot.get(KEY_RAW_AXES),
            Some(&SnapshotValue::Text("[0.50,-0.12]".into()))
        );
    }

    #[test]
    fn test_audio_block_wire_shape() {
        let message = OutboundMessage::Audio(AudioBlock {
            samples: vec![0, -32767, 32767],
            sample_rate: 16000,
        });
        let json: Value = serde_json::from_slice(&message.to_json().unwrap()).unwrap();
        assert_eq!(json["sampleRate"], 16000);
        assert_eq!(json["samples"][1], -32767);
        assert_eq!(message.channel(), "audio");
    }

    #[test]
    fn test_loudest_block_fits_encoded_bound() {
        let block = AudioBlock {
            samples: vec![-32768; 4096],
            sample_rate: u32::MAX,
        };
        let len = OutboundMessage::Audio(block).to_json().unwrap().len();
        assert!(len <= AudioBlock::max_encoded_len(4096));
        assert!(len > 10240);
    }

    #[test]
    fn test_reserved_group_keys_cover_fixed_entries() {
        use crate::mapping::RESERVED_KEYS;
        for key in [KEY_TIMESTAMP, KEY_CONNECTED, KEY_RAW_AXES, KEY_RAW_BUTTONS] {
            assert!(RESERVED_KEYS.contains(&key));
        }
    }
}
