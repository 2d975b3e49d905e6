//! Semantic robot actions and the groups that combine them.

use super::MappingError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Semantic control signal, independent of the physical gamepad layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKey {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Use,
    Lights,
    CameraPan,
    CameraTilt,
}

/// Which physical control types an action accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Button,
    Axis,
    Either,
}

/// Static descriptor of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionInfo {
    pub key: ActionKey,
    pub kind: ActionKind,
}

/// The global action set, in processing order.
pub const ACTIONS: [ActionInfo; 8] = [
    ActionInfo { key: ActionKey::Forward, kind: ActionKind::Either },
    ActionInfo { key: ActionKey::Backward, kind: ActionKind::Either },
    ActionInfo { key: ActionKey::TurnLeft, kind: ActionKind::Either },
    ActionInfo { key: ActionKey::TurnRight, kind: ActionKind::Either },
    ActionInfo { key: ActionKey::Use, kind: ActionKind::Button },
    ActionInfo { key: ActionKey::Lights, kind: ActionKind::Button },
    ActionInfo { key: ActionKey::CameraPan, kind: ActionKind::Axis },
    ActionInfo { key: ActionKey::CameraTilt, kind: ActionKind::Axis },
];

impl ActionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKey::Forward => "forward",
            ActionKey::Backward => "backward",
            ActionKey::TurnLeft => "turn_left",
            ActionKey::TurnRight => "turn_right",
            ActionKey::Use => "use",
            ActionKey::Lights => "lights",
            ActionKey::CameraPan => "camera_pan",
            ActionKey::CameraTilt => "camera_tilt",
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActionKey::Forward | ActionKey::Backward | ActionKey::TurnLeft | ActionKey::TurnRight => {
                ActionKind::Either
            }
            ActionKey::Use | ActionKey::Lights => ActionKind::Button,
            ActionKey::CameraPan | ActionKey::CameraTilt => ActionKind::Axis,
        }
    }

    pub fn info(&self) -> ActionInfo {
        ActionInfo {
            key: *self,
            kind: self.kind(),
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKey {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ACTIONS
            .iter()
            .map(|info| info.key)
            .find(|key| key.as_str() == s)
            .ok_or_else(|| MappingError::UnknownAction(s.to_string()))
    }
}

/// A named set of actions processed together.
///
/// Two actions form an opposing pair and collapse into one signed value;
/// any other size is processed action by action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionGroup {
    pub key: String,
    pub actions: Vec<ActionKey>,
}

impl ActionGroup {
    pub fn new(key: impl Into<String>, actions: Vec<ActionKey>) -> Self {
        Self {
            key: key.into(),
            actions,
        }
    }

    pub fn opposing_pair(&self) -> Option<(ActionKey, ActionKey)> {
        match self.actions.as_slice() {
            [positive, negative] => Some((*positive, *negative)),
            _ => None,
        }
    }
}

/// Snapshot keys that no group may use.
pub const RESERVED_KEYS: [&str; 4] = ["timestamp", "connected", "_raw_axes", "_raw_buttons"];

/// Validated group list: keys are unique, reserved keys and action names are
/// not used as group keys, and no action belongs to two groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionGroups {
    groups: Vec<ActionGroup>,
}

impl ActionGroups {
    pub fn new(groups: Vec<ActionGroup>) -> Result<Self, MappingError> {
        let mut keys = HashSet::new();
        let mut owners: HashMap<ActionKey, String> = HashMap::new();

        for group in &groups {
            if RESERVED_KEYS.contains(&group.key.as_str()) || group.key.parse::<ActionKey>().is_ok() {
                return Err(MappingError::ReservedGroupKey(group.key.clone()));
            }
            if !keys.insert(group.key.clone()) {
                return Err(MappingError::DuplicateGroup(group.key.clone()));
            }
            let mut seen = HashSet::new();
            for action in &group.actions {
                if !seen.insert(*action) {
                    return Err(MappingError::RepeatedAction {
                        group: group.key.clone(),
                        action: *action,
                    });
                }
                if let Some(first) = owners.insert(*action, group.key.clone()) {
                    return Err(MappingError::OverlappingGroups {
                        action: *action,
                        first,
                        second: group.key.clone(),
                    });
                }
            }
        }

        Ok(Self { groups })
    }

    /// The drive groups every snapshot carries: `speed` and `turn`.
    pub fn default_drive() -> Self {
        Self {
            groups: vec![
                ActionGroup::new("speed", vec![ActionKey::Forward, ActionKey::Backward]),
                ActionGroup::new("turn", vec![ActionKey::TurnRight, ActionKey::TurnLeft]),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionGroup> {
        self.groups.iter()
    }

    pub fn as_slice(&self) -> &[ActionGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
