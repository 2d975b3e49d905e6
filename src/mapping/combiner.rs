//! Group combiner: collapses opposing pairs and passes the rest through.

use super::actions::{ActionGroups, ActionKey, ACTIONS};
use super::resolver::{resolve_in, round2, ResolvedValue};
use super::store::MappingStore;
use crate::controller::device::RawDeviceState;
use std::collections::HashSet;
use tracing::trace;

/// Output value for one snapshot key
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlValue {
    Flag(bool),
    Signed(f32),
}

/// Result of one combining pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Combined {
    /// Snapshot entries in processing order
    pub entries: Vec<(String, ControlValue)>,
    /// Every action touched by the pass, each exactly once
    pub processed: Vec<ActionKey>,
}

impl Combined {
    pub fn get(&self, key: &str) -> Option<ControlValue> {
        self.entries
            .iter()
            .find(|(entry_key, _)| entry_key == key)
            .map(|(_, value)| *value)
    }

    fn push_individual(&mut self, action: ActionKey, value: ResolvedValue) {
        self.processed.push(action);
        match value {
            ResolvedValue::Unbound => {}
            ResolvedValue::Button(pressed) => self
                .entries
                .push((action.as_str().to_string(), ControlValue::Flag(pressed))),
            ResolvedValue::Axis(value) => self
                .entries
                .push((action.as_str().to_string(), ControlValue::Signed(round2(value)))),
        }
    }
}

/// `normalized(positive) - normalized(negative)`, rounded to two decimals.
pub fn combine_pair(positive: ResolvedValue, negative: ResolvedValue) -> f32 {
    round2(positive.normalized() - negative.normalized())
}

/// Runs every group, then every action not claimed by a group.
pub fn combine(groups: &ActionGroups, store: &MappingStore, raw: &RawDeviceState) -> Combined {
    let mut combined = Combined::default();
    let mut done: HashSet<ActionKey> = HashSet::new();

    for group in groups.iter() {
        if let Some((positive, negative)) = group.opposing_pair() {
            let value = combine_pair(
                resolve_in(store, positive, raw),
                resolve_in(store, negative, raw),
            );
            trace!("Group {} ({} - {}) = {:.2}", group.key, positive, negative, value);
            combined
                .entries
                .push((group.key.clone(), ControlValue::Signed(value)));
            combined.processed.push(positive);
            combined.processed.push(negative);
            done.insert(positive);
            done.insert(negative);
        } else {
            for action in &group.actions {
                if done.insert(*action) {
                    combined.push_individual(*action, resolve_in(store, *action, raw));
                }
            }
        }
    }

    for info in ACTIONS.iter() {
        if done.insert(info.key) {
            combined.push_individual(info.key, resolve_in(store, info.key, raw));
        }
    }

    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::actions::ActionGroup;
    use crate::mapping::store::Control;

    fn store_with(bindings: &[(ActionKey, Control)]) -> MappingStore {
        let mut store = MappingStore::new();
        for (action, control) in bindings {
            store.bind(*action, *control).unwrap();
        }
        store
    }

    #[test]
    fn test_pair_over_all_kind_combinations() {
        let raw = RawDeviceState {
            buttons: vec![true, false],
            axes: vec![0.404, -0.5],
        };
        let cases = [
            (Control::Button(0), Control::Button(1), 1.0),
            (Control::Button(0), Control::Axis(1), 1.5),
            (Control::Axis(0), Control::Button(0), -0.6),
            (Control::Axis(0), Control::Axis(1), 0.9),
        ];
        for (positive, negative, expected) in cases {
            let store = store_with(&[(ActionKey::Forward, positive), (ActionKey::Backward, negative)]);
            let combined = combine(&ActionGroups::default_drive(), &store, &raw);
            match combined.get("speed") {
                Some(ControlValue::Signed(value)) => {
                    assert!((value - expected).abs() < 1e-6, "{value} != {expected}")
                }
                other => panic!("unexpected speed value {other:?}"),
            }
        }
    }

    #[test]
    fn test_every_action_processed_exactly_once() {
        let groups = ActionGroups::new(vec![
            ActionGroup::new("speed", vec![ActionKey::Forward, ActionKey::Backward]),
            ActionGroup::new(
                "tools",
                vec![ActionKey::Use, ActionKey::Lights, ActionKey::CameraPan],
            ),
        ])
        .unwrap();
        let combined = combine(&groups, &MappingStore::default_bindings(), &RawDeviceState::default());

        let mut processed = combined.processed.clone();
        processed.sort();
        let mut all: Vec<ActionKey> = ACTIONS.iter().map(|info| info.key).collect();
        all.sort();
        assert_eq!(processed, all);
    }

    #[test]
    fn test_ungrouped_actions_pass_through() {
        let raw = RawDeviceState {
            buttons: vec![true],
            axes: vec![0.0, 0.0, -0.333],
        };
        let store = store_with(&[
            (ActionKey::Use, Control::Button(0)),
            (ActionKey::CameraPan, Control::Axis(2)),
            (ActionKey::Lights, Control::Unbound),
        ]);
        let combined = combine(&ActionGroups::default_drive(), &store, &raw);

        assert_eq!(combined.get("use"), Some(ControlValue::Flag(true)));
        assert_eq!(combined.get("camera_pan"), Some(ControlValue::Signed(-0.33)));
        assert_eq!(combined.get("lights"), None);
        assert_eq!(combined.get("turn"), Some(ControlValue::Signed(0.0)));
    }

    #[test]
    fn test_no_groups_processes_everything_individually() {
        let combined = combine(
            &ActionGroups::default(),
            &MappingStore::new(),
            &RawDeviceState::default(),
        );
        assert_eq!(combined.processed.len(), ACTIONS.len());
        assert!(combined.entries.is_empty());
    }
}
