//! Mapping store: which physical control each action is bound to.

use super::actions::{ActionKey, ActionKind};
use super::MappingError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Index value marking an action as unbound in persisted mappings.
pub const UNBOUND_INDEX: i32 = -1;

/// Physical control type as stored in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Button,
    Axis,
}

/// Persisted binding in its flat form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub action: ActionKey,
    pub control_index: i32,
    pub control_kind: ControlKind,
}

/// Runtime binding of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Unbound,
    Button(usize),
    Axis(usize),
}

impl Control {
    pub fn from_parts(
        action: ActionKey,
        index: i32,
        kind: ControlKind,
    ) -> Result<Self, MappingError> {
        if index == UNBOUND_INDEX {
            return Ok(Control::Unbound);
        }
        let index = usize::try_from(index)
            .map_err(|_| MappingError::InvalidIndex { action, index })?;
        Ok(match kind {
            ControlKind::Button => Control::Button(index),
            ControlKind::Axis => Control::Axis(index),
        })
    }

    fn into_mapping(self, action: ActionKey) -> Mapping {
        let (control_index, control_kind) = match self {
            Control::Unbound => (UNBOUND_INDEX, ControlKind::Button),
            Control::Button(i) => (i as i32, ControlKind::Button),
            Control::Axis(i) => (i as i32, ControlKind::Axis),
        };
        Mapping {
            action,
            control_index,
            control_kind,
        }
    }
}

/// Checks the action kind against the control type.
///
/// `Button` actions only take buttons, `Axis` actions only take axes,
/// `Either` takes both. Unbound is always accepted.
fn check_kind(action: ActionKey, control: Control) -> Result<(), MappingError> {
    let kind = action.kind();
    match (kind, control) {
        (_, Control::Unbound)
        | (ActionKind::Button, Control::Button(_))
        | (ActionKind::Axis, Control::Axis(_))
        | (ActionKind::Either, Control::Button(_))
        | (ActionKind::Either, Control::Axis(_)) => Ok(()),
        (ActionKind::Button, Control::Axis(_)) => Err(MappingError::KindMismatch {
            action,
            kind,
            control: ControlKind::Axis,
        }),
        (ActionKind::Axis, Control::Button(_)) => Err(MappingError::KindMismatch {
            action,
            kind,
            control: ControlKind::Button,
        }),
    }
}

/// At most one binding per action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingStore {
    bindings: BTreeMap<ActionKey, Control>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the store from persisted mappings, rejecting duplicates and
    /// illegal kind combinations.
    pub fn from_mappings(mappings: &[Mapping]) -> Result<Self, MappingError> {
        let mut store = Self::new();
        for mapping in mappings {
            if store.bindings.contains_key(&mapping.action) {
                return Err(MappingError::DuplicateMapping(mapping.action));
            }
            let control =
                Control::from_parts(mapping.action, mapping.control_index, mapping.control_kind)?;
            store.bind(mapping.action, control)?;
        }
        debug!("Loaded {} mappings", store.bindings.len());
        Ok(store)
    }

    /// D-pad drives, south button triggers `use`, right stick moves the camera.
    pub fn default_bindings() -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(ActionKey::Forward, Control::Button(12));
        bindings.insert(ActionKey::Backward, Control::Button(13));
        bindings.insert(ActionKey::TurnLeft, Control::Button(14));
        bindings.insert(ActionKey::TurnRight, Control::Button(15));
        bindings.insert(ActionKey::Use, Control::Button(0));
        bindings.insert(ActionKey::Lights, Control::Button(3));
        bindings.insert(ActionKey::CameraPan, Control::Axis(2));
        bindings.insert(ActionKey::CameraTilt, Control::Axis(3));
        Self { bindings }
    }

    /// Replaces the binding for `action`, returning the previous one.
    pub fn bind(
        &mut self,
        action: ActionKey,
        control: Control,
    ) -> Result<Option<Control>, MappingError> {
        check_kind(action, control)?;
        info!("Binding {} to {:?}", action, control);
        Ok(self.bindings.insert(action, control))
    }

    pub fn unbind(&mut self, action: ActionKey) -> Option<Control> {
        info!("Unbinding {}", action);
        self.bindings.insert(action, Control::Unbound)
    }

    pub fn get(&self, action: ActionKey) -> Option<Control> {
        self.bindings.get(&action).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn to_mappings(&self) -> Vec<Mapping> {
        self.bindings
            .iter()
            .map(|(action, control)| control.into_mapping(*action))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(action: ActionKey, index: i32, kind: ControlKind) -> Mapping {
        Mapping {
            action,
            control_index: index,
            control_kind: kind,
        }
    }

    #[test]
    fn test_minus_one_is_unbound() {
        let store =
            MappingStore::from_mappings(&[mapping(ActionKey::Use, -1, ControlKind::Button)])
                .unwrap();
        assert_eq!(store.get(ActionKey::Use), Some(Control::Unbound));
        assert_eq!(store.get(ActionKey::Lights), None);
    }

    #[test]
    fn test_duplicate_mapping_rejected() {
        let result = MappingStore::from_mappings(&[
            mapping(ActionKey::Forward, 1, ControlKind::Axis),
            mapping(ActionKey::Forward, 4, ControlKind::Button),
        ]);
        assert_eq!(result, Err(MappingError::DuplicateMapping(ActionKey::Forward)));
    }

    #[test]
    fn test_illegal_kind_combinations_rejected() {
        let mut store = MappingStore::new();
        assert!(matches!(
            store.bind(ActionKey::Use, Control::Axis(0)),
            Err(MappingError::KindMismatch { .. })
        ));
        assert!(matches!(
            store.bind(ActionKey::CameraPan, Control::Button(0)),
            Err(MappingError::KindMismatch { .. })
        ));
        assert!(store.bind(ActionKey::Forward, Control::Axis(1)).is_ok());
        assert!(store.bind(ActionKey::Backward, Control::Button(6)).is_ok());
    }

    #[test]
    fn test_negative_index_other_than_unbound_rejected() {
        let result =
            MappingStore::from_mappings(&[mapping(ActionKey::Forward, -3, ControlKind::Axis)]);
        assert_eq!(
            result,
            Err(MappingError::InvalidIndex {
                action: ActionKey::Forward,
                index: -3
            })
        );
    }

    #[test]
    fn test_to_mappings_keeps_flat_shape() {
        let mut store = MappingStore::default_bindings();
        store.unbind(ActionKey::Lights);
        let mappings = store.to_mappings();
        let restored = MappingStore::from_mappings(&mappings).unwrap();
        assert_eq!(restored, store);
        assert!(mappings
            .iter()
            .any(|m| m.action == ActionKey::Lights && m.control_index == UNBOUND_INDEX));
    }
}
