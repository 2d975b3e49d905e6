//! Resolves one action against the raw device state.
//!
//! Resolution is total: missing bindings, unbound actions and indices past
//! the end of the device arrays all collapse to defaults, so a snapshot can
//! be built on every tick regardless of hardware state.

use super::actions::{ActionKey, ActionKind};
use super::store::{Control, MappingStore};
use crate::controller::device::RawDeviceState;

/// Value of a single action for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedValue {
    Unbound,
    Button(bool),
    Axis(f32),
}

impl ResolvedValue {
    /// Numeric view used when combining opposing pairs.
    pub fn normalized(&self) -> f32 {
        match self {
            ResolvedValue::Unbound => 0.0,
            ResolvedValue::Button(true) => 1.0,
            ResolvedValue::Button(false) => 0.0,
            ResolvedValue::Axis(value) => *value,
        }
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self, ResolvedValue::Unbound)
    }
}

fn read_button(raw: &RawDeviceState, index: usize) -> ResolvedValue {
    ResolvedValue::Button(raw.buttons.get(index).copied().unwrap_or(false))
}

fn read_axis(raw: &RawDeviceState, index: usize) -> ResolvedValue {
    let value = raw.axes.get(index).copied().unwrap_or(0.0);
    let value = if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    };
    ResolvedValue::Axis(value)
}

/// Resolves `action` through its binding.
///
/// The action's declared kind decides which array is read; `Either` defers to
/// the bound control type.
pub fn resolve(action: ActionKey, control: Option<Control>, raw: &RawDeviceState) -> ResolvedValue {
    let (index, control_is_axis) = match control {
        None | Some(Control::Unbound) => return ResolvedValue::Unbound,
        Some(Control::Button(index)) => (index, false),
        Some(Control::Axis(index)) => (index, true),
    };

    match (action.kind(), control_is_axis) {
        (ActionKind::Button, _) | (ActionKind::Either, false) => read_button(raw, index),
        (ActionKind::Axis, _) | (ActionKind::Either, true) => read_axis(raw, index),
    }
}

/// Convenience wrapper looking the binding up in `store`.
pub fn resolve_in(store: &MappingStore, action: ActionKey, raw: &RawDeviceState) -> ResolvedValue {
    resolve(action, store.get(action), raw)
}

/// Rounds to two decimals, folding negative zero into zero.
pub fn round2(value: f32) -> f32 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Wire form of a signed scalar: two decimals, e.g. `"-0.50"`.
pub fn format_scalar(value: f32) -> String {
    format!("{:.2}", round2(value))
}
