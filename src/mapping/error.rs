//! Error definitions for the mapping module

use super::actions::{ActionKey, ActionKind};
use super::store::ControlKind;
use thiserror::Error;

/// Errors raised while building or editing mapping configuration.
///
/// Resolution itself never fails: these only surface when configuration is
/// loaded or edited by the user.
#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    /// The same action appears more than once in the mapping list
    #[error("Duplicate mapping for action: {0}")]
    DuplicateMapping(ActionKey),

    /// The action's declared kind does not accept this control type
    #[error("Action {action} ({kind:?}) cannot be bound to a {control:?} control")]
    KindMismatch {
        action: ActionKey,
        kind: ActionKind,
        control: ControlKind,
    },

    /// A negative control index other than the unbound marker
    #[error("Invalid control index {index} for action {action}")]
    InvalidIndex { action: ActionKey, index: i32 },

    /// An action belongs to more than one group
    #[error("Action {action} is claimed by groups {first} and {second}")]
    OverlappingGroups {
        action: ActionKey,
        first: String,
        second: String,
    },

    /// Two groups share the same key
    #[error("Duplicate group key: {0}")]
    DuplicateGroup(String),

    /// A group lists the same action twice
    #[error("Group {group} lists action {action} more than once")]
    RepeatedAction { group: String, action: ActionKey },

    /// A group key that would overwrite a fixed snapshot entry or an action
    #[error("Group key {0:?} is reserved")]
    ReservedGroupKey(String),

    /// A textual action key did not match any known action
    #[error("Unknown action: {0}")]
    UnknownAction(String),
}
