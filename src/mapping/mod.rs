//! Action mapping: from raw gamepad arrays to semantic robot controls.
//!
//! ```text
//! RawDeviceState ──► Resolver (per action) ──► Combiner (groups) ──► Combined
//!                        ▲
//!                  MappingStore
//! ```
//!
//! The store holds at most one binding per action; groups partition a subset
//! of the action set and everything else is resolved on its own.

pub mod actions;
pub mod combiner;
pub mod error;
pub mod resolver;
pub mod store;

pub use actions::{ActionGroup, ActionGroups, ActionInfo, ActionKey, ActionKind, ACTIONS, RESERVED_KEYS};
pub use combiner::{combine, Combined, ControlValue};
pub use error::MappingError;
pub use resolver::{resolve, ResolvedValue};
pub use store::{Control, ControlKind, Mapping, MappingStore};
