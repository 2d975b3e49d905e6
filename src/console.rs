//! Line commands accepted by the console binary.

use crate::mapping::{ActionKey, Control, ControlKind, MappingError};
use std::str::FromStr;
use thiserror::Error;

pub const HELP: &str = "\
commands:
  devices                          list connected gamepads
  device <id>|none                 select the gamepad to sample
  sounds                           list trigger sounds
  sound <name>|none                select the trigger sound
  talk                             toggle microphone transmit
  mappings                         show action bindings
  bind <action> button|axis <i>    bind an action to a control
  unbind <action>                  clear an action binding
  save                             write the configuration file
  quit                             stop the console";

#[derive(Debug, Error, PartialEq)]
pub enum ConsoleError {
    #[error("Unknown command {0:?}, type `help`")]
    UnknownCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Unexpected argument {0:?}")]
    UnexpectedArgument(String),

    #[error("Invalid control kind {0:?}, expected `button` or `axis`")]
    InvalidKind(String),

    #[error("Invalid control index {0:?}")]
    InvalidIndex(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Devices,
    SelectDevice(Option<String>),
    Sounds,
    SelectSound(Option<String>),
    Talk,
    Mappings,
    Bind(ActionKey, Control),
    Unbind(ActionKey),
    Save,
    Quit,
}

impl FromStr for Command {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(Command::Help);
        };

        let command = match name {
            "help" | "?" => Command::Help,
            "devices" => Command::Devices,
            "device" => Command::SelectDevice(optional(words.next(), "device id")?),
            "sounds" => Command::Sounds,
            "sound" => Command::SelectSound(optional(words.next(), "sound name")?),
            "talk" => Command::Talk,
            "mappings" => Command::Mappings,
            "bind" => {
                let action: ActionKey = words
                    .next()
                    .ok_or(ConsoleError::MissingArgument("action"))?
                    .parse()?;
                let kind = match words.next() {
                    Some("button") => ControlKind::Button,
                    Some("axis") => ControlKind::Axis,
                    Some(other) => return Err(ConsoleError::InvalidKind(other.to_string())),
                    None => return Err(ConsoleError::MissingArgument("control kind")),
                };
                let index = words.next().ok_or(ConsoleError::MissingArgument("index"))?;
                let index: i32 = index
                    .parse()
                    .map_err(|_| ConsoleError::InvalidIndex(index.to_string()))?;
                Command::Bind(action, Control::from_parts(action, index, kind)?)
            }
            "unbind" => Command::Unbind(
                words
                    .next()
                    .ok_or(ConsoleError::MissingArgument("action"))?
                    .parse()?,
            ),
            "save" => Command::Save,
            "quit" | "exit" => Command::Quit,
            other => return Err(ConsoleError::UnknownCommand(other.to_string())),
        };

        match words.next() {
            Some(extra) => Err(ConsoleError::UnexpectedArgument(extra.to_string())),
            None => Ok(command),
        }
    }
}

// `none` clears the selection
fn optional(word: Option<&str>, what: &'static str) -> Result<Option<String>, ConsoleError> {
    match word {
        Some("none") => Ok(None),
        Some(value) => Ok(Some(value.to_string())),
        None => Err(ConsoleError::MissingArgument(what)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection_commands() {
        assert_eq!(
            "device 3".parse::<Command>().unwrap(),
            Command::SelectDevice(Some("3".to_string()))
        );
        assert_eq!("device none".parse::<Command>().unwrap(), Command::SelectDevice(None));
        assert_eq!(
            "  sound   horn ".parse::<Command>().unwrap(),
            Command::SelectSound(Some("horn".to_string()))
        );
        assert_eq!("".parse::<Command>().unwrap(), Command::Help);
        assert_eq!(
            "sound".parse::<Command>(),
            Err(ConsoleError::MissingArgument("sound name"))
        );
    }

    #[test]
    fn test_parse_bind() {
        assert_eq!(
            "bind camera_pan axis 0".parse::<Command>().unwrap(),
            Command::Bind(ActionKey::CameraPan, Control::Axis(0))
        );
        assert_eq!(
            "bind forward button -1".parse::<Command>().unwrap(),
            Command::Bind(ActionKey::Forward, Control::Unbound)
        );
        assert_eq!(
            "unbind lights".parse::<Command>().unwrap(),
            Command::Unbind(ActionKey::Lights)
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "bind jump button 1".parse::<Command>(),
            Err(ConsoleError::Mapping(MappingError::UnknownAction(_)))
        ));
        assert_eq!(
            "bind use trigger 1".parse::<Command>(),
            Err(ConsoleError::InvalidKind("trigger".to_string()))
        );
        assert_eq!(
            "bind use button x".parse::<Command>(),
            Err(ConsoleError::InvalidIndex("x".to_string()))
        );
        assert!(matches!(
            "bind use button -4".parse::<Command>(),
            Err(ConsoleError::Mapping(MappingError::InvalidIndex { .. }))
        ));
        assert_eq!(
            "talk now".parse::<Command>(),
            Err(ConsoleError::UnexpectedArgument("now".to_string()))
        );
        assert_eq!(
            "fly".parse::<Command>(),
            Err(ConsoleError::UnknownCommand("fly".to_string()))
        );
    }
}
