use std::str::FromStr;

use crate::dom::NodeId;
use crate::NotificationId;

/// Page visibility, mirrored from the host (terminal focus, window state).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// User intent delivered outside the page model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    MarkRead(NotificationId),
    Delete(NotificationId),
    MarkAllRead,
    Refresh,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command '{0}'")]
    Unknown(String),
    #[error("'{0}' needs a notification id")]
    MissingId(String),
    #[error("Invalid notification id '{0}'")]
    InvalidId(String),
}

impl FromStr for Command {
    type Err = CommandParseError;

    /// Parses `read <id>`, `delete <id>`, `read-all`, `refresh` and `quit`.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or(CommandParseError::Empty)?;
        let mut id = || {
            let raw = words
                .next()
                .ok_or_else(|| CommandParseError::MissingId(verb.to_string()))?;
            raw.parse::<NotificationId>()
                .map_err(|_| CommandParseError::InvalidId(raw.to_string()))
        };
        match verb {
            "read" | "mark-read" => Ok(Self::MarkRead(id()?)),
            "delete" | "rm" => Ok(Self::Delete(id()?)),
            "read-all" | "mark-all-read" => Ok(Self::MarkAllRead),
            "refresh" => Ok(Self::Refresh),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(CommandParseError::Unknown(other.to_string())),
        }
    }
}

/// Everything the client loop reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// The poll timer fired.
    PollTick,
    VisibilityChanged(Visibility),
    /// A page element was activated.
    Click(NodeId),
    PushOpened,
    /// Raw text of one push-channel message.
    PushMessage(String),
    PushClosed,
    Command(Command),
    Shutdown,
}
