//! Line protocol definitions
//!
//! Client lines are either plain chat text or commands starting with `:`.
//! Server lines are human-readable strings produced by `ServerMessage`'s
//! `Display` impl; the writer task appends the newline.

use std::fmt;

use crate::error::AppError;

/// Every command starts with this character
pub const COMMAND_PREFIX: char = ':';

const MEET_COMMAND: &str = ":meet";
const WHO_COMMAND: &str = ":who";
const QUIT_COMMAND: &str = ":quit";
const WHISPER_COMMAND: &str = ":whisper";

/// Label in front of the `:who` listing
pub const NAMES_LABEL: &str = "The names are: ";

/// Separator between names in the `:who` listing
pub const NAMES_SEPARATOR: &str = "  ---  ";

/// Client → Server line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    /// Plain text, broadcast to everyone else
    Chat(String),
    /// `:meet<name>` - claim or change the display name
    Meet(String),
    /// `:who` - list connected names
    Who,
    /// `:quit` - leave the server
    Quit,
    /// `:whisper<name>,<message>` - private message
    Whisper { to: String, message: String },
}

impl ClientLine {
    /// Parse one input line
    ///
    /// Protocol errors come back as the `AppError` the client should be
    /// told about.
    pub fn parse(line: &str) -> Result<Self, AppError> {
        if !line.starts_with(COMMAND_PREFIX) {
            return Ok(Self::Chat(line.to_string()));
        }

        if let Some(name) = line.strip_prefix(MEET_COMMAND) {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::InvalidName);
            }
            return Ok(Self::Meet(name.to_string()));
        }

        if let Some(rest) = line.strip_prefix(WHISPER_COMMAND) {
            return parse_whisper(rest);
        }

        match line.trim_end() {
            WHO_COMMAND => Ok(Self::Who),
            QUIT_COMMAND => Ok(Self::Quit),
            _ => Err(AppError::UnknownCommand),
        }
    }
}

/// Split `<name>,<message>` on a single run of commas
///
/// Every comma run separates, so a second run in the message makes more
/// than two parts and the command is invalid.
fn parse_whisper(rest: &str) -> Result<ClientLine, AppError> {
    let Some((to, message)) = rest.split_once(',') else {
        return Err(AppError::InvalidCommand);
    };
    let to = to.trim();
    let message = message.trim_start_matches(',').trim_end_matches(',');

    if to.is_empty() || message.is_empty() || message.contains(',') {
        return Err(AppError::InvalidCommand);
    }

    Ok(ClientLine::Whisper {
        to: to.to_string(),
        message: message.to_string(),
    })
}

/// Server → Client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// First line after connecting
    Welcome(String),
    /// Chat text relayed from another session
    Said { from: String, message: String },
    /// Reply to `:who`
    Names(Vec<String>),
    /// `:meet` with a name someone else holds
    NameTaken,
    /// Anything but a usable `:meet` during negotiation
    InvalidName,
    /// Unrecognized command keyword
    UnknownCommand,
    /// Malformed command arguments
    InvalidCommand,
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welcome(text) => f.write_str(text),
            Self::Said { from, message } => write!(f, "{} said: {}", from, message),
            Self::Names(names) => write!(f, "{}{}", NAMES_LABEL, names.join(NAMES_SEPARATOR)),
            Self::NameTaken => f.write_str("Name is already taken. Try with another name."),
            Self::InvalidName => {
                f.write_str("Invalid name or Name is already taken. Try with another name.")
            }
            Self::UnknownCommand => f.write_str("Unknown command!"),
            Self::InvalidCommand => f.write_str("Invalid command!"),
        }
    }
}

/// Convert AppError to ServerMessage for client notification
///
/// Only protocol errors have a reply line; fatal errors are handed back
/// (the connection closes instead).
impl TryFrom<AppError> for ServerMessage {
    type Error = AppError;

    fn try_from(err: AppError) -> Result<Self, Self::Error> {
        match err {
            AppError::NameTaken => Ok(ServerMessage::NameTaken),
            AppError::InvalidName => Ok(ServerMessage::InvalidName),
            AppError::InvalidCommand => Ok(ServerMessage::InvalidCommand),
            AppError::UnknownCommand => Ok(ServerMessage::UnknownCommand),
            AppError::Io(_) | AppError::ChannelSend | AppError::ServerFull(_) => Err(err),
        }
    }
}
