//! Client struct definition
//!
//! The registry's record of a connected session: its id, display name and
//! the sending side of its outbound line queue.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::SessionId;

/// Placeholder shown by `:who` for sessions that have not named themselves
pub const GUEST_NAME: &str = "Guest";

/// Registered session information
///
/// The transport itself stays with the session task; the registry only
/// ever pushes lines into `sender`.
#[derive(Debug)]
pub struct Client {
    /// Registry key
    pub id: SessionId,
    /// Display name (None until negotiation succeeds)
    pub display_name: Option<String>,
    /// Server → Client line queue
    pub sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Client {
    /// Create a new unnamed client with the given ID and sender channel
    pub fn new(id: SessionId, sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id,
            display_name: None,
            sender,
        }
    }

    /// Queue a message for this client
    ///
    /// Returns an error if the writer has gone away (client disconnected).
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.send(msg).map_err(|_| SendError::ChannelClosed)
    }

    /// Name used when this client speaks
    ///
    /// Unnamed clients are "Someone <id>".
    pub fn speaker_name(&self) -> String {
        match &self.display_name {
            Some(name) => name.clone(),
            None => format!("Someone {}", self.id),
        }
    }

    /// Name shown in the `:who` listing
    pub fn listed_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(GUEST_NAME)
    }

    /// Check if this client currently holds `name`
    pub fn is_named(&self, name: &str) -> bool {
        self.display_name.as_deref() == Some(name)
    }

    /// Set the client's display name
    pub fn set_display_name(&mut self, name: String) {
        self.display_name = Some(name);
    }
}
