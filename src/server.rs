//! ChatServer Actor implementation
//!
//! The session registry. One actor task owns the session table and handles
//! `ServerCommand`s one at a time, so every registry operation is atomic
//! with respect to every other. Sessions talk to it through a
//! [`RegistryHandle`].

use std::collections::BTreeMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::client::Client;
use crate::error::AppError;
use crate::message::ServerMessage;
use crate::types::SessionId;

/// Channel buffer size for registry commands
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Commands sent from sessions to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Admit a new connection under the connection limit
    Register {
        sender: mpsc::UnboundedSender<ServerMessage>,
        reply: oneshot::Sender<Result<SessionId, AppError>>,
    },
    /// Remove a session (no-op if already gone)
    Unregister {
        session_id: SessionId,
        reply: oneshot::Sender<()>,
    },
    /// Check whether a name is in use
    IsNameTaken {
        name: String,
        reply: oneshot::Sender<bool>,
    },
    /// Claim a name if nobody holds it
    SetName {
        session_id: SessionId,
        name: String,
        reply: oneshot::Sender<bool>,
    },
    /// Send to everyone but the speaker
    Broadcast {
        session_id: SessionId,
        message: String,
    },
    /// Send to one session by name
    Whisper {
        session_id: SessionId,
        to: String,
        message: String,
    },
    /// Snapshot of all display names
    ListNames {
        reply: oneshot::Sender<Vec<String>>,
    },
    /// Number of registered sessions
    ConnectionCount {
        reply: oneshot::Sender<usize>,
    },
}

/// The main ChatServer actor
///
/// Sessions are kept in a `BTreeMap` so id allocation and fan-out both walk
/// ids in ascending order.
pub struct ChatServer {
    /// All registered sessions: SessionId -> Client
    clients: BTreeMap<SessionId, Client>,
    /// Admission limit
    max_connections: usize,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, max_connections: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            max_connections,
            receiver,
        }
    }

    /// Start the actor on the current runtime and return a handle to it
    pub fn spawn(max_connections: usize) -> RegistryHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        tokio::spawn(ChatServer::new(cmd_rx, max_connections).run());
        RegistryHandle::new(cmd_tx)
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all handles are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Register { sender, reply } => {
                let _ = reply.send(self.register(sender));
            }
            ServerCommand::Unregister { session_id, reply } => {
                self.unregister(session_id);
                let _ = reply.send(());
            }
            ServerCommand::IsNameTaken { name, reply } => {
                let _ = reply.send(self.is_name_taken(&name));
            }
            ServerCommand::SetName {
                session_id,
                name,
                reply,
            } => {
                let _ = reply.send(self.set_name(session_id, name));
            }
            ServerCommand::Broadcast {
                session_id,
                message,
            } => {
                self.broadcast_excluding(session_id, message);
            }
            ServerCommand::Whisper {
                session_id,
                to,
                message,
            } => {
                self.whisper(session_id, &to, message);
            }
            ServerCommand::ListNames { reply } => {
                let _ = reply.send(self.list_names());
            }
            ServerCommand::ConnectionCount { reply } => {
                let _ = reply.send(self.clients.len());
            }
        }
    }

    /// Smallest id not currently registered
    ///
    /// Linear scan over the ascending keys; fine for interactive chat loads.
    fn next_free_id(&self) -> SessionId {
        let mut candidate = SessionId(0);
        for &id in self.clients.keys() {
            if id != candidate {
                break;
            }
            candidate = candidate.next();
        }
        candidate
    }

    /// Handle admission of a new connection
    fn register(
        &mut self,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<SessionId, AppError> {
        if self.clients.len() >= self.max_connections {
            debug!("Refusing registration, {} clients connected", self.clients.len());
            return Err(AppError::ServerFull(self.max_connections));
        }

        let session_id = self.next_free_id();
        self.clients.insert(session_id, Client::new(session_id, sender));

        info!("Client {} registered", session_id);
        debug!("Total clients: {}", self.clients.len());

        Ok(session_id)
    }

    /// Handle session removal
    fn unregister(&mut self, session_id: SessionId) {
        let Some(client) = self.clients.remove(&session_id) else {
            return;
        };

        info!("Client {} ({}) has disconnected", session_id, client.listed_name());
        debug!("Total clients: {}", self.clients.len());
    }

    fn is_name_taken(&self, name: &str) -> bool {
        self.clients.values().any(|client| client.is_named(name))
    }

    /// Check-and-set a display name in one step
    fn set_name(&mut self, session_id: SessionId, name: String) -> bool {
        if self.is_name_taken(&name) {
            return false;
        }

        let Some(client) = self.clients.get_mut(&session_id) else {
            return false;
        };

        info!("Client {} set name to '{}'", session_id, name);
        client.set_display_name(name);
        true
    }

    /// Name a session speaks under, for relayed messages
    fn speaker_name(&self, session_id: SessionId) -> String {
        match self.clients.get(&session_id) {
            Some(client) => client.speaker_name(),
            None => format!("Someone {}", session_id),
        }
    }

    /// Handle a chat line: deliver to everyone except the speaker
    fn broadcast_excluding(&self, session_id: SessionId, message: String) {
        let msg = ServerMessage::Said {
            from: self.speaker_name(session_id),
            message,
        };

        debug!(
            "Client {} broadcasting to {} others",
            session_id,
            self.clients.len().saturating_sub(1)
        );

        for client in self.clients.values().filter(|c| c.id != session_id) {
            if client.send(msg.clone()).is_err() {
                debug!("Client {} is no longer connected, skipping", client.id);
            }
        }
    }

    /// Handle a private message
    fn whisper(&self, session_id: SessionId, to: &str, message: String) {
        let Some(target) = self.clients.values().find(|c| c.is_named(to)) else {
            debug!("Client {} whispered to unknown name '{}'", session_id, to);
            return;
        };

        let msg = ServerMessage::Said {
            from: self.speaker_name(session_id),
            message,
        };

        if target.send(msg).is_err() {
            debug!("Client {} is no longer connected, whisper dropped", target.id);
        }
    }

    /// Owned snapshot of every display name
    fn list_names(&self) -> Vec<String> {
        self.clients
            .values()
            .map(|client| client.listed_name().to_string())
            .collect()
    }
}

/// Cloneable capability to the registry's operations
///
/// Every method is one round trip through the actor, so calls made from a
/// single session are applied in the order they were issued.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<ServerCommand>,
}

impl RegistryHandle {
    /// Wrap an existing command channel
    pub fn new(sender: mpsc::Sender<ServerCommand>) -> Self {
        Self { sender }
    }

    async fn send(&self, cmd: ServerCommand) -> Result<(), AppError> {
        self.sender.send(cmd).await.map_err(|_| AppError::ChannelSend)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ServerCommand,
    ) -> Result<T, AppError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx)).await?;
        reply_rx.await.map_err(|_| AppError::ChannelSend)
    }

    /// Register a session, returning its id
    ///
    /// Fails with `AppError::ServerFull` when the connection limit is reached.
    pub async fn register(
        &self,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<SessionId, AppError> {
        self.request(|reply| ServerCommand::Register { sender, reply })
            .await?
    }

    /// Remove a session; safe to call more than once
    pub async fn unregister(&self, session_id: SessionId) -> Result<(), AppError> {
        self.request(|reply| ServerCommand::Unregister { session_id, reply })
            .await
    }

    pub async fn is_name_taken(&self, name: &str) -> Result<bool, AppError> {
        let name = name.to_string();
        self.request(|reply| ServerCommand::IsNameTaken { name, reply })
            .await
    }

    /// Claim `name` for the session; `false` if it is already taken
    pub async fn set_name(&self, session_id: SessionId, name: &str) -> Result<bool, AppError> {
        let name = name.to_string();
        self.request(|reply| ServerCommand::SetName {
            session_id,
            name,
            reply,
        })
        .await
    }

    pub async fn broadcast_excluding(
        &self,
        session_id: SessionId,
        message: String,
    ) -> Result<(), AppError> {
        self.send(ServerCommand::Broadcast {
            session_id,
            message,
        })
        .await
    }

    /// Private message; unknown recipients are ignored
    pub async fn whisper(
        &self,
        session_id: SessionId,
        to: String,
        message: String,
    ) -> Result<(), AppError> {
        self.send(ServerCommand::Whisper {
            session_id,
            to,
            message,
        })
        .await
    }

    /// Names in id order, "Guest" for unnamed sessions
    pub async fn list_names(&self) -> Result<Vec<String>, AppError> {
        self.request(|reply| ServerCommand::ListNames { reply }).await
    }

    pub async fn connection_count(&self) -> Result<usize, AppError> {
        self.request(|reply| ServerCommand::ConnectionCount { reply })
            .await
    }
}
