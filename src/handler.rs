//! Per-connection session handler
//!
//! Runs the line-protocol state machine for one client: welcome line, name
//! negotiation, then chat and command dispatch. Every effect on other
//! clients goes through the [`RegistryHandle`].

use std::sync::Arc;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::message::{ClientLine, ServerMessage};
use crate::server::RegistryHandle;
use crate::types::SessionId;

/// Longest input line kept; the rest of an overlong line is discarded
pub const MAX_LINE_BYTES: usize = 4096;

/// Protocol state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport not yet open
    Connecting,
    /// Waiting for a successful `:meet`
    Negotiating,
    /// Named; chatting and issuing commands
    Active,
    /// Teardown requested
    Closing,
    /// Unregistered and transport closed
    Closed,
}

/// One connected client's protocol state
///
/// Owns this session's copy of the outbound queue; the writer task ends once
/// the session and the registry have both dropped their senders.
pub struct Session {
    id: SessionId,
    display_name: Option<String>,
    state: SessionState,
    connected: bool,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    registry: RegistryHandle,
}

impl Session {
    /// Create a session for an already registered id
    pub fn new(
        id: SessionId,
        outbound: mpsc::UnboundedSender<ServerMessage>,
        registry: RegistryHandle,
    ) -> Self {
        Self {
            id,
            display_name: None,
            state: SessionState::Connecting,
            connected: false,
            outbound,
            registry,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Transport is open, start negotiating
    pub fn open(&mut self) {
        self.connected = true;
        self.state = SessionState::Negotiating;
    }

    /// Queue a line for this client; no-op once disconnected
    pub fn send(&self, msg: ServerMessage) {
        if !self.connected {
            return;
        }
        if self.outbound.send(msg).is_err() {
            debug!("Client {} writer is gone, dropping reply", self.id);
        }
    }

    /// Answer a protocol error on the wire
    ///
    /// Fatal errors have no reply line and are returned instead.
    fn reply(&self, err: AppError) -> Result<(), AppError> {
        self.send(ServerMessage::try_from(err)?);
        Ok(())
    }

    /// Process one input line
    ///
    /// Protocol mistakes are answered on the wire; only a broken registry
    /// comes back as an error.
    pub async fn handle_line(&mut self, line: &str) -> Result<(), AppError> {
        match self.state {
            SessionState::Negotiating => self.negotiate(line).await,
            SessionState::Active => self.dispatch(line).await,
            _ => Ok(()),
        }
    }

    /// Negotiating: only `:meet` (and `:quit`) are accepted
    async fn negotiate(&mut self, line: &str) -> Result<(), AppError> {
        match ClientLine::parse(line) {
            Ok(ClientLine::Meet(name)) => {
                if self.claim_name(name).await? {
                    self.state = SessionState::Active;
                    Ok(())
                } else {
                    self.reply(AppError::NameTaken)
                }
            }
            Ok(ClientLine::Quit) => self.quit().await,
            _ => self.reply(AppError::InvalidName),
        }
    }

    /// Active: chat text or a command
    async fn dispatch(&mut self, line: &str) -> Result<(), AppError> {
        let parsed = match ClientLine::parse(line) {
            Ok(parsed) => parsed,
            // A failed :meet in the chat answers "taken", empty names included
            Err(AppError::InvalidName) => return self.reply(AppError::NameTaken),
            Err(err) => {
                debug!("Client {} sent bad command: {}", self.id, err);
                return self.reply(err);
            }
        };

        match parsed {
            ClientLine::Chat(text) => {
                self.registry.broadcast_excluding(self.id, text).await?;
            }
            ClientLine::Meet(name) => {
                if !self.claim_name(name).await? {
                    self.reply(AppError::NameTaken)?;
                }
            }
            ClientLine::Who => {
                let names = self.registry.list_names().await?;
                self.send(ServerMessage::Names(names));
            }
            ClientLine::Quit => self.quit().await?,
            ClientLine::Whisper { to, message } => {
                self.registry.whisper(self.id, to, message).await?;
            }
        }
        Ok(())
    }

    /// Ask the registry for `name`; remember it locally on success
    async fn claim_name(&mut self, name: String) -> Result<bool, AppError> {
        if !self.registry.set_name(self.id, &name).await? {
            debug!("Client {} asked for taken name '{}'", self.id, name);
            return Ok(false);
        }

        match self.display_name.replace(name) {
            Some(old) => info!("Client {} renamed from '{}'", self.id, old),
            None => info!("Client {} joined the chat", self.id),
        }
        Ok(true)
    }

    /// `:quit` - leave the registry right away, teardown follows
    async fn quit(&mut self) -> Result<(), AppError> {
        self.state = SessionState::Closing;
        self.registry.unregister(self.id).await
    }

    /// Closing → Closed, exactly once
    ///
    /// Unregisters before the caller closes the transport.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;
        self.connected = false;

        if let Err(e) = self.registry.unregister(self.id).await {
            warn!("Failed to unregister client {}: {}", self.id, e);
        }

        self.state = SessionState::Closed;
    }
}

/// Serve one accepted connection until it closes
///
/// Registers with the registry first; a full server closes the stream
/// without ever creating a session.
pub async fn handle_connection<S>(
    stream: S,
    registry: RegistryHandle,
    welcome: Arc<str>,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (msg_tx, msg_rx) = mpsc::unbounded_channel::<ServerMessage>();
    // Queued before registering so nothing relayed can overtake it
    let _ = msg_tx.send(ServerMessage::Welcome(welcome.to_string()));

    let session_id = registry.register(msg_tx.clone()).await?;
    info!("A new client {} has connected to the server", session_id);

    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);

    let mut write_task = tokio::spawn(write_lines(writer, msg_rx, session_id));

    let mut session = Session::new(session_id, msg_tx, registry);
    session.open();

    let mut writer_done = false;
    while session.state() != SessionState::Closing {
        tokio::select! {
            line = read_line(&mut reader, &mut buf) => match line {
                Ok(Some(line)) => {
                    debug!("Client {} sent {} bytes", session_id, line.len());
                    if let Err(e) = session.handle_line(&line).await {
                        warn!("Client {} registry call failed: {}", session_id, e);
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Client {} closed the connection", session_id);
                    break;
                }
                Err(e) => {
                    debug!("Read error for client {}: {}", session_id, e);
                    break;
                }
            },
            _ = &mut write_task => {
                debug!("Write task ended early for client {}", session_id);
                writer_done = true;
                break;
            }
        }
    }

    session.close().await;
    let name = session.display_name().unwrap_or("unnamed").to_string();
    // Dropping the session drops its sender, letting the writer drain and shut down
    drop(session);
    drop(reader);

    if !writer_done {
        if let Err(e) = write_task.await {
            warn!("Write task for client {} panicked: {}", session_id, e);
        }
    }

    info!("Client {} ({}) disconnected", session_id, name);
    Ok(())
}

/// Read one newline-terminated line
///
/// Bytes that are not valid UTF-8 are replaced rather than treated as a
/// transport error. Lines longer than [`MAX_LINE_BYTES`] are cut at the
/// limit. `None` means end of stream.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', buf)
        .await?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() == MAX_LINE_BYTES {
        skip_rest_of_line(reader).await?;
    }

    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Discard input up to and including the next newline
async fn skip_rest_of_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}

/// Drain the outbound queue onto the transport
///
/// Ends on the first write failure or once every sender is dropped, then
/// shuts the write half down.
async fn write_lines<W>(
    mut writer: W,
    mut msg_rx: mpsc::UnboundedReceiver<ServerMessage>,
    session_id: SessionId,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = msg_rx.recv().await {
        let mut line = msg.to_string();
        line.push('\n');
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!("Write failed for client {}: {}", session_id, e);
            break;
        }
        if let Err(e) = writer.flush().await {
            debug!("Flush failed for client {}: {}", session_id, e);
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown failed for client {}: {}", session_id, e);
    }
    debug!("Write task ended for client {}", session_id);
}
