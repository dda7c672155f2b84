//! Error types for the chat server
//!
//! Defines application-level errors, message send errors and
//! configuration errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// protocol errors (reply line sent to the client, session continues).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal for the connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry actor is gone (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Admission control rejected the connection
    #[error("Server is full ({0} connections)")]
    ServerFull(usize),

    /// Requested display name belongs to another session
    #[error("Name is already taken")]
    NameTaken,

    /// Name negotiation received something other than a usable name
    #[error("Invalid name")]
    InvalidName,

    /// Known command with malformed arguments
    #[error("Invalid command")]
    InvalidCommand,

    /// Command prefix followed by an unrecognized keyword
    #[error("Unknown command")]
    UnknownCommand,
}

/// Message send errors
///
/// Occurs when delivering to a session whose writer has shut down.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Startup configuration errors (fatal)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No maximum connection count was given
    #[error("maximum connection count is required")]
    MissingMaxConnections,

    /// Maximum connection count is zero, negative or too large
    #[error("maximum connection count must be a positive integer, got {0}")]
    InvalidMaxConnections(i64),

    /// No welcome message, or only whitespace
    #[error("a welcome message is required")]
    MissingWelcomeMessage,
}
