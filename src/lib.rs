//! Line-Protocol TCP Chat Server Library
//!
//! A multi-user chat server speaking newline-delimited text over TCP,
//! built on tokio using the Actor pattern for the shared session registry.
//!
//! # Features
//! - Configurable welcome message and connection limit
//! - Unique display names claimed with `:meet<name>`
//! - Chat lines broadcast to everyone but the speaker
//! - Private messages with `:whisper<name>,<message>`
//! - `:who` listing and `:quit`
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the registry actor owning every session record
//! - Each connection runs a `Session` task holding a `RegistryHandle`
//! - No locks needed - all registry access goes through message passing,
//!   which gives every registry operation a single total order
//!
//! # Example
//! ```ignore
//! use line_chat_server::{Listener, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::new(Some(3456), Some(10), Some("Hi!".into())).unwrap();
//!     let listener = Listener::bind(&config).await.unwrap();
//!     listener.run_until_ctrl_c().await;
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod message;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use config::{Args, ServerConfig};
pub use error::{AppError, ConfigError, SendError};
pub use handler::{handle_connection, Session, SessionState};
pub use listener::Listener;
pub use message::{ClientLine, ServerMessage};
pub use server::{ChatServer, RegistryHandle, ServerCommand};
pub use types::SessionId;
