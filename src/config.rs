//! Server configuration
//!
//! Command-line arguments and the validated, immutable `ServerConfig`
//! handed to the listener and registry at startup.

use clap::Parser;
use tracing::warn;

use crate::error::ConfigError;

/// Port used when none (or an out-of-range one) is given
pub const DEFAULT_PORT: u16 = 3456;

/// Default bind address
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Command-line arguments
///
/// Short flags take attached values too, e.g. `-p4000 -n10 -mHello`.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TCP port to listen on (1-65535, falls back to 3456)
    #[arg(short = 'p', long = "port", allow_negative_numbers = true)]
    pub port: Option<i64>,

    /// Maximum number of simultaneous connections
    #[arg(short = 'n', long = "max-connections", allow_negative_numbers = true)]
    pub max_connections: Option<i64>,

    /// Welcome message sent to every new client
    #[arg(short = 'm', long = "message")]
    pub welcome_message: Option<String>,

    /// Address to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,
}

/// Validated server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub welcome_message: String,
}

impl ServerConfig {
    /// Validate raw settings
    ///
    /// A missing or out-of-range port falls back to [`DEFAULT_PORT`]; the
    /// connection limit and welcome message are required.
    pub fn new(
        port: Option<i64>,
        max_connections: Option<i64>,
        welcome_message: Option<String>,
    ) -> Result<Self, ConfigError> {
        let port = match port {
            Some(p) => u16::try_from(p).ok().filter(|&p| p > 0).unwrap_or_else(|| {
                warn!("Port {} is out of range, using {}", p, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let max_connections = match max_connections {
            None => return Err(ConfigError::MissingMaxConnections),
            Some(n) => usize::try_from(n)
                .ok()
                .filter(|&n| n > 0 && n < i32::MAX as usize)
                .ok_or(ConfigError::InvalidMaxConnections(n))?,
        };

        let welcome_message = welcome_message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .ok_or(ConfigError::MissingWelcomeMessage)?;

        Ok(Self {
            host: DEFAULT_HOST.to_string(),
            port,
            max_connections,
            welcome_message,
        })
    }

    /// Build from parsed command-line arguments
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let config = Self::new(args.port, args.max_connections, args.welcome_message)?;
        Ok(Self {
            host: args.host,
            ..config
        })
    }

    /// `host:port` string for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = ServerConfig::new(Some(4000), Some(10), Some("  Hello!  ".into())).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.welcome_message, "Hello!");
        assert_eq!(config.bind_addr(), "0.0.0.0:4000");
    }

    #[test]
    fn test_port_falls_back_to_default() {
        for port in [None, Some(0), Some(-1), Some(70000)] {
            let config = ServerConfig::new(port, Some(1), Some("hi".into())).unwrap();
            assert_eq!(config.port, DEFAULT_PORT);
        }
        let config = ServerConfig::new(Some(65535), Some(1), Some("hi".into())).unwrap();
        assert_eq!(config.port, 65535);
    }

    #[test]
    fn test_max_connections_required() {
        assert_eq!(
            ServerConfig::new(None, None, Some("hi".into())),
            Err(ConfigError::MissingMaxConnections)
        );
        assert_eq!(
            ServerConfig::new(None, Some(0), Some("hi".into())),
            Err(ConfigError::InvalidMaxConnections(0))
        );
        assert_eq!(
            ServerConfig::new(None, Some(-3), Some("hi".into())),
            Err(ConfigError::InvalidMaxConnections(-3))
        );
    }

    #[test]
    fn test_welcome_message_required() {
        assert_eq!(
            ServerConfig::new(None, Some(2), None),
            Err(ConfigError::MissingWelcomeMessage)
        );
        assert_eq!(
            ServerConfig::new(None, Some(2), Some("   ".into())),
            Err(ConfigError::MissingWelcomeMessage)
        );
    }

    #[test]
    fn test_args_with_attached_values() {
        let args = Args::try_parse_from(["line_chat_server", "-p4000", "-n2", "-mHello there"])
            .unwrap();
        let config = ServerConfig::from_args(args).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.welcome_message, "Hello there");
        assert_eq!(config.host, DEFAULT_HOST);
    }

    #[test]
    fn test_args_long_form() {
        let args = Args::try_parse_from([
            "line_chat_server",
            "--max-connections",
            "5",
            "--message",
            "Welcome",
            "--host",
            "127.0.0.1",
        ])
        .unwrap();
        let config = ServerConfig::from_args(args).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:3456");
    }
}
