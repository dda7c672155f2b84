//! TCP listener loop
//!
//! Accepts connections and spawns a session task for each one. Admission
//! control happens inside the registry when the session registers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::server::{ChatServer, RegistryHandle};

/// Accept loop bound to a registry
pub struct Listener {
    listener: TcpListener,
    registry: RegistryHandle,
    welcome: Arc<str>,
}

impl Listener {
    /// Bind the configured address and start the registry actor
    pub async fn bind(config: &ServerConfig) -> Result<Self, AppError> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        Ok(Self::from_listener(listener, config))
    }

    /// Use an already bound socket (tests bind `127.0.0.1:0`)
    pub fn from_listener(listener: TcpListener, config: &ServerConfig) -> Self {
        Self {
            listener,
            registry: ChatServer::spawn(config.max_connections),
            welcome: Arc::from(config.welcome_message.as_str()),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the registry this listener feeds
    pub fn registry(&self) -> RegistryHandle {
        self.registry.clone()
    }

    /// Accept until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Listener shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    self.handle_accept(accepted);
                }
            }
        }
    }

    /// Accept until Ctrl-C
    pub async fn run_until_ctrl_c(self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to install Ctrl-C handler: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    fn handle_accept(&self, accepted: std::io::Result<(TcpStream, SocketAddr)>) {
        match accepted {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let registry = self.registry.clone();
                let welcome = Arc::clone(&self.welcome);

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    match handle_connection(stream, registry, welcome).await {
                        Ok(()) => {}
                        Err(AppError::ServerFull(max)) => {
                            warn!("Rejected {}: max number of connections reached ({})", addr, max);
                        }
                        Err(e) => error!("Connection handler error for {}: {}", addr, e),
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
