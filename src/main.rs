//! Line-Protocol TCP Chat Server - Entry Point
//!
//! Parses the command line, binds the listener and accepts connections
//! until Ctrl-C.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use line_chat_server::{Args, Listener, ServerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_chat_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("line_chat_server=info")),
        )
        .init();

    let config = match ServerConfig::from_args(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Start TCP listener
    let listener = match Listener::bind(&config).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Could not listen on {}: {}", config.bind_addr(), e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Server is listening on {} (max {} connections)",
        config.bind_addr(),
        config.max_connections
    );

    listener.run_until_ctrl_c().await;

    ExitCode::SUCCESS
}
