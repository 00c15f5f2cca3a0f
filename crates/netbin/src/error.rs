//! Errors that end the whole bridge.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unable to listen for connections on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to listen for new connections: {0}")]
    Accept(#[source] std::io::Error),

    #[error("acceptor task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Configuration error: {0}")]
    Config(#[from] netbin_core::Error),
}
