//! Error types for the embedded test server.
//!
//! Only runtime failures live here. Misuse of the lifecycle API (stopping
//! twice, removing an observer that was never added, calling helper methods
//! out of order) is a harness bug and panics instead.

use std::net::SocketAddr;
use thiserror::Error;

/// The main error type for test server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be created or bound.
    #[error("failed to bind test server to {addr}: {source}")]
    Bind {
        /// Address the server tried to listen on
        addr: SocketAddr,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// The server task stopped before reporting an origin.
    ///
    /// Pending start callbacks are dropped when this happens.
    #[error("test server start was aborted before the server came up")]
    StartAborted,

    /// The context task is gone; commands can no longer be delivered.
    #[error("server context is closed")]
    ContextClosed,

    /// Layered configuration could not be extracted.
    #[error("invalid server configuration: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ServerError {
    fn from(error: figment::Error) -> Self {
        ServerError::Config(Box::new(error))
    }
}

/// A specialized Result type for test server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
