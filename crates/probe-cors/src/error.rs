//! Error types for CORS test runs.
//!
//! These cover failures of the harness itself: the server would not start,
//! the browser engine broke, the run never finished. Expectation mismatches
//! are not errors; they are collected in a
//! [`TestOutcome`](crate::TestOutcome).

use probe_server::ServerError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorsError {
    /// The embedded server failed.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The browser engine reported a failure.
    #[error("browser engine failed: {0}")]
    Engine(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The run did not reach a terminal state, even after forced cleanup.
    #[error("CORS test did not finish within {0:?}")]
    Timeout(Duration),

    /// A response from the test server could not be parsed.
    #[error("malformed HTTP response from {url}: {reason}")]
    Protocol {
        /// URL that was requested
        url: String,
        /// What was wrong with the response
        reason: String,
    },

    /// Layered configuration could not be extracted.
    #[error("invalid CORS test configuration: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Generic I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CorsError {
    /// Wraps any engine-specific error.
    pub fn engine(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        CorsError::Engine(Box::new(error))
    }
}

impl From<figment::Error> for CorsError {
    fn from(error: figment::Error) -> Self {
        CorsError::Config(Box::new(error))
    }
}

pub type Result<T> = std::result::Result<T, CorsError>;
