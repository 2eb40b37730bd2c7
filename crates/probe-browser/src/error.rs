//! Error types for the Chrome engine.
//!
//! Launch and connection failures are kept apart from protocol failures so a
//! missing Chrome install reads differently from a broken page.

use probe_cors::CorsError;
use thiserror::Error;

/// Errors raised while driving Chrome.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Failed to launch the browser process.
    ///
    /// This typically occurs when Chrome/Chromium is not installed,
    /// or when there are permission issues with the executable.
    #[error("failed to launch browser: {reason}")]
    LaunchFailed {
        /// Human-readable reason for the launch failure
        reason: String,
        /// Optional underlying error that caused the failure
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to open a page or subscribe to its events.
    #[error("CDP connection failed: {0}")]
    ConnectionFailed(String),

    /// A CDP command could not be built.
    #[error("invalid CDP command: {0}")]
    InvalidCommand(String),

    /// An operation was attempted on a closed browser instance.
    #[error("browser instance is already closed")]
    AlreadyClosed,

    /// Layered configuration could not be extracted.
    #[error("invalid browser configuration: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Wraps errors from the chromiumoxide library.
    #[error("chromiumoxide error: {0}")]
    ChromiumOxide(#[from] chromiumoxide::error::CdpError),
}

impl From<figment::Error> for BrowserError {
    fn from(error: figment::Error) -> Self {
        BrowserError::Config(Box::new(error))
    }
}

impl From<BrowserError> for CorsError {
    fn from(error: BrowserError) -> Self {
        CorsError::engine(error)
    }
}

/// A specialized Result type for browser operations.
pub type Result<T> = std::result::Result<T, BrowserError>;
