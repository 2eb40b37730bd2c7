//! Browser engine abstraction.
//!
//! The CORS driver does not implement navigation, CORS policy or
//! JavaScript. It drives an engine through [`BrowserEngine`] and observes it
//! through [`EngineClient`], the only points of contact with whatever
//! browser actually runs the pages.

use crate::error::Result;
use crate::resource::ErrorCode;
use async_trait::async_trait;
use probe_server::{HttpRequest, HttpResponse};
use std::sync::Arc;

/// A response produced without going through the embedded server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedResponse {
    pub response: HttpResponse,
    pub body: String,
}

/// Callbacks from the engine into the test driver.
///
/// May be called from any task.
pub trait EngineClient: Send + Sync {
    /// Answers a request for a non-server URL (`http://corstest.com`, custom
    /// schemes). `None` lets the engine fall back to its default handling.
    fn get_resource_handler(&self, request: &HttpRequest) -> Option<CannedResponse>;

    /// A frame finished loading `url` with `status`.
    fn on_load_end(&self, url: &str, status: u16);

    /// A frame failed to load `url`.
    fn on_load_error(&self, url: &str, error: ErrorCode, error_text: &str);

    /// A page in `frame_url` called `window.testQuery`. Returns true if the
    /// message was consumed.
    fn on_query(&self, frame_url: &str, request: &str) -> bool;

    /// The page logged to the console. Returns true to suppress the message.
    fn on_console_message(&self, message: &str) -> bool;
}

/// Something that can open a browser on a URL and report back to a client.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Opens a browser navigated to `url`. Events for this browser go to
    /// `client` until [`close_browser`](Self::close_browser).
    async fn create_browser(&self, url: &str, client: Arc<dyn EngineClient>) -> Result<()>;

    /// Closes the browser and waits until no further client calls happen.
    async fn close_browser(&self) -> Result<()>;
}
