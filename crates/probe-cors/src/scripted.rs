//! A deterministic [`BrowserEngine`] that replays a fixed list of events.
//!
//! Server URLs are fetched over a real TCP connection so the embedded server
//! sees the requests. Every other origin goes through the client's resource
//! handler. Pages are never parsed or executed: the script states what the
//! page would have done.

use crate::engine::{BrowserEngine, EngineClient};
use crate::error::{CorsError, Result};
use crate::handler_type::HandlerType;
use crate::resource::ErrorCode;
use async_trait::async_trait;
use parking_lot::Mutex;
use probe_server::HttpRequest;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One scripted browser event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Load `url` into a frame and report how it ended.
    Navigate { url: String },
    /// Request `url` as a sub-resource, optionally with an `Origin` header.
    /// Nothing is reported back besides the request itself.
    Request { url: String, origin: Option<String> },
    /// Report a finished load without requesting anything.
    LoadEnd { url: String, status: u16 },
    /// Report a load failure without requesting anything.
    LoadError { url: String, error: ErrorCode },
    /// A page in `frame_url` called `window.testQuery(message)`.
    Query { frame_url: String, message: String },
    /// The page logged `message`.
    Console { message: String },
}

impl Step {
    pub fn navigate(url: impl Into<String>) -> Self {
        Step::Navigate { url: url.into() }
    }

    pub fn request(url: impl Into<String>, origin: Option<&str>) -> Self {
        Step::Request {
            url: url.into(),
            origin: origin.map(str::to_string),
        }
    }

    pub fn load_end(url: impl Into<String>, status: u16) -> Self {
        Step::LoadEnd {
            url: url.into(),
            status,
        }
    }

    pub fn load_error(url: impl Into<String>, error: ErrorCode) -> Self {
        Step::LoadError {
            url: url.into(),
            error,
        }
    }

    pub fn query(frame_url: impl Into<String>, message: impl Into<String>) -> Self {
        Step::Query {
            frame_url: frame_url.into(),
            message: message.into(),
        }
    }

    pub fn console(message: impl Into<String>) -> Self {
        Step::Console {
            message: message.into(),
        }
    }
}

/// Replays [`Step`]s after navigating to the main URL.
#[derive(Default)]
pub struct ScriptedEngine {
    steps: Vec<Step>,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl ScriptedEngine {
    #[must_use]
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl BrowserEngine for ScriptedEngine {
    async fn create_browser(&self, url: &str, client: Arc<dyn EngineClient>) -> Result<()> {
        let main_url = url.to_string();
        let steps = self.steps.clone();

        let task = tokio::spawn(async move {
            navigate(client.as_ref(), &main_url).await?;
            for step in steps {
                replay(client.as_ref(), step).await?;
            }
            Ok(())
        });

        if let Some(previous) = self.task.lock().replace(task) {
            warn!("browser created twice, abandoning the previous script");
            previous.abort();
        }
        Ok(())
    }

    async fn close_browser(&self) -> Result<()> {
        let task = self.task.lock().take();
        match task {
            Some(task) => task.await.map_err(CorsError::engine)?,
            None => Ok(()),
        }
    }
}

async fn replay(client: &dyn EngineClient, step: Step) -> Result<()> {
    debug!(?step, "replaying");
    match step {
        Step::Navigate { url } => navigate(client, &url).await?,
        Step::Request { url, origin } => {
            match fetch(client, &url, origin.as_deref()).await {
                Ok(status) => debug!(%url, ?status, "sub-resource loaded"),
                Err(CorsError::Io(error)) => debug!(%url, %error, "sub-resource failed"),
                Err(error) => return Err(error),
            }
        }
        Step::LoadEnd { url, status } => client.on_load_end(&url, status),
        Step::LoadError { url, error } => {
            client.on_load_error(&url, error, &format!("net::{}", error.name()));
        }
        Step::Query { frame_url, message } => {
            if !client.on_query(&frame_url, &message) {
                debug!(%frame_url, %message, "query not handled");
            }
        }
        Step::Console { message } => {
            client.on_console_message(&message);
        }
    }
    Ok(())
}

async fn navigate(client: &dyn EngineClient, url: &str) -> Result<()> {
    match fetch(client, url, None).await {
        Ok(Some(status)) => client.on_load_end(url, status),
        Ok(None) => client.on_load_error(
            url,
            ErrorCode::UnknownUrlScheme,
            "net::ERR_UNKNOWN_URL_SCHEME",
        ),
        Err(CorsError::Io(error)) => {
            warn!(%url, %error, "navigation failed");
            client.on_load_error(url, ErrorCode::Failed, "net::ERR_FAILED");
        }
        Err(error) => return Err(error),
    }
    Ok(())
}

/// Fetches `url` and returns the response status, or `None` if nothing
/// handles it.
async fn fetch(client: &dyn EngineClient, url: &str, origin: Option<&str>) -> Result<Option<u16>> {
    if HandlerType::for_url(url) == Some(HandlerType::Server) {
        return fetch_from_server(url, origin).await.map(Some);
    }

    let mut request = HttpRequest::get(url);
    if let Some(origin) = origin {
        request = request.with_header("Origin", origin);
    }
    Ok(client
        .get_resource_handler(&request)
        .map(|canned| canned.response.status))
}

async fn fetch_from_server(url: &str, origin: Option<&str>) -> Result<u16> {
    let protocol = |reason: &str| CorsError::Protocol {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| protocol("not an http URL"))?;
    let (authority, path) = match rest.find('/') {
        Some(index) => rest.split_at(index),
        None => (rest, "/"),
    };

    let mut head = format!("GET {path} HTTP/1.1\r\nHost: {authority}\r\nConnection: close\r\n");
    if let Some(origin) = origin {
        head.push_str(&format!("Origin: {origin}\r\n"));
    }
    head.push_str("\r\n");

    let mut stream = TcpStream::connect(authority).await?;
    stream.write_all(head.as_bytes()).await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;

    let text = String::from_utf8_lossy(&raw);
    text.lines()
        .next()
        .and_then(|status_line| status_line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| protocol("missing status line"))
}
