//! A [`BrowserEngine`] backed by headless Chrome.
//!
//! One page per test. Before navigating, the engine:
//!
//! - installs the `window.testQuery` shim in every new document
//! - intercepts requests to the HTTP-scheme test origin and answers them
//!   from the client's resource handler
//! - listens to console, log and network events and forwards them to the
//!   client
//!
//! Server-backed resources go to the embedded server over the network.
//! Chrome cannot register custom schemes, so scenarios that use them need a
//! different engine.

use crate::browser::{TestBrowser, TestBrowserConfig};
use crate::console::{ConsoleCapture, ConsoleLevel, ConsoleMessage, PageEvent, QUERY_SHIM};
use crate::error::{BrowserError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FulfillRequestParams, HeaderEntry,
    RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::log::{self, EventEntryAdded};
use chromiumoxide::cdp::browser_protocol::network::{
    self, EventLoadingFailed, EventRequestWillBeSent, EventResponseReceived, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use futures::StreamExt;
use probe_cors::{BrowserEngine, EngineClient, ErrorCode, HandlerType};
use probe_server::HttpRequest;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Session {
    page: Arc<Page>,
    tasks: Vec<JoinHandle<()>>,
}

/// Runs CORS tests in Chrome.
pub struct ChromeEngine {
    browser: TestBrowser,
    console: ConsoleCapture,
    session: Mutex<Option<Session>>,
}

impl ChromeEngine {
    /// Launches Chrome.
    ///
    /// # Errors
    ///
    /// Returns `LaunchFailed` if Chrome cannot be started.
    pub async fn launch(config: TestBrowserConfig) -> Result<Self> {
        Ok(Self {
            browser: TestBrowser::launch(config).await?,
            console: ConsoleCapture::new(),
            session: Mutex::new(None),
        })
    }

    /// Every ordinary console message seen so far, across tests.
    #[must_use]
    pub fn console(&self) -> &ConsoleCapture {
        &self.console
    }

    /// Closes any open page and the browser.
    ///
    /// # Errors
    ///
    /// Returns an error if Chrome does not close cleanly.
    pub async fn shutdown(&self) -> Result<()> {
        self.close_session().await?;
        self.browser.close().await
    }

    async fn open(&self, url: &str, client: Arc<dyn EngineClient>) -> Result<Session> {
        let page = Arc::new(self.browser.new_page().await?);

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(QUERY_SHIM))
            .await?;
        page.execute(log::EnableParams::default()).await?;
        page.execute(network::EnableParams::default()).await?;
        page.execute(
            fetch::EnableParams::builder()
                .pattern(
                    RequestPattern::builder()
                        .url_pattern(format!("{}/*", HandlerType::HttpScheme.origin()))
                        .request_stage(RequestStage::Request)
                        .build(),
                )
                .build(),
        )
        .await?;

        // Subscribe before navigating so nothing is missed.
        let mut paused = page.event_listener::<EventRequestPaused>().await?;
        let mut console_events = page.event_listener::<EventConsoleApiCalled>().await?;
        let mut log_entries = page.event_listener::<EventEntryAdded>().await?;
        let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let mut responses = page.event_listener::<EventResponseReceived>().await?;
        let mut failures = page.event_listener::<EventLoadingFailed>().await?;

        let mut tasks = Vec::new();

        let (task_page, task_client) = (page.clone(), client.clone());
        tasks.push(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                if let Err(e) = answer_paused(&task_page, task_client.as_ref(), &event).await {
                    warn!(url = %event.request.url, "failed to answer intercepted request: {e}");
                }
            }
        }));

        let (task_client, console) = (client.clone(), self.console.clone());
        tasks.push(tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    Some(event) = console_events.next() => crate::console::parse_console_event(&event),
                    Some(event) = log_entries.next() => {
                        ConsoleMessage::new(ConsoleLevel::Other, event.entry.text.clone())
                    }
                    else => break,
                };

                match PageEvent::classify(message) {
                    PageEvent::Query(query) => {
                        if !task_client.on_query(&query.frame_url, &query.request) {
                            debug!(?query, "query not handled");
                        }
                    }
                    PageEvent::Console(message) => {
                        task_client.on_console_message(&message.text);
                        console.push(message);
                    }
                }
            }
        }));

        let task_client = client.clone();
        tasks.push(tokio::spawn(async move {
            let mut documents: HashMap<String, String> = HashMap::new();
            loop {
                tokio::select! {
                    biased;
                    Some(event) = requests.next() => {
                        if event.r#type == Some(ResourceType::Document) {
                            documents.insert(event.request_id.inner().clone(), event.request.url.clone());
                        }
                    }
                    Some(event) = responses.next() => {
                        if event.r#type == ResourceType::Document {
                            documents.remove(event.request_id.inner());
                            let status = u16::try_from(event.response.status).unwrap_or_default();
                            task_client.on_load_end(&event.response.url, status);
                        }
                    }
                    Some(event) = failures.next() => {
                        if let Some(url) = documents.remove(event.request_id.inner()) {
                            let error = ErrorCode::from_error_text(&event.error_text);
                            task_client.on_load_error(&url, error, &event.error_text);
                        }
                    }
                    else => break,
                }
            }
        }));

        let (task_page, url) = (page.clone(), url.to_string());
        tasks.push(tokio::spawn(async move {
            info!(%url, "navigating");
            if let Err(e) = task_page.goto(url.as_str()).await {
                // Network failures arrive as loadingFailed; only schemes
                // Chrome does not know about fail here without one.
                if url.starts_with("http") {
                    debug!(%url, "navigation failed: {e}");
                } else {
                    client.on_load_error(&url, ErrorCode::UnknownUrlScheme, &e.to_string());
                }
            }
        }));

        Ok(Session { page, tasks })
    }

    async fn close_session(&self) -> Result<()> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };

        for task in &session.tasks {
            task.abort();
        }
        for task in session.tasks {
            let _ = task.await;
        }

        match Arc::try_unwrap(session.page) {
            Ok(page) => page.close().await?,
            Err(_) => warn!("page still referenced, leaving it to the browser"),
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserEngine for ChromeEngine {
    async fn create_browser(
        &self,
        url: &str,
        client: Arc<dyn EngineClient>,
    ) -> probe_cors::Result<()> {
        if self.session.lock().await.is_some() {
            warn!("previous page still open, closing it");
            self.close_session().await?;
        }

        let session = self.open(url, client).await?;
        *self.session.lock().await = Some(session);
        Ok(())
    }

    async fn close_browser(&self) -> probe_cors::Result<()> {
        Ok(self.close_session().await?)
    }
}

async fn answer_paused(
    page: &Page,
    client: &dyn EngineClient,
    event: &EventRequestPaused,
) -> Result<()> {
    let request = http_request(event);

    match client.get_resource_handler(&request) {
        Some(canned) => {
            let mut headers = vec![HeaderEntry::new(
                "Content-Type",
                canned.response.mime_type.clone(),
            )];
            headers.extend(
                canned
                    .response
                    .headers
                    .iter()
                    .map(|(name, value)| HeaderEntry::new(name.clone(), value.clone())),
            );

            let params = FulfillRequestParams::builder()
                .request_id(event.request_id.clone())
                .response_code(i64::from(canned.response.status))
                .response_headers(headers)
                .body(STANDARD.encode(canned.body))
                .build()
                .map_err(BrowserError::InvalidCommand)?;
            page.execute(params).await?;
        }
        None => {
            page.execute(ContinueRequestParams::new(event.request_id.clone()))
                .await?;
        }
    }
    Ok(())
}

fn http_request(event: &EventRequestPaused) -> HttpRequest {
    let mut request = HttpRequest::get(event.request.url.clone());
    if let Some(headers) = event.request.headers.inner().as_object() {
        for (name, value) in headers {
            if let Some(value) = value.as_str() {
                request = request.with_header(name, value);
            }
        }
    }
    request
}
