//! The CORS test driver.
//!
//! A run goes through these steps:
//!
//! 1. start the embedded server if any resource needs it
//! 2. open a browser on the first resource's URL
//! 3. serve matching requests and count load results, queries and console
//!    messages as the engine reports them
//! 4. once every resource meets its expectations, stop the server and
//!    verify the final counts
//!
//! State changes that order the run (completion checks, server stop) happen
//! on the server context. Engine callbacks may arrive on any task; they
//! update the shared setup and post a completion check.

use crate::config::CorsTestConfig;
use crate::engine::{BrowserEngine, CannedResponse, EngineClient};
use crate::error::{CorsError, Result};
use crate::handler_type::HandlerType;
use crate::observer::TestServerObserver;
use crate::outcome::{Failures, Mismatch, TestOutcome};
use crate::payload::{FAILURE_MSG, SUCCESS_MSG};
use crate::resource::{ErrorCode, Resource};
use crate::scenarios::Scenario;
use crate::setup::TestSetup;
use parking_lot::Mutex;
use probe_server::{HelperState, HttpRequest, ObserverHelper, ServerContext, ServerError, affinity};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

#[derive(Default)]
struct DriverState {
    main_url: String,
    shutting_down: bool,
    server: Option<Arc<ObserverHelper<TestServerObserver>>>,
    finished: Option<oneshot::Sender<()>>,
}

/// Runs one CORS test against a browser engine.
pub struct CorsTestHandler {
    this: Weak<CorsTestHandler>,
    context: ServerContext,
    setup: Arc<Mutex<TestSetup>>,
    failures: Failures,
    state: Mutex<DriverState>,
}

impl CorsTestHandler {
    /// # Panics
    ///
    /// Panics if `setup` has no resources.
    #[must_use]
    pub fn new(setup: TestSetup, context: ServerContext) -> Arc<Self> {
        setup.validate();
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            context,
            setup: Arc::new(Mutex::new(setup)),
            failures: Failures::new(),
            state: Mutex::new(DriverState::default()),
        })
    }

    /// Runs the test to completion and returns what was observed.
    ///
    /// Expectation mismatches end up in the outcome. A run that does not
    /// finish within the configured timeout is failed and torn down.
    ///
    /// # Errors
    ///
    /// Returns an error if the server could not start, the engine failed,
    /// or the run could not be torn down after timing out.
    pub async fn execute(
        self: &Arc<Self>,
        engine: &dyn BrowserEngine,
        config: &CorsTestConfig,
    ) -> Result<TestOutcome> {
        let limit = config.timeout();
        let deadline = Instant::now() + limit;

        let (ready_tx, ready_rx) = oneshot::channel();
        let (finished_tx, mut finished_rx) = oneshot::channel();
        self.state.lock().finished = Some(finished_tx);

        let this = Arc::clone(self);
        self.context.post(move || this.start_server(ready_tx));

        match timeout_at(deadline, ready_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(self.abandon(ServerError::StartAborted.into()).await),
            Err(_) => {
                warn!(?limit, "test server did not become ready");
                return Err(self.abandon(CorsError::Timeout(limit)).await);
            }
        }

        let main_url = self.setup.lock().main_url();
        self.state.lock().main_url.clone_from(&main_url);
        info!(%main_url, "creating browser");
        let client: Arc<dyn EngineClient> = self.clone();
        if let Err(error) = engine.create_browser(&main_url, client).await {
            warn!(%main_url, %error, "browser could not be created");
            return Err(self.abandon(error).await);
        }

        let finished = if timeout_at(deadline, &mut finished_rx).await.is_ok() {
            true
        } else {
            warn!(?limit, %main_url, "test timed out");
            self.failures.record(Mismatch::Timeout(limit));
            let this = Arc::clone(self);
            self.context.post(move || this.destroy_after_timeout());
            timeout(limit, finished_rx).await.is_ok()
        };

        engine.close_browser().await?;

        if !finished {
            return Err(CorsError::Timeout(limit));
        }

        let setup = std::mem::take(&mut *self.setup.lock());
        Ok(TestOutcome::new(setup, self.failures.take()))
    }

    /// Releases the test server before `error` is returned, so the context
    /// can be torn down without observers left behind.
    async fn abandon(self: &Arc<Self>, error: CorsError) -> CorsError {
        let (done_tx, done_rx) = oneshot::channel();
        let this = Arc::clone(self);
        self.context.post(move || this.abandon_run(done_tx));
        let _ = done_rx.await;
        error
    }

    /// Snapshot of the mismatches recorded so far.
    #[must_use]
    pub fn failures(&self) -> Vec<Mismatch> {
        self.failures.snapshot()
    }

    fn start_server(self: &Arc<Self>, ready: oneshot::Sender<()>) {
        affinity::require(self.context.id());

        if !self.setup.lock().needs_server() {
            let _ = ready.send(());
            return;
        }

        let weak = Arc::downgrade(self);
        let server = TestServerObserver::start(
            &self.context,
            Arc::clone(&self.setup),
            self.failures.clone(),
            ready,
            move || {
                if let Some(handler) = weak.upgrade() {
                    handler.stopped_server();
                }
            },
        );
        self.state.lock().server = Some(server);
    }

    fn stop_server(&self) {
        affinity::require(self.context.id());

        let server = self.state.lock().server.clone();
        match server {
            // Results in a call to stopped_server().
            Some(server) => server.shutdown(),
            None => {
                debug_assert!(!self.setup.lock().needs_server());
                self.destroy_test();
            }
        }
    }

    fn stopped_server(&self) {
        affinity::require(self.context.id());
        self.state.lock().server = None;
        self.destroy_test();
    }

    fn destroy_test(&self) {
        let (shutting_down, finished) = {
            let mut state = self.state.lock();
            (state.shutting_down, state.finished.take())
        };

        if !shutting_down {
            self.failures.record(Mismatch::NotShuttingDown);
        }

        {
            let setup = self.setup.lock();
            for mismatch in setup.count_mismatches() {
                self.failures.record(mismatch);
            }
            for message in setup.console_messages() {
                self.failures
                    .record(Mismatch::MissingConsoleMessage(message.clone()));
            }
        }

        info!(failures = self.failures.snapshot().len(), "test finished");
        if let Some(finished) = finished {
            let _ = finished.send(());
        }
    }

    fn destroy_test_if_done(&self) {
        affinity::require(self.context.id());

        {
            let mut state = self.state.lock();
            if state.shutting_down || !self.setup.lock().is_done() {
                return;
            }
            state.shutting_down = true;
        }

        debug!("all expectations met, stopping");
        self.stop_server();
    }

    fn destroy_after_timeout(&self) {
        let server = {
            let mut state = self.state.lock();
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
            state.server.clone()
        };

        match server {
            Some(server) if server.state() == HelperState::Initialized => server.shutdown(),
            Some(server) => {
                warn!(state = %server.state(), "cannot stop test server mid-transition");
                self.destroy_test();
            }
            None => self.destroy_test(),
        }
    }

    fn abandon_run(&self, done: oneshot::Sender<()>) {
        affinity::require(self.context.id());

        let server = {
            let mut state = self.state.lock();
            state.shutting_down = true;
            state.finished = None;
            state.server.take()
        };

        if let Some(server) = server {
            match server.state() {
                HelperState::Initializing => server.abandon(),
                HelperState::Initialized => server.shutdown(),
                state => debug!(%state, "test server already released"),
            }
        }

        // Runs after the unsubscription posted above.
        self.context.post(move || {
            let _ = done.send(());
        });
    }

    fn trigger_destroy_test_if_done(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        self.context.post(move || this.destroy_test_if_done());
    }

    /// Looks up `url`, recording a mismatch if nothing matches.
    fn expect_resource<T>(
        &self,
        url: &str,
        f: impl FnOnce(&mut Resource) -> T,
    ) -> Option<T> {
        let mut setup = self.setup.lock();
        match setup.resource_for_url_mut(url) {
            Some(resource) => Some(f(resource)),
            None => {
                drop(setup);
                self.failures.record(Mismatch::UnknownUrl(url.to_string()));
                None
            }
        }
    }
}

impl EngineClient for CorsTestHandler {
    fn get_resource_handler(&self, request: &HttpRequest) -> Option<CannedResponse> {
        let mut setup = self.setup.lock();
        let resource = setup
            .resource_for_url_mut(&request.url)
            .filter(|resource| resource.handler != HandlerType::Server)?;

        resource.response_ct += 1;
        self.failures.check(resource.verify_request(request));
        Some(CannedResponse {
            response: resource.response.clone(),
            body: resource.response_data.clone(),
        })
    }

    fn on_load_end(&self, url: &str, status: u16) {
        let main_url = self.state.lock().main_url.clone();
        let Some(expected) = self.expect_resource(url, |resource| resource.response.status) else {
            return;
        };

        if (url == main_url || expected != 200) && expected != status {
            self.failures.record(Mismatch::Status {
                url: url.to_string(),
                expected,
                actual: status,
            });
        }

        self.trigger_destroy_test_if_done();
    }

    fn on_load_error(&self, url: &str, error: ErrorCode, error_text: &str) {
        let Some(expected) = self.expect_resource(url, |resource| resource.expected_error_code)
        else {
            return;
        };
        debug!(%url, %error, %error_text, "load error");

        // Navigation races can report ERR_ABORTED in place of the real error.
        let tolerated = expected == ErrorCode::None && error == ErrorCode::Aborted;
        if !tolerated && expected != error {
            self.failures.record(Mismatch::LoadError {
                url: url.to_string(),
                expected,
                actual: error,
            });
        }

        self.trigger_destroy_test_if_done();
    }

    fn on_query(&self, frame_url: &str, request: &str) -> bool {
        if request != SUCCESS_MSG && request != FAILURE_MSG {
            // Still a lookup so unknown frames are reported.
            let _ = self.expect_resource(frame_url, |_| ());
            return false;
        }

        let counted = self.expect_resource(frame_url, |resource| {
            if request == SUCCESS_MSG {
                resource.success_query_ct += 1;
            } else {
                resource.failure_query_ct += 1;
            }
        });
        if counted.is_none() {
            return false;
        }

        self.trigger_destroy_test_if_done();
        true
    }

    fn on_console_message(&self, message: &str) -> bool {
        let expected = self.setup.lock().take_console_message(message);
        if !expected {
            self.failures
                .record(Mismatch::UnexpectedConsoleMessage(message.to_string()));
        }
        false
    }
}

/// Builds `scenario` and runs it.
///
/// # Errors
///
/// See [`CorsTestHandler::execute`].
pub async fn run_scenario(
    scenario: Scenario,
    context: &ServerContext,
    engine: &dyn BrowserEngine,
    config: &CorsTestConfig,
) -> Result<TestOutcome> {
    info!(%scenario, "running CORS scenario");
    let handler = CorsTestHandler::new(scenario.build(), context.clone());
    handler.execute(engine, config).await
}
