//! Serves expected resources from the embedded test server.

use crate::outcome::Failures;
use crate::setup::TestSetup;
use parking_lot::Mutex;
use probe_server::{
    Connection, Dispatch, HelperDelegate, HttpRequest, ObserverHelper, ServerContext,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Answers server requests that match a resource in the setup.
///
/// `ready` fires once the server is up, `done` once the observer has been
/// shut down and unregistered.
pub struct TestServerObserver {
    setup: Arc<Mutex<TestSetup>>,
    failures: Failures,
    ready: Mutex<Option<oneshot::Sender<()>>>,
    done: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl TestServerObserver {
    /// Creates the observer and starts the server. Must be called on the
    /// server context.
    pub fn start(
        context: &ServerContext,
        setup: Arc<Mutex<TestSetup>>,
        failures: Failures,
        ready: oneshot::Sender<()>,
        done: impl FnOnce() + Send + 'static,
    ) -> Arc<ObserverHelper<TestServerObserver>> {
        let observer = TestServerObserver {
            setup,
            failures,
            ready: Mutex::new(Some(ready)),
            done: Mutex::new(Some(Box::new(done))),
        };
        let helper = ObserverHelper::new(context.clone(), observer);
        helper.initialize();
        helper
    }
}

impl HelperDelegate for TestServerObserver {
    fn on_initialized(&self, origin: &str) {
        debug!(%origin, "test server ready");
        if let Some(ready) = self.ready.lock().take() {
            let _ = ready.send(());
        }
    }

    fn on_http_request(&self, request: &HttpRequest, connection: &Connection) -> Dispatch {
        let mut setup = self.setup.lock();
        let Some(resource) = setup.resource_for_url_mut(&request.url) else {
            // Not a request we handle.
            return Dispatch::Unhandled;
        };

        resource.response_ct += 1;
        self.failures.check(resource.verify_request(request));
        connection.send_response(&resource.response, resource.response_data.clone());

        Dispatch::Handled
    }

    fn on_shutdown(&self) {
        let done = self.done.lock().take();
        if let Some(done) = done {
            done();
        }
    }
}
