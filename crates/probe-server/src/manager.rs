//! Server manager: one server instance, its observers and pending callbacks.
//!
//! The manager is owned by the server context task and is only touched
//! there, so it carries no locks. It is created lazily by the first start or
//! observer registration and lives until the engine reports that every
//! server object has been torn down.

use crate::handler::{HandlerEvents, ServerEngine, ServerHandler};
use crate::observer::{Dispatch, Observer, RegistrationId};
use crate::request::{Connection, ConnectionInfo, HttpRequest};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Invoked with the server origin once the server is listening.
pub type StartDoneCallback = Box<dyn FnOnce(&str) + Send>;

/// Invoked when an operation has completed.
pub type DoneCallback = Box<dyn FnOnce() + Send>;

pub(crate) struct ServerManager {
    engine: Arc<dyn ServerEngine>,
    events: HandlerEvents,
    handler: Option<ServerHandler>,
    /// Empty unless the server is up.
    origin: String,
    start_callbacks: Vec<StartDoneCallback>,
    stop_callback: Option<DoneCallback>,
    observers: Vec<(RegistrationId, Arc<dyn Observer>)>,
}

impl ServerManager {
    pub(crate) fn new(engine: Arc<dyn ServerEngine>, events: HandlerEvents) -> Self {
        debug!("creating server manager");
        Self {
            engine,
            events,
            handler: None,
            origin: String::new(),
            start_callbacks: Vec::new(),
            stop_callback: None,
            observers: Vec::new(),
        }
    }

    pub(crate) fn origin(&self) -> &str {
        &self.origin
    }

    pub(crate) fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn start(&mut self, callback: StartDoneCallback) {
        if !self.origin.is_empty() {
            callback(&self.origin);
            return;
        }

        // Several callers may race to start before the server is up.
        self.start_callbacks.push(callback);

        if self.handler.is_none() {
            self.handler = Some(ServerHandler::create(
                self.engine.as_ref(),
                self.events.clone(),
            ));
        }
    }

    pub(crate) fn stop(&mut self, callback: DoneCallback) {
        let Some(handler) = self.handler.as_mut() else {
            callback();
            return;
        };

        assert!(
            self.stop_callback.is_none(),
            "only one pending stop is supported"
        );
        self.stop_callback = Some(callback);

        handler.shutdown();
    }

    pub(crate) fn add_observer(&mut self, id: RegistrationId, observer: Arc<dyn Observer>) {
        debug!(registration = id, "adding observer");
        self.observers.push((id, observer));
    }

    /// Removes and returns the observer registered under `id`.
    pub(crate) fn remove_observer(&mut self, id: RegistrationId) -> Arc<dyn Observer> {
        let index = self
            .observers
            .iter()
            .position(|(existing, _)| *existing == id)
            .unwrap_or_else(|| panic!("observer {id} is not registered"));
        debug!(registration = id, "removing observer");
        self.observers.remove(index).1
    }

    pub(crate) fn notify_server_created(&mut self, origin: String) {
        assert!(self.origin.is_empty(), "server created twice");
        info!(%origin, "test server started");
        self.origin = origin;

        for callback in std::mem::take(&mut self.start_callbacks) {
            callback(&self.origin);
        }
    }

    /// Drops pending start callbacks. A stop requested before the failure
    /// completes here, since no server object is left to tear down.
    pub(crate) fn notify_start_failed(&mut self, reason: &str) {
        error!(%reason, pending = self.start_callbacks.len(), "test server failed to start");
        self.start_callbacks.clear();
        self.handler = None;

        if let Some(callback) = self.stop_callback.take() {
            callback();
        }
    }

    pub(crate) fn notify_server_destroyed(&mut self) {
        debug!("test server destroyed");
        self.origin.clear();
        self.handler = None;
    }

    /// Fires the pending stop callback. The manager's lifetime ends here;
    /// the caller drops it afterwards.
    pub(crate) fn notify_server_handler_deleted(&mut self) {
        let callback = self
            .stop_callback
            .take()
            .expect("server handler deleted without a pending stop");
        assert!(
            self.observers.is_empty(),
            "server manager destroyed with {} observers still registered",
            self.observers.len()
        );
        assert!(self.start_callbacks.is_empty(), "start callbacks pending at shutdown");

        info!("test server stopped");
        callback();
    }

    pub(crate) fn notify_client_connected(&self, connection: &ConnectionInfo) {
        self.dispatch(|observer| observer.on_client_connected(connection));
    }

    pub(crate) fn notify_client_disconnected(&self, connection: &ConnectionInfo) {
        self.dispatch(|observer| observer.on_client_disconnected(connection));
    }

    pub(crate) fn notify_http_request(&self, request: &HttpRequest, connection: &Connection) {
        let handled = self.dispatch(|observer| observer.on_http_request(request, connection));
        if !handled {
            debug!(url = %request.url, "no observer claimed request");
        }
    }

    /// Offers an event to a snapshot of the observer list until one claims
    /// it. Returns true if claimed.
    fn dispatch(&self, mut notify: impl FnMut(&dyn Observer) -> Dispatch) -> bool {
        let snapshot: Vec<Arc<dyn Observer>> = self
            .observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        snapshot
            .iter()
            .any(|observer| notify(observer.as_ref()).is_handled())
    }
}
