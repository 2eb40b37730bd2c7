//! Adapter between a server engine and the server manager.
//!
//! Engines report lifecycle and request callbacks from their own tasks.
//! [`HandlerEvents`] turns each callback into a message for the server
//! context, where the manager's matching `notify_*` method runs.

use crate::context::{Command, CommandSender};
use crate::error::ServerError;
use crate::request::{Connection, ConnectionInfo, HttpRequest};
use std::fmt;
use tracing::{trace, warn};

/// Events forwarded from an engine to the manager.
#[derive(Debug)]
pub enum ServerEvent {
    Created { origin: String },
    /// The engine could not start listening.
    StartFailed(ServerError),
    Destroyed,
    /// Every server-side object has been torn down.
    HandlerDeleted,
    ClientConnected(ConnectionInfo),
    ClientDisconnected(ConnectionInfo),
    HttpRequest {
        request: HttpRequest,
        connection: Connection,
    },
}

/// Something that can run an HTTP server and report its callbacks.
pub trait ServerEngine: Send + Sync + 'static {
    /// Starts listening. All callbacks, including the final
    /// [`HandlerEvents::handler_deleted`], go through `events`.
    fn create_server(&self, events: HandlerEvents) -> Box<dyn ServerControl>;
}

/// Control handle for a running server.
pub trait ServerControl: Send {
    /// Requests shutdown. Completion is reported through the events sink.
    fn shutdown(&mut self);
}

/// Callback sink handed to engines.
///
/// Cloneable and usable from any task; every method posts to the server
/// context and returns immediately.
#[derive(Clone)]
pub struct HandlerEvents {
    commands: CommandSender,
}

impl HandlerEvents {
    pub(crate) fn new(commands: CommandSender) -> Self {
        Self { commands }
    }

    fn post(&self, event: ServerEvent) {
        if self.commands.send(Command::Server(event)).is_err() {
            warn!("server context closed, dropping engine callback");
        }
    }

    pub fn server_created(&self, origin: impl Into<String>) {
        self.post(ServerEvent::Created {
            origin: origin.into(),
        });
    }

    pub fn start_failed(&self, error: ServerError) {
        self.post(ServerEvent::StartFailed(error));
    }

    pub fn server_destroyed(&self) {
        self.post(ServerEvent::Destroyed);
    }

    pub fn handler_deleted(&self) {
        self.post(ServerEvent::HandlerDeleted);
    }

    pub fn client_connected(&self, connection: ConnectionInfo) {
        self.post(ServerEvent::ClientConnected(connection));
    }

    pub fn client_disconnected(&self, connection: ConnectionInfo) {
        self.post(ServerEvent::ClientDisconnected(connection));
    }

    pub fn http_request(&self, request: HttpRequest, connection: Connection) {
        self.post(ServerEvent::HttpRequest {
            request,
            connection,
        });
    }

    // WebSocket traffic is accepted by the callback surface but ignored.

    pub fn websocket_request(&self, connection: ConnectionInfo, _request: &HttpRequest) {
        trace!(connection = connection.id, "ignoring websocket request");
    }

    pub fn websocket_connected(&self, connection: ConnectionInfo) {
        trace!(connection = connection.id, "ignoring websocket connect");
    }

    pub fn websocket_message(&self, connection: ConnectionInfo, data: &[u8]) {
        trace!(connection = connection.id, len = data.len(), "ignoring websocket message");
    }
}

impl fmt::Debug for HandlerEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEvents")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

/// The manager's reference to the live server.
pub(crate) struct ServerHandler {
    control: Box<dyn ServerControl>,
}

impl ServerHandler {
    pub(crate) fn create(engine: &dyn ServerEngine, events: HandlerEvents) -> Self {
        Self {
            control: engine.create_server(events),
        }
    }

    pub(crate) fn shutdown(&mut self) {
        self.control.shutdown();
    }
}

impl fmt::Debug for ServerHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandler").finish_non_exhaustive()
    }
}
