//! The server context: an explicit owner for the server manager.
//!
//! A [`ServerContext`] spawns one tokio task that owns all manager state.
//! Every public method turns the call into a message for that task and
//! returns immediately, so state is only ever mutated sequentially and in
//! the order calls were made. Results come back through callbacks, or
//! through the async helpers [`ServerContext::started`] and
//! [`ServerContext::stopped`].
//!
//! Contract violations (stopping twice, registering while a stop is in
//! flight, removing an unknown observer) panic on the context task.
//! [`ServerContext::teardown`] re-raises such a panic in the caller.

use crate::affinity::{self, ContextId};
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::handler::{HandlerEvents, ServerEngine, ServerEvent};
use crate::http::HttpEngine;
use crate::manager::{DoneCallback, ServerManager, StartDoneCallback};
use crate::observer::{Observer, Registration, RegistrationId};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub(crate) enum Command {
    Task(Box<dyn FnOnce() + Send>),
    Start(StartDoneCallback),
    Stop(DoneCallback),
    AddObserver {
        id: RegistrationId,
        observer: Arc<dyn Observer>,
        done: Option<DoneCallback>,
    },
    RemoveObserver(RegistrationId),
    Server(ServerEvent),
    Terminate,
}

pub(crate) type CommandSender = mpsc::UnboundedSender<Command>;

/// Handle to a server context. Cheap to clone.
#[derive(Clone)]
pub struct ServerContext {
    inner: Arc<Inner>,
}

struct Inner {
    id: ContextId,
    config: ServerConfig,
    commands: CommandSender,
    task: Mutex<Option<JoinHandle<()>>>,
    next_registration: AtomicU64,
}

impl ServerContext {
    /// Spawns a context serving HTTP with the built-in engine.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let engine = Arc::new(HttpEngine::new(config.clone()));
        Self::with_engine(config, engine)
    }

    /// Spawns a context that creates servers through `engine`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn with_engine(config: ServerConfig, engine: Arc<dyn ServerEngine>) -> Self {
        let id = ContextId::next();
        let (commands, receiver) = mpsc::unbounded_channel();

        let state = ContextTask {
            id,
            engine,
            events: HandlerEvents::new(commands.clone()),
            manager: None,
            stopping: false,
        };
        let task = tokio::spawn(affinity::scope(id, state.run(receiver)));
        debug!(context = %id, "server context started");

        Self {
            inner: Arc::new(Inner {
                id,
                config,
                commands,
                task: Mutex::new(Some(task)),
                next_registration: AtomicU64::new(1),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Returns true if the caller runs on this context's task.
    #[must_use]
    pub fn is_current(&self) -> bool {
        affinity::is_on(self.inner.id)
    }

    /// Runs `task` on the context, after every command already queued.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        self.send(Command::Task(Box::new(task)));
    }

    /// Starts the server if needed and calls `callback` with its origin.
    ///
    /// Runs `callback` right away (on the context) when the server is
    /// already up. Concurrent starts share one server and are answered in
    /// request order.
    pub fn start(&self, callback: impl FnOnce(&str) + Send + 'static) {
        self.send(Command::Start(Box::new(callback)));
    }

    /// Stops the server and calls `callback` once it is fully torn down, or
    /// immediately if no server is running.
    pub fn stop(&self, callback: impl FnOnce() + Send + 'static) {
        self.send(Command::Stop(Box::new(callback)));
    }

    /// Subscribes `observer`. Dropping the returned handle unsubscribes it.
    pub fn add_observer(&self, observer: Arc<dyn Observer>) -> Registration {
        self.register(observer, None)
    }

    /// Like [`add_observer`](Self::add_observer), calling `done` on the
    /// context once the observer is in the list.
    pub fn add_observer_then(
        &self,
        observer: Arc<dyn Observer>,
        done: impl FnOnce() + Send + 'static,
    ) -> Registration {
        self.register(observer, Some(Box::new(done)))
    }

    /// Subscribes `observer`, then starts the server.
    pub fn add_observer_and_start(
        &self,
        observer: Arc<dyn Observer>,
        callback: impl FnOnce(&str) + Send + 'static,
    ) -> Registration {
        let context = self.clone();
        self.add_observer_then(observer, move || context.start(callback))
    }

    /// Starts the server and waits for its origin.
    ///
    /// # Errors
    ///
    /// Returns `StartAborted` if the server could not come up, or
    /// `ContextClosed` if the context task is gone.
    pub async fn started(&self) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.try_send(Command::Start(Box::new(move |origin: &str| {
            let _ = tx.send(origin.to_string());
        })))?;
        rx.await.map_err(|_| ServerError::StartAborted)
    }

    /// Stops the server and waits until it is torn down.
    ///
    /// # Errors
    ///
    /// Returns `ContextClosed` if the context task is gone.
    pub async fn stopped(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.try_send(Command::Stop(Box::new(move || {
            let _ = tx.send(());
        })))?;
        rx.await.map_err(|_| ServerError::ContextClosed)
    }

    /// Stops any running server and ends the context task.
    ///
    /// A panic raised on the context task is resumed here.
    ///
    /// # Errors
    ///
    /// Returns the stop error, if stopping failed for a reason other than a
    /// panic.
    pub async fn teardown(&self) -> Result<()> {
        let stopped = self.stopped().await;
        let _ = self.inner.commands.send(Command::Terminate);

        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                if error.is_panic() {
                    std::panic::resume_unwind(error.into_panic());
                }
                warn!(context = %self.inner.id, %error, "server context task was cancelled");
            }
        }

        stopped
    }

    pub(crate) fn remove_registration(&self, id: RegistrationId) {
        if self.inner.commands.send(Command::RemoveObserver(id)).is_err() {
            debug!(registration = id, "context closed before unregistering observer");
        }
    }

    fn register(&self, observer: Arc<dyn Observer>, done: Option<DoneCallback>) -> Registration {
        let id = self.inner.next_registration.fetch_add(1, Ordering::Relaxed);
        self.send(Command::AddObserver { id, observer, done });
        Registration::new(id, self.clone())
    }

    fn send(&self, command: Command) {
        if self.try_send(command).is_err() {
            warn!(context = %self.inner.id, "server context closed, dropping command");
        }
    }

    fn try_send(&self, command: Command) -> Result<()> {
        self.inner
            .commands
            .send(command)
            .map_err(|_| ServerError::ContextClosed)
    }
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// State owned by the context task.
struct ContextTask {
    id: ContextId,
    engine: Arc<dyn ServerEngine>,
    events: HandlerEvents,
    manager: Option<ServerManager>,
    /// Set while a stop sequence is in flight.
    stopping: bool,
}

impl ContextTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            if matches!(command, Command::Terminate) {
                break;
            }
            self.handle(command);
        }

        if let Some(manager) = &self.manager {
            warn!(
                context = %self.id,
                observers = manager.observer_count(),
                "server context terminated with a live server manager"
            );
        }
        debug!(context = %self.id, "server context finished");
    }

    fn manager(&mut self) -> &mut ServerManager {
        let engine = &self.engine;
        let events = &self.events;
        self.manager
            .get_or_insert_with(|| ServerManager::new(Arc::clone(engine), events.clone()))
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Task(task) => task(),
            Command::Start(callback) => {
                assert!(!self.stopping, "server start requested while stopping");
                self.manager().start(callback);
            }
            Command::Stop(callback) => {
                assert!(!self.stopping, "server stop requested while already stopping");
                match self.manager.as_mut() {
                    Some(manager) => {
                        self.stopping = manager.has_handler();
                        manager.stop(callback);
                    }
                    None => callback(),
                }
            }
            Command::AddObserver { id, observer, done } => {
                assert!(!self.stopping, "observer registered while the server is stopping");
                self.manager().add_observer(id, Arc::clone(&observer));
                observer.on_registered();
                if let Some(done) = done {
                    done();
                }
            }
            Command::RemoveObserver(id) => {
                if let Some(manager) = self.manager.as_mut() {
                    let observer = manager.remove_observer(id);
                    observer.on_unregistered();
                }
            }
            Command::Server(event) => self.handle_server_event(event),
            Command::Terminate => unreachable!("terminate is handled by the run loop"),
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        let Some(manager) = self.manager.as_mut() else {
            warn!(context = %self.id, ?event, "server event without a server manager");
            return;
        };

        match event {
            ServerEvent::Created { origin } => manager.notify_server_created(origin),
            ServerEvent::StartFailed(error) => {
                manager.notify_start_failed(&error.to_string());
                self.stopping = false;
            }
            ServerEvent::Destroyed => manager.notify_server_destroyed(),
            ServerEvent::HandlerDeleted => {
                manager.notify_server_handler_deleted();
                self.manager = None;
                self.stopping = false;
            }
            ServerEvent::ClientConnected(connection) => {
                manager.notify_client_connected(&connection);
            }
            ServerEvent::ClientDisconnected(connection) => {
                manager.notify_client_disconnected(&connection);
            }
            ServerEvent::HttpRequest {
                request,
                connection,
            } => manager.notify_http_request(&request, &connection),
        }
    }
}
