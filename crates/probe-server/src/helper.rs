//! Lifecycle wrapper for observers that start the server and shut down cleanly.
//!
//! ```text
//! None --initialize--> Initializing --start done--> Initialized
//!   ^                                                    |
//!   +------unregistered------ ShuttingDown <--shutdown---+
//! ```

use crate::affinity;
use crate::context::ServerContext;
use crate::observer::{Dispatch, Observer, Registration};
use crate::request::{Connection, HttpRequest};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperState {
    None,
    Initializing,
    Initialized,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperEvent {
    /// `initialize()` was called.
    Initialize,
    /// The server reported its origin.
    StartDone,
    /// `shutdown()` was called.
    Shutdown,
    /// The registration has been torn down.
    Unregistered,
}

impl HelperState {
    /// Returns the state reached by `event`, or `None` if the transition is
    /// not allowed.
    #[must_use]
    pub fn next(self, event: HelperEvent) -> Option<HelperState> {
        use HelperEvent as E;
        use HelperState as S;

        match (self, event) {
            (S::None, E::Initialize) => Some(S::Initializing),
            (S::Initializing, E::StartDone) => Some(S::Initialized),
            (S::Initialized, E::Shutdown) => Some(S::ShuttingDown),
            (S::ShuttingDown, E::Unregistered) => Some(S::None),
            _ => None,
        }
    }
}

impl fmt::Display for HelperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HelperState::None => "none",
            HelperState::Initializing => "initializing",
            HelperState::Initialized => "initialized",
            HelperState::ShuttingDown => "shutting down",
        };
        f.write_str(name)
    }
}

/// Callbacks for the owner of an [`ObserverHelper`]. All run on the server
/// context.
pub trait HelperDelegate: Send + Sync + 'static {
    /// The server is up and reachable at `origin`.
    fn on_initialized(&self, origin: &str);

    /// Return [`Dispatch::Handled`] to claim the request.
    fn on_http_request(&self, request: &HttpRequest, connection: &Connection) -> Dispatch;

    /// The registration is gone and the helper is back in `None`.
    fn on_shutdown(&self);
}

/// Registers an observer, starts the server and tears the registration down
/// again, tracking progress in a [`HelperState`].
///
/// `initialize` and `shutdown` must be called on the server context.
pub struct ObserverHelper<D: HelperDelegate> {
    context: ServerContext,
    delegate: D,
    state: Mutex<HelperState>,
    registration: Mutex<Option<Registration>>,
    /// Set by `abandon`; late start and unregister notifications are ignored.
    abandoned: AtomicBool,
}

impl<D: HelperDelegate> ObserverHelper<D> {
    pub fn new(context: ServerContext, delegate: D) -> Arc<Self> {
        Arc::new(Self {
            context,
            delegate,
            state: Mutex::new(HelperState::None),
            registration: Mutex::new(None),
            abandoned: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn state(&self) -> HelperState {
        *self.state.lock()
    }

    #[must_use]
    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    /// Registers with the manager and requests a server start.
    ///
    /// # Panics
    ///
    /// Panics off the server context or outside the `None` state.
    #[track_caller]
    pub fn initialize(self: &Arc<Self>) {
        affinity::require(self.context.id());
        self.transition(HelperEvent::Initialize);

        let weak: Weak<Self> = Arc::downgrade(self);
        let observer: Arc<dyn Observer> = self.clone();
        let registration = self.context.add_observer_and_start(observer, move |origin: &str| {
            if let Some(helper) = weak.upgrade() {
                helper.start_done(origin);
            }
        });
        *self.registration.lock() = Some(registration);
    }

    /// Drops the registration. `on_shutdown` follows once it is removed.
    ///
    /// # Panics
    ///
    /// Panics off the server context or outside the `Initialized` state.
    #[track_caller]
    pub fn shutdown(&self) {
        affinity::require(self.context.id());
        self.transition(HelperEvent::Shutdown);

        let registration = self.registration.lock().take();
        drop(registration);
    }

    /// Gives up on a start that never completed. The registration is
    /// dropped and the helper returns to `None` without calling
    /// `on_shutdown`.
    ///
    /// # Panics
    ///
    /// Panics off the server context or outside the `Initializing` state.
    #[track_caller]
    pub fn abandon(&self) {
        affinity::require(self.context.id());
        {
            let mut state = self.state.lock();
            assert!(
                *state == HelperState::Initializing,
                "observer helper cannot abandon a start while {}",
                *state
            );
            *state = HelperState::None;
        }
        self.abandoned.store(true, Ordering::SeqCst);
        debug!("observer helper abandoned its start");

        let registration = self.registration.lock().take();
        drop(registration);
    }

    fn start_done(&self, origin: &str) {
        if self.abandoned.load(Ordering::SeqCst) {
            return;
        }
        self.transition(HelperEvent::StartDone);
        self.delegate.on_initialized(origin);
    }

    #[track_caller]
    fn transition(&self, event: HelperEvent) {
        let mut state = self.state.lock();
        let Some(next) = state.next(event) else {
            panic!("observer helper cannot handle {event:?} while {}", *state);
        };
        debug!(from = %*state, to = %next, "observer helper transition");
        *state = next;
    }
}

impl<D: HelperDelegate> Observer for ObserverHelper<D> {
    fn on_unregistered(&self) {
        if self.abandoned.load(Ordering::SeqCst) {
            return;
        }
        self.transition(HelperEvent::Unregistered);
        self.delegate.on_shutdown();
    }

    fn on_http_request(&self, request: &HttpRequest, connection: &Connection) -> Dispatch {
        self.delegate.on_http_request(request, connection)
    }
}

impl<D: HelperDelegate> Drop for ObserverHelper<D> {
    fn drop(&mut self) {
        let state = *self.state.get_mut();
        if state != HelperState::None {
            warn!(%state, "observer helper dropped before shutdown completed");
        }
    }
}

impl<D: HelperDelegate> fmt::Debug for ObserverHelper<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverHelper")
            .field("context", &self.context.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
