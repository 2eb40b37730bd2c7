//! Observer interface and scoped registrations.
//!
//! Observers are notified of client and request events in registration
//! order. Each call returns a [`Dispatch`]; the first observer that reports
//! [`Dispatch::Handled`] stops propagation for that event.

use crate::context::ServerContext;
use crate::request::{Connection, ConnectionInfo, HttpRequest};
use std::fmt;

/// Result of offering an event to one observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Keep offering the event to later observers.
    Unhandled,
    /// The event was claimed; stop dispatching.
    Handled,
}

impl Dispatch {
    #[must_use]
    pub fn is_handled(self) -> bool {
        matches!(self, Dispatch::Handled)
    }
}

/// Receives server notifications.
///
/// All methods run on the server context task. Implementations may add or
/// remove observers from inside a callback; dispatch always walks the list
/// as it was when the event arrived.
pub trait Observer: Send + Sync {
    /// The observer has been added to the manager.
    fn on_registered(&self) {}

    /// The observer has been removed from the manager.
    fn on_unregistered(&self) {}

    fn on_client_connected(&self, _connection: &ConnectionInfo) -> Dispatch {
        Dispatch::Unhandled
    }

    fn on_client_disconnected(&self, _connection: &ConnectionInfo) -> Dispatch {
        Dispatch::Unhandled
    }

    /// A request arrived. Answer it with `connection.send_response` and
    /// return [`Dispatch::Handled`] to claim it.
    fn on_http_request(&self, _request: &HttpRequest, _connection: &Connection) -> Dispatch {
        Dispatch::Unhandled
    }
}

/// Unique key for one observer subscription.
pub type RegistrationId = u64;

/// A live observer subscription.
///
/// Dropping the registration unsubscribes the observer. The removal is
/// posted to the server context, so it happens there no matter which task
/// drops the handle.
#[must_use = "dropping a Registration unsubscribes the observer"]
pub struct Registration {
    id: RegistrationId,
    context: ServerContext,
}

impl Registration {
    pub(crate) fn new(id: RegistrationId, context: ServerContext) -> Self {
        Self { id, context }
    }

    #[must_use]
    pub fn id(&self) -> RegistrationId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.context.remove_registration(self.id);
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("context", &self.context.id())
            .finish()
    }
}
