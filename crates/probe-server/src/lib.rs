//! # probe-server
//!
//! A single-instance embedded HTTP server for browser tests, with ordered
//! observer dispatch and explicit start/stop coordination.
//!
//! ## Architecture
//!
//! - **ServerContext**: owns the server manager on one tokio task; every
//!   entry point posts a message to it and returns
//! - **ServerManager**: at most one running server, its observers and the
//!   pending start/stop callbacks
//! - **ServerEngine / HandlerEvents**: seam between the HTTP engine and the
//!   manager; engine callbacks are redirected onto the context
//! - **Observer / Registration**: priority-ordered subscribers, unsubscribed
//!   when their registration is dropped
//! - **ObserverHelper**: four-state lifecycle for fixtures that register,
//!   wait for the server and shut down
//!
//! ## Example Usage
//!
//! ```ignore
//! use probe_server::{Dispatch, HttpResponse, Observer, ServerConfig, ServerContext};
//! use std::sync::Arc;
//!
//! struct Hello;
//!
//! impl Observer for Hello {
//!     fn on_http_request(&self, request: &HttpRequest, connection: &Connection) -> Dispatch {
//!         connection.send_response(&HttpResponse::new(200, "text/plain"), "hello");
//!         Dispatch::Handled
//!     }
//! }
//!
//! let context = ServerContext::new(ServerConfig::default());
//! let registration = context.add_observer(Arc::new(Hello));
//! let origin = context.started().await?;
//! // ... issue requests against `origin` ...
//! drop(registration);
//! context.teardown().await?;
//! ```
//!
//! ## Threading
//!
//! Manager state is only touched on the context task, so it carries no
//! locks. Observer callbacks run there too and must answer requests
//! synchronously from inside the notification.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod affinity;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod helper;
pub mod http;
pub mod logging;
mod manager;
pub mod observer;
pub mod request;

// Re-export main types for convenience
pub use affinity::ContextId;
pub use config::{DEFAULT_ORIGIN, DEFAULT_PORT, ServerConfig};
pub use context::ServerContext;
pub use error::{Result, ServerError};
pub use handler::{HandlerEvents, ServerControl, ServerEngine, ServerEvent};
pub use helper::{HelperDelegate, HelperEvent, HelperState, ObserverHelper};
pub use http::HttpEngine;
pub use manager::{DoneCallback, StartDoneCallback};
pub use observer::{Dispatch, Observer, Registration, RegistrationId};
pub use request::{
    Connection, ConnectionId, ConnectionInfo, HttpRequest, HttpResponse, Reply, path_url,
};
