//! # probe-cors
//!
//! Declarative CORS tests on top of the probe test server.
//!
//! A test is a [`TestSetup`]: the resources a page is expected to request,
//! what each one answers, and how many success or failure messages and
//! which console messages the page should produce. [`CorsTestHandler`]
//! serves those resources, watches a [`BrowserEngine`] load them and
//! reports every deviation in a [`TestOutcome`].
//!
//! ## Architecture
//!
//! - **HandlerType**: the four origins a resource can live on
//! - **Resource / TestSetup**: expectations and observed counters
//! - **Scenario**: the catalog of basic, iframe sandbox and XHR/fetch tests
//! - **CorsTestHandler**: runs one setup, serving server resources through a
//!   [`TestServerObserver`] and everything else through [`EngineClient`]
//! - **ScriptedEngine**: replays a fixed event list in place of a browser
//!
//! ## Example Usage
//!
//! ```ignore
//! use probe_cors::{CorsTestConfig, Scenario, run_scenario};
//! use probe_server::{ServerConfig, ServerContext};
//!
//! let context = ServerContext::new(ServerConfig::default());
//! let scenario = Scenario::by_name("CorsTest.XhrWithHeaderServerToServer").unwrap();
//! let outcome = run_scenario(scenario, &context, &engine, &CorsTestConfig::default()).await?;
//! outcome.assert_passed();
//! context.teardown().await?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod handler_type;
pub mod observer;
pub mod outcome;
pub mod payload;
pub mod resource;
pub mod scenarios;
pub mod scripted;
pub mod setup;

// Re-export main types for convenience
pub use config::CorsTestConfig;
pub use driver::{CorsTestHandler, run_scenario};
pub use engine::{BrowserEngine, CannedResponse, EngineClient};
pub use error::{CorsError, Result};
pub use handler_type::{HandlerType, NULL_ORIGIN};
pub use observer::TestServerObserver;
pub use outcome::{Failures, Mismatch, TestOutcome};
pub use payload::{ExecMode, FAILURE_MSG, SUCCESS_MSG};
pub use resource::{ErrorCode, Resource, SubResource};
pub use scenarios::{Sandbox, Scenario, setup_exec_request, setup_iframe_request};
pub use scripted::{ScriptedEngine, Step};
pub use setup::TestSetup;
