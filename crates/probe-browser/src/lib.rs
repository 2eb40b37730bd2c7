//! # probe-browser
//!
//! Runs probe CORS tests in headless Chrome through chromiumoxide.
//!
//! ## Architecture
//!
//! - **TestBrowser**: Chrome process lifecycle
//! - **ChromeEngine**: a [`probe_cors::BrowserEngine`] that opens one page per
//!   test and forwards load, console and query events to the driver
//! - **ConsoleCapture**: every ordinary console message, for debugging
//!
//! ## Example Usage
//!
//! ```ignore
//! use probe_browser::{ChromeEngine, TestBrowserConfig};
//! use probe_cors::{CorsTestConfig, Scenario, run_scenario};
//! use probe_server::{ServerConfig, ServerContext};
//!
//! let engine = ChromeEngine::launch(TestBrowserConfig::default()).await?;
//! let context = ServerContext::new(ServerConfig::default());
//! let scenario = Scenario::by_name("CorsTest.XhrNoHeaderServerToHttpScheme").unwrap();
//! run_scenario(scenario, &context, &engine, &CorsTestConfig::default())
//!     .await?
//!     .assert_passed();
//! context.teardown().await?;
//! engine.shutdown().await?;
//! ```
//!
//! Integration tests need Chrome installed and are ignored by default. Run
//! them with `cargo test -p probe-browser -- --ignored`.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod browser;
pub mod console;
pub mod engine;
pub mod error;

// Re-export main types for convenience
pub use browser::{TestBrowser, TestBrowserConfig};
pub use console::{ConsoleCapture, ConsoleLevel, ConsoleMessage, PageEvent, Query};
pub use engine::ChromeEngine;
pub use error::{BrowserError, Result};
