//! Console and query capture.
//!
//! Pages talk to the test driver through `window.testQuery`, which the
//! engine installs as a shim that logs a tagged JSON record with
//! `console.debug`. Every console event is therefore either a query for the
//! driver or an ordinary message the driver checks against its expectations.

use chromiumoxide::cdp::js_protocol::runtime::{ConsoleApiCalledType, EventConsoleApiCalled};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tag that marks a console record as a query.
pub const QUERY_TAG: &str = "__probe_query__";

/// Installed into every document before its own scripts run.
pub const QUERY_SHIM: &str = r#"(function() {
  const debug = console.debug.bind(console);
  window.testQuery = function(query) {
    debug('__probe_query__' + JSON.stringify({frame_url: location.href, request: String(query.request)}));
  };
})();"#;

/// The severity level of a console message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsoleLevel {
    Log,
    Info,
    Warning,
    Error,
    Debug,
    /// Catch-all for other console APIs and browser log entries
    Other,
}

impl From<&str> for ConsoleLevel {
    fn from(s: &str) -> Self {
        match s {
            "log" | "verbose" => ConsoleLevel::Log,
            "info" => ConsoleLevel::Info,
            "warning" => ConsoleLevel::Warning,
            "error" => ConsoleLevel::Error,
            "debug" => ConsoleLevel::Debug,
            _ => ConsoleLevel::Other,
        }
    }
}

impl From<&EventConsoleApiCalled> for ConsoleLevel {
    fn from(event: &EventConsoleApiCalled) -> Self {
        match event.r#type {
            ConsoleApiCalledType::Log => ConsoleLevel::Log,
            ConsoleApiCalledType::Info => ConsoleLevel::Info,
            ConsoleApiCalledType::Warning => ConsoleLevel::Warning,
            ConsoleApiCalledType::Error => ConsoleLevel::Error,
            ConsoleApiCalledType::Debug => ConsoleLevel::Debug,
            _ => ConsoleLevel::Other,
        }
    }
}

/// A captured console message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub level: ConsoleLevel,
    /// Arguments joined with spaces.
    pub text: String,
}

impl ConsoleMessage {
    #[must_use]
    pub fn new(level: ConsoleLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

/// A `window.testQuery` call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Query {
    pub frame_url: String,
    pub request: String,
}

/// What one console record means to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Query(Query),
    Console(ConsoleMessage),
}

impl PageEvent {
    /// Classifies a console record by its tag.
    #[must_use]
    pub fn classify(message: ConsoleMessage) -> Self {
        message
            .text
            .strip_prefix(QUERY_TAG)
            .and_then(|json| serde_json::from_str::<Query>(json).ok())
            .map_or(PageEvent::Console(message), PageEvent::Query)
    }
}

/// Every ordinary console message seen by an engine, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ConsoleCapture {
    messages: Arc<Mutex<Vec<ConsoleMessage>>>,
}

impl ConsoleCapture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, message: ConsoleMessage) {
        self.messages.lock().push(message);
    }

    /// Returns all captured messages as a snapshot.
    #[must_use]
    pub fn messages(&self) -> Vec<ConsoleMessage> {
        self.messages.lock().clone()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.level == ConsoleLevel::Error)
            .count()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Converts a `Runtime.consoleAPICalled` event into a message.
pub(crate) fn parse_console_event(event: &EventConsoleApiCalled) -> ConsoleMessage {
    let text = event
        .args
        .iter()
        .map(|arg| match &arg.value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => arg
                .description
                .clone()
                .unwrap_or_else(|| "<object>".to_string()),
        })
        .collect::<Vec<_>>()
        .join(" ");

    ConsoleMessage::new(ConsoleLevel::from(event), text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_records_are_queries() {
        let record = format!(
            r#"{QUERY_TAG}{{"frame_url":"http://127.0.0.1:8098/main","request":"CorsTestHandler.Success"}}"#
        );
        let event = PageEvent::classify(ConsoleMessage::new(ConsoleLevel::Debug, record));

        assert_eq!(
            event,
            PageEvent::Query(Query {
                frame_url: "http://127.0.0.1:8098/main".to_string(),
                request: "CorsTestHandler.Success".to_string(),
            })
        );
    }

    #[test]
    fn untagged_or_malformed_records_are_console_messages() {
        for text in ["SecurityError: Blocked a frame", "__probe_query__{not json"] {
            let message = ConsoleMessage::new(ConsoleLevel::Log, text);
            assert_eq!(
                PageEvent::classify(message.clone()),
                PageEvent::Console(message)
            );
        }
    }

    #[test]
    fn shim_uses_the_tag() {
        assert!(QUERY_SHIM.contains(QUERY_TAG));
        assert!(QUERY_SHIM.contains("window.testQuery"));
    }

    #[test]
    fn capture_accumulates_in_order() {
        let capture = ConsoleCapture::new();
        capture.push(ConsoleMessage::new(ConsoleLevel::Log, "one"));
        capture.push(ConsoleMessage::new(ConsoleLevel::Error, "two"));

        assert_eq!(capture.len(), 2);
        assert_eq!(capture.error_count(), 1);
        assert_eq!(capture.messages()[1].text, "two");

        capture.clear();
        assert!(capture.is_empty());
    }

    #[test]
    fn log_levels_parse() {
        assert_eq!(ConsoleLevel::from("error"), ConsoleLevel::Error);
        assert_eq!(ConsoleLevel::from("verbose"), ConsoleLevel::Log);
        assert_eq!(ConsoleLevel::from("nope"), ConsoleLevel::Other);
    }
}
