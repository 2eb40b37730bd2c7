//! Requests, responses and the per-connection responder.

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tracing::warn;

/// Identifies one accepted client connection for the life of the server.
pub type ConnectionId = u64;

/// Address information for an accepted client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub client_address: SocketAddr,
}

/// An HTTP request received by the embedded server.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL: server origin followed by path and query.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpRequest {
    /// Creates a GET request with no headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Adds a header. Invalid names or values are logged and skipped.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(%name, %value, "skipping invalid request header"),
        }
        self
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The URL with query and fragment removed.
    #[must_use]
    pub fn path_url(&self) -> &str {
        path_url(&self.url)
    }
}

/// Response metadata: status, MIME type and extra headers.
///
/// The body is passed separately when sending so one template can be
/// reused for every matching request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub mime_type: String,
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn new(status: u16, mime_type: impl Into<String>) -> Self {
        Self {
            status,
            mime_type: mime_type.into(),
            headers: Vec::new(),
        }
    }

    /// Sets a header, replacing any existing value with the same
    /// (case-insensitive) name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some((_, existing)) => *existing = value,
            None => self.headers.push((name, value)),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What the engine writes back on a connection.
#[derive(Debug, Clone)]
pub struct Reply {
    pub response: HttpResponse,
    pub body: Bytes,
    /// Close the connection after the body has been written.
    pub close: bool,
}

/// Responder for one in-flight request.
///
/// Observers answer through [`Connection::send_response`] while handling
/// the request notification. Only the first response is delivered.
pub struct Connection {
    info: ConnectionInfo,
    reply: Mutex<Option<oneshot::Sender<Reply>>>,
}

impl Connection {
    pub(crate) fn new(info: ConnectionInfo, reply: oneshot::Sender<Reply>) -> Self {
        Self {
            info,
            reply: Mutex::new(Some(reply)),
        }
    }

    /// Creates a responder together with the receiving end, for engines and
    /// tests that dispatch requests themselves.
    #[must_use]
    pub fn channel(info: ConnectionInfo) -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(info, tx), rx)
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.info.id
    }

    #[must_use]
    pub fn info(&self) -> ConnectionInfo {
        self.info
    }

    /// Returns true once a response has been sent.
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.reply.lock().is_none()
    }

    /// Sends `response` with `body`.
    ///
    /// A non-empty body is followed by closing the connection. An empty body
    /// sends headers only and leaves the connection open.
    pub fn send_response(&self, response: &HttpResponse, body: impl Into<Bytes>) {
        let body = body.into();
        let close = !body.is_empty();
        let Some(reply) = self.reply.lock().take() else {
            warn!(connection = self.info.id, "response already sent, dropping duplicate");
            return;
        };

        if reply
            .send(Reply {
                response: response.clone(),
                body,
                close,
            })
            .is_err()
        {
            warn!(connection = self.info.id, "client went away before the response was sent");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("info", &self.info)
            .field("answered", &self.is_answered())
            .finish()
    }
}

/// Removes the query and fragment components from `url`.
///
/// Idempotent: the result never contains `?` or `#`.
#[must_use]
pub fn path_url(url: &str) -> &str {
    match url.find(['?', '#']) {
        Some(index) => &url[..index],
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn info() -> ConnectionInfo {
        ConnectionInfo {
            id: 7,
            client_address: "127.0.0.1:5555".parse().unwrap(),
        }
    }

    #[test]
    fn path_url_strips_query_and_fragment() {
        assert_eq!(path_url("http://a/b?c=d#e"), "http://a/b");
        assert_eq!(path_url("http://a/b#e?x"), "http://a/b");
        assert_eq!(path_url("customnonstd:corstest/x.html"), "customnonstd:corstest/x.html");
        assert_eq!(path_url(""), "");
    }

    proptest! {
        #[test]
        fn path_url_is_idempotent(url in ".*") {
            let once = path_url(&url);
            prop_assert_eq!(path_url(once), once);
            prop_assert!(!once.contains('?') && !once.contains('#'));
        }
    }

    #[test]
    fn request_headers_are_case_insensitive() {
        let request = HttpRequest::get("http://127.0.0.1:8098/a").with_header("Origin", "null");
        assert_eq!(request.header("origin"), Some("null"));

        let request = request.with_header("bad header", "x");
        assert_eq!(request.headers.len(), 1);
    }

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut response = HttpResponse::new(200, "text/plain");
        response.set_header("Access-Control-Allow-Origin", "null");
        response.set_header("access-control-allow-origin", "http://x");

        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.header("ACCESS-CONTROL-ALLOW-ORIGIN"), Some("http://x"));
    }

    #[test]
    fn non_empty_body_closes_connection() {
        let (connection, mut rx) = Connection::channel(info());
        connection.send_response(&HttpResponse::new(200, "text/html"), "TEST");

        let reply = rx.try_recv().unwrap();
        assert!(reply.close);
        assert_eq!(&reply.body[..], b"TEST");
        assert!(connection.is_answered());
    }

    #[test]
    fn empty_body_keeps_connection_open() {
        let (connection, mut rx) = Connection::channel(info());
        connection.send_response(&HttpResponse::new(204, "text/plain"), Bytes::new());

        let reply = rx.try_recv().unwrap();
        assert!(!reply.close);
        assert!(reply.body.is_empty());
    }

    #[test]
    fn second_response_is_dropped() {
        let (connection, mut rx) = Connection::channel(info());
        connection.send_response(&HttpResponse::new(200, "text/plain"), "first");
        connection.send_response(&HttpResponse::new(500, "text/plain"), "second");

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.response.status, 200);
    }
}
