//! Expected request/response exchanges.

use crate::handler_type::HandlerType;
use crate::outcome::Mismatch;
use crate::payload::{DEFAULT_HTML, MIME_TYPE_HTML};
use probe_server::{HttpRequest, HttpResponse};
use std::fmt;

/// Navigation error codes reported by the browser engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorCode {
    #[default]
    None,
    Failed,
    Aborted,
    BlockedByResponse,
    UnknownUrlScheme,
    Other(i32),
}

impl ErrorCode {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::None => 0,
            ErrorCode::Failed => -2,
            ErrorCode::Aborted => -3,
            ErrorCode::BlockedByResponse => -27,
            ErrorCode::UnknownUrlScheme => -302,
            ErrorCode::Other(code) => code,
        }
    }

    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ErrorCode::None,
            -2 => ErrorCode::Failed,
            -3 => ErrorCode::Aborted,
            -27 => ErrorCode::BlockedByResponse,
            -302 => ErrorCode::UnknownUrlScheme,
            other => ErrorCode::Other(other),
        }
    }

    /// Parses a network error name such as `net::ERR_ABORTED`.
    #[must_use]
    pub fn from_error_text(text: &str) -> Self {
        match text.trim().trim_start_matches("net::") {
            "" => ErrorCode::None,
            "ERR_ABORTED" => ErrorCode::Aborted,
            "ERR_BLOCKED_BY_RESPONSE" => ErrorCode::BlockedByResponse,
            "ERR_UNKNOWN_URL_SCHEME" => ErrorCode::UnknownUrlScheme,
            _ => ErrorCode::Failed,
        }
    }

    /// Network error name without the `net::` prefix.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::None => "ERR_NONE",
            ErrorCode::Failed => "ERR_FAILED",
            ErrorCode::Aborted => "ERR_ABORTED",
            ErrorCode::BlockedByResponse => "ERR_BLOCKED_BY_RESPONSE",
            ErrorCode::UnknownUrlScheme => "ERR_UNKNOWN_URL_SCHEME",
            ErrorCode::Other(_) => "ERR_OTHER",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Cross-origin metadata for a resource requested by another document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResource {
    /// Origin of the requesting document; `null` for non-standard schemes.
    pub main_origin: String,
    /// False when the target scheme cannot take part in CORS at all.
    pub supports_cors: bool,
    pub is_cross_origin: bool,
}

impl SubResource {
    #[must_use]
    pub fn new(main: HandlerType, target: HandlerType) -> Self {
        Self {
            main_origin: main.document_origin().to_string(),
            supports_cors: target.is_standard(),
            is_cross_origin: main.is_cross_origin_to(target),
        }
    }

    /// Checks the request's `Origin` header: it must carry the requesting
    /// origin for cross-origin requests and be absent otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Mismatch::OriginHeader`] describing the difference.
    pub fn verify_request(&self, request: &HttpRequest) -> Result<(), Mismatch> {
        let actual = request.header("origin").unwrap_or_default();
        let expected = if self.is_cross_origin {
            self.main_origin.as_str()
        } else {
            ""
        };

        if actual == expected {
            Ok(())
        } else {
            Err(Mismatch::OriginHeader {
                url: request.url.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
    }
}

/// One expected HTTP exchange and the counters observed for it.
#[derive(Debug, Clone)]
pub struct Resource {
    pub handler: HandlerType,
    pub path: String,

    pub response: HttpResponse,
    pub response_data: String,

    /// Expected error code in `on_load_error`.
    pub expected_error_code: ErrorCode,

    pub expected_response_ct: u32,
    pub expected_success_query_ct: u32,
    pub expected_failure_query_ct: u32,

    pub response_ct: u32,
    pub success_query_ct: u32,
    pub failure_query_ct: u32,

    /// Set for resources requested cross-document by XHR or fetch.
    pub cors: Option<SubResource>,
}

impl Resource {
    /// A resource answered with the default HTML page.
    #[must_use]
    pub fn new(handler: HandlerType, path: impl Into<String>) -> Self {
        Self::with_response(handler, path, MIME_TYPE_HTML, DEFAULT_HTML, 200)
    }

    #[must_use]
    pub fn with_response(
        handler: HandlerType,
        path: impl Into<String>,
        mime_type: &str,
        data: impl Into<String>,
        status: u16,
    ) -> Self {
        Self {
            handler,
            path: path.into(),
            response: HttpResponse::new(status, mime_type),
            response_data: data.into(),
            expected_error_code: ErrorCode::None,
            expected_response_ct: 1,
            expected_success_query_ct: 0,
            expected_failure_query_ct: 0,
            response_ct: 0,
            success_query_ct: 0,
            failure_query_ct: 0,
            cors: None,
        }
    }

    /// Marks this resource as requested by a document on `main`.
    ///
    /// Requests to a scheme without CORS support are never expected to
    /// arrive. A cross-origin response gets an allow-origin header only when
    /// `add_header` is set.
    pub fn init_cors(&mut self, main: HandlerType, add_header: bool) {
        let cors = SubResource::new(main, self.handler);

        if !cors.supports_cors {
            self.expected_response_ct = 0;
        }
        if cors.is_cross_origin && add_header {
            self.response
                .set_header("Access-Control-Allow-Origin", cors.main_origin.clone());
        }

        self.cors = Some(cors);
    }

    /// Panics unless the resource is in a valid initial state.
    #[track_caller]
    pub fn validate(&self) {
        assert!(!self.path.is_empty(), "resource path must not be empty");
        assert!(
            !self.response.mime_type.is_empty(),
            "resource {} has no MIME type",
            self.path
        );
        assert_eq!(self.response_ct, 0, "resource {} was already served", self.path);
        assert_eq!(self.success_query_ct + self.failure_query_ct, 0);
    }

    #[must_use]
    pub fn path_url(&self) -> String {
        self.handler.path_url(&self.path)
    }

    /// Returns true if every actual counter equals its expectation.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.response_ct == self.expected_response_ct
            && self.success_query_ct == self.expected_success_query_ct
            && self.failure_query_ct == self.expected_failure_query_ct
    }

    /// Lists every counter that differs from its expectation.
    #[must_use]
    pub fn count_mismatches(&self) -> Vec<Mismatch> {
        let url = self.path_url();
        let mut mismatches = Vec::new();

        if self.response_ct != self.expected_response_ct {
            mismatches.push(Mismatch::ResponseCount {
                url: url.clone(),
                expected: self.expected_response_ct,
                actual: self.response_ct,
            });
        }
        if self.success_query_ct != self.expected_success_query_ct {
            mismatches.push(Mismatch::SuccessQueryCount {
                url: url.clone(),
                expected: self.expected_success_query_ct,
                actual: self.success_query_ct,
            });
        }
        if self.failure_query_ct != self.expected_failure_query_ct {
            mismatches.push(Mismatch::FailureQueryCount {
                url,
                expected: self.expected_failure_query_ct,
                actual: self.failure_query_ct,
            });
        }

        mismatches
    }

    /// Checks the shape of an incoming request.
    ///
    /// # Errors
    ///
    /// Returns the mismatch found, if any.
    pub fn verify_request(&self, request: &HttpRequest) -> Result<(), Mismatch> {
        match &self.cors {
            Some(cors) => cors.verify_request(request),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{DEFAULT_TEXT, MIME_TYPE_TEXT};

    fn sub(handler: HandlerType) -> Resource {
        Resource::with_response(handler, "/t.sub.txt", MIME_TYPE_TEXT, DEFAULT_TEXT, 200)
    }

    #[test]
    fn defaults_expect_one_response() {
        let resource = Resource::new(HandlerType::Server, "/CorsTest.BasicServer");
        assert_eq!(resource.expected_response_ct, 1);
        assert_eq!(resource.response.status, 200);
        assert_eq!(resource.response.mime_type, "text/html");
        assert_eq!(resource.response_data, "<html><body>TEST</body></html>");
        assert_eq!(resource.path_url(), "http://127.0.0.1:8098/CorsTest.BasicServer");
        assert!(!resource.is_done());
        resource.validate();
    }

    #[test]
    fn cross_origin_with_header_sets_allow_origin() {
        let mut resource = sub(HandlerType::CustomStandardScheme);
        resource.init_cors(HandlerType::HttpScheme, true);

        let cors = resource.cors.as_ref().unwrap();
        assert!(cors.is_cross_origin);
        assert!(cors.supports_cors);
        assert_eq!(
            resource.response.header("Access-Control-Allow-Origin"),
            Some("http://corstest.com")
        );
        assert_eq!(resource.expected_response_ct, 1);
    }

    #[test]
    fn same_origin_never_gets_header() {
        let mut resource = sub(HandlerType::Server);
        resource.init_cors(HandlerType::Server, true);
        assert!(!resource.cors.as_ref().unwrap().is_cross_origin);
        assert!(resource.response.headers.is_empty());
    }

    #[test]
    fn non_standard_target_is_never_requested() {
        let mut resource = sub(HandlerType::CustomNonStandardScheme);
        resource.init_cors(HandlerType::CustomNonStandardScheme, true);

        let cors = resource.cors.as_ref().unwrap();
        assert!(!cors.supports_cors);
        assert!(cors.is_cross_origin);
        assert_eq!(cors.main_origin, "null");
        assert_eq!(resource.expected_response_ct, 0);
        assert_eq!(
            resource.response.header("Access-Control-Allow-Origin"),
            Some("null")
        );
    }

    #[test]
    fn verify_request_checks_origin_header() {
        let mut resource = sub(HandlerType::Server);
        resource.init_cors(HandlerType::HttpScheme, false);
        let url = resource.path_url();

        assert!(
            resource
                .verify_request(&HttpRequest::get(&url).with_header("Origin", "http://corstest.com"))
                .is_ok()
        );
        assert_eq!(
            resource.verify_request(&HttpRequest::get(&url)),
            Err(Mismatch::OriginHeader {
                url: url.clone(),
                expected: "http://corstest.com".into(),
                actual: String::new(),
            })
        );

        let mut same = sub(HandlerType::Server);
        same.init_cors(HandlerType::Server, false);
        assert!(same.verify_request(&HttpRequest::get(&url)).is_ok());
        assert!(
            same.verify_request(&HttpRequest::get(&url).with_header("Origin", "null"))
                .is_err()
        );
    }

    #[test]
    fn count_mismatches_reports_each_counter() {
        let mut resource = Resource::new(HandlerType::HttpScheme, "/a");
        resource.expected_success_query_ct = 1;
        resource.failure_query_ct = 2;

        let mismatches = resource.count_mismatches();
        assert_eq!(mismatches.len(), 3);
        assert!(matches!(mismatches[0], Mismatch::ResponseCount { expected: 1, actual: 0, .. }));

        resource.response_ct = 1;
        resource.success_query_ct = 1;
        resource.failure_query_ct = 0;
        assert!(resource.is_done());
        assert!(resource.count_mismatches().is_empty());
    }

    #[test]
    fn error_codes_round_trip_through_numbers() {
        for code in [0, -2, -3, -27, -302, -100] {
            assert_eq!(ErrorCode::from_code(code).code(), code);
        }
        assert_eq!(ErrorCode::from_error_text("net::ERR_ABORTED"), ErrorCode::Aborted);
        assert_eq!(ErrorCode::from_error_text("net::ERR_CONNECTION_REFUSED"), ErrorCode::Failed);
        assert_eq!(ErrorCode::Aborted.to_string(), "ERR_ABORTED (-3)");
    }

    #[test]
    #[should_panic(expected = "resource path must not be empty")]
    fn empty_path_is_a_violation() {
        Resource::new(HandlerType::Server, "").validate();
    }
}
