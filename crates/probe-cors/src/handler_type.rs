//! The four origins a CORS test can serve resources from.

use probe_server::DEFAULT_ORIGIN;
use std::fmt;

/// Origin marker used by documents on a non-standard scheme.
pub const NULL_ORIGIN: &str = "null";

/// Source that will handle a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerType {
    /// The embedded test server.
    Server,
    /// An `http` origin answered by the engine's resource handler.
    HttpScheme,
    /// A standard custom scheme with CORS and fetch enabled.
    CustomStandardScheme,
    /// A non-standard custom scheme without CORS or fetch support.
    CustomNonStandardScheme,
}

impl HandlerType {
    pub const ALL: [HandlerType; 4] = [
        HandlerType::Server,
        HandlerType::HttpScheme,
        HandlerType::CustomStandardScheme,
        HandlerType::CustomNonStandardScheme,
    ];

    /// The fixed origin prefix for resources of this type.
    #[must_use]
    pub fn origin(self) -> &'static str {
        match self {
            HandlerType::Server => DEFAULT_ORIGIN,
            HandlerType::HttpScheme => "http://corstest.com",
            HandlerType::CustomStandardScheme => "customstdfetch://corstest",
            HandlerType::CustomNonStandardScheme => "customnonstd:corstest",
        }
    }

    /// The origin a document of this type reports in `Origin` headers and
    /// console messages.
    #[must_use]
    pub fn document_origin(self) -> &'static str {
        if self.is_standard() {
            self.origin()
        } else {
            NULL_ORIGIN
        }
    }

    #[must_use]
    pub fn is_standard(self) -> bool {
        self != HandlerType::CustomNonStandardScheme
    }

    /// Builds the URL for `path` on this origin.
    #[must_use]
    pub fn path_url(self, path: &str) -> String {
        format!("{}{path}", self.origin())
    }

    /// Classifies a URL by its origin prefix.
    #[must_use]
    pub fn for_url(url: &str) -> Option<HandlerType> {
        Self::ALL.into_iter().find(|handler| {
            url.strip_prefix(handler.origin())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    /// Returns true if a request from `self` to `target` is cross-origin.
    ///
    /// Documents on the non-standard scheme have an opaque origin, which never
    /// matches anything, not even another opaque origin.
    #[must_use]
    pub fn is_cross_origin_to(self, target: HandlerType) -> bool {
        self != target || !self.is_standard()
    }

    /// Name used in generated test names, e.g. `CustomStandardScheme`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            HandlerType::Server => "Server",
            HandlerType::HttpScheme => "HttpScheme",
            HandlerType::CustomStandardScheme => "CustomStandardScheme",
            HandlerType::CustomNonStandardScheme => "CustomNonStandardScheme",
        }
    }
}

impl fmt::Display for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_fixed() {
        assert_eq!(HandlerType::Server.origin(), "http://127.0.0.1:8098");
        assert_eq!(HandlerType::HttpScheme.origin(), "http://corstest.com");
        assert_eq!(
            HandlerType::CustomStandardScheme.origin(),
            "customstdfetch://corstest"
        );
        assert_eq!(
            HandlerType::CustomNonStandardScheme.origin(),
            "customnonstd:corstest"
        );
    }

    #[test]
    fn non_standard_documents_have_null_origin() {
        assert_eq!(
            HandlerType::CustomNonStandardScheme.document_origin(),
            NULL_ORIGIN
        );
        assert_eq!(
            HandlerType::HttpScheme.document_origin(),
            "http://corstest.com"
        );
    }

    #[test]
    fn non_standard_pair_is_always_cross_origin() {
        for main in HandlerType::ALL {
            for target in HandlerType::ALL {
                let expected = main != target || main == HandlerType::CustomNonStandardScheme;
                assert_eq!(main.is_cross_origin_to(target), expected, "{main} -> {target}");
            }
        }
        assert!(
            HandlerType::CustomNonStandardScheme
                .is_cross_origin_to(HandlerType::CustomNonStandardScheme)
        );
    }

    #[test]
    fn for_url_matches_origin_prefix() {
        assert_eq!(
            HandlerType::for_url("http://127.0.0.1:8098/CorsTest.BasicServer"),
            Some(HandlerType::Server)
        );
        assert_eq!(
            HandlerType::for_url("customnonstd:corstest/a.html"),
            Some(HandlerType::CustomNonStandardScheme)
        );
        assert_eq!(HandlerType::for_url("http://corstest.community/"), None);
        assert_eq!(HandlerType::for_url("https://example.com/"), None);
    }
}
