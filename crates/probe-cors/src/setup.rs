//! The declarative description of one CORS test.

use crate::handler_type::HandlerType;
use crate::outcome::Mismatch;
use crate::resource::Resource;
use probe_server::path_url;

/// Expected resources, in request order, and expected console messages.
///
/// The first resource is the main page the browser navigates to.
#[derive(Debug, Clone, Default)]
pub struct TestSetup {
    resources: Vec<Resource>,
    console_messages: Vec<String>,
}

impl TestSetup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource and returns its index.
    ///
    /// # Panics
    ///
    /// Panics if the resource is not in a valid initial state.
    #[track_caller]
    pub fn add_resource(&mut self, resource: Resource) -> usize {
        resource.validate();
        self.resources.push(resource);
        self.resources.len() - 1
    }

    /// Expects a console message starting with `message`.
    #[track_caller]
    pub fn add_console_message(&mut self, message: impl Into<String>) {
        let message = message.into();
        assert!(!message.is_empty(), "expected console message must not be empty");
        self.console_messages.push(message);
    }

    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// The resource at `index`, as returned by [`add_resource`](Self::add_resource).
    ///
    /// # Panics
    ///
    /// Panics if no resource was added at `index`.
    #[must_use]
    #[track_caller]
    pub fn resource(&self, index: usize) -> &Resource {
        self.resources.get(index).unwrap_or_else(|| {
            panic!(
                "no resource at index {index}, setup has {}",
                self.resources.len()
            )
        })
    }

    /// Console messages not yet received.
    #[must_use]
    pub fn console_messages(&self) -> &[String] {
        &self.console_messages
    }

    /// Finds the resource for `url`, ignoring its query and fragment.
    #[must_use]
    pub fn resource_for_url(&self, url: &str) -> Option<&Resource> {
        let path_url = path_url(url);
        self.resources
            .iter()
            .find(|resource| resource.path_url() == path_url)
    }

    pub fn resource_for_url_mut(&mut self, url: &str) -> Option<&mut Resource> {
        let path_url = path_url(url);
        self.resources
            .iter_mut()
            .find(|resource| resource.path_url() == path_url)
    }

    /// Panics if there is nothing to test.
    #[track_caller]
    pub fn validate(&self) {
        assert!(!self.resources.is_empty(), "test setup has no resources");
    }

    /// URL of the first resource.
    ///
    /// # Panics
    ///
    /// Panics if the setup is empty.
    #[must_use]
    pub fn main_url(&self) -> String {
        self.validate();
        self.resources[0].path_url()
    }

    /// Returns true if any resource is served by the embedded server.
    #[must_use]
    pub fn needs_server(&self) -> bool {
        self.resources
            .iter()
            .any(|resource| resource.handler == HandlerType::Server)
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.resources.iter().all(Resource::is_done)
    }

    /// Every counter mismatch across all resources.
    #[must_use]
    pub fn count_mismatches(&self) -> Vec<Mismatch> {
        self.resources
            .iter()
            .flat_map(Resource::count_mismatches)
            .collect()
    }

    /// Consumes the first expected message that `actual` starts with.
    ///
    /// Returns false if no expected message matched.
    pub fn take_console_message(&mut self, actual: &str) -> bool {
        match self
            .console_messages
            .iter()
            .position(|possible| actual.starts_with(possible.as_str()))
        {
            Some(index) => {
                self.console_messages.remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_resources() -> TestSetup {
        let mut setup = TestSetup::new();
        setup.add_resource(Resource::new(HandlerType::HttpScheme, "/main"));
        setup.add_resource(Resource::new(HandlerType::Server, "/sub"));
        setup
    }

    #[test]
    #[should_panic(expected = "no resource at index 2, setup has 2")]
    fn resource_index_out_of_range_panics() {
        let _ = two_resources().resource(2);
    }

    #[test]
    fn lookup_ignores_query_and_fragment() {
        let setup = two_resources();
        let found = setup
            .resource_for_url("http://127.0.0.1:8098/sub?x=1#top")
            .unwrap();
        assert_eq!(found.path, "/sub");
        assert!(setup.resource_for_url("http://127.0.0.1:8098/other").is_none());
    }

    #[test]
    fn main_url_is_first_resource() {
        let setup = two_resources();
        assert_eq!(setup.main_url(), "http://corstest.com/main");
        assert!(setup.needs_server());
    }

    #[test]
    fn needs_server_only_with_server_resource() {
        let mut setup = TestSetup::new();
        setup.add_resource(Resource::new(HandlerType::CustomStandardScheme, "/a"));
        assert!(!setup.needs_server());
    }

    #[test]
    fn console_messages_match_by_prefix_once() {
        let mut setup = two_resources();
        setup.add_console_message("Blocked script execution in");
        setup.add_console_message("SecurityError:");

        assert!(setup.take_console_message("SecurityError: Blocked a frame"));
        assert!(!setup.take_console_message("SecurityError: again"));
        assert!(!setup.take_console_message("Blocked"));
        assert!(setup.take_console_message("Blocked script execution in 'x'"));
        assert!(setup.console_messages().is_empty());
    }

    #[test]
    fn done_when_every_resource_is_done() {
        let mut setup = two_resources();
        assert!(!setup.is_done());
        assert_eq!(setup.count_mismatches().len(), 2);

        for url in ["http://corstest.com/main", "http://127.0.0.1:8098/sub"] {
            setup.resource_for_url_mut(url).unwrap().response_ct += 1;
        }
        assert!(setup.is_done());
    }

    #[test]
    #[should_panic(expected = "test setup has no resources")]
    fn empty_setup_is_a_violation() {
        TestSetup::new().validate();
    }
}
