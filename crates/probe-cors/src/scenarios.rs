//! Scenario catalog: basic, iframe sandbox and XHR/fetch families over every
//! ordered pair of handler types.

use crate::handler_type::{HandlerType, NULL_ORIGIN};
use crate::payload::{
    DEFAULT_TEXT, ExecMode, MIME_TYPE_HTML, MIME_TYPE_TEXT, default_success_msg_html,
    exec_main_html, iframe_main_html, iframe_sub_html,
};
use crate::resource::{Resource, SubResource};
use crate::setup::TestSetup;
use std::fmt;

/// Sandbox attribute sets used by the iframe family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sandbox {
    /// Everything is blocked.
    None,
    AllowScripts,
    AllowScriptsAndSameOrigin,
}

impl Sandbox {
    pub const ALL: [Sandbox; 3] = [
        Sandbox::None,
        Sandbox::AllowScripts,
        Sandbox::AllowScriptsAndSameOrigin,
    ];

    #[must_use]
    pub fn attribs(self) -> &'static str {
        match self {
            Sandbox::None => "",
            Sandbox::AllowScripts => "allow-scripts",
            Sandbox::AllowScriptsAndSameOrigin => "allow-scripts allow-same-origin",
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Sandbox::None => "None",
            Sandbox::AllowScripts => "AllowScripts",
            Sandbox::AllowScriptsAndSameOrigin => "AllowScriptsAndSameOrigin",
        }
    }
}

fn has_sandbox_attrib(sandbox_attribs: &str, attrib: &str) -> bool {
    sandbox_attribs.contains(attrib)
}

/// Main page embedding an iframe with `sandbox_attribs`.
///
/// Resources are added main first, then the iframe.
#[must_use]
pub fn setup_iframe_request(
    test_name: &str,
    main_handler: HandlerType,
    iframe_handler: HandlerType,
    sandbox_attribs: &str,
) -> TestSetup {
    let base_path = format!("/{test_name}");
    let mut setup = TestSetup::new();

    let mut iframe = Resource::with_response(
        iframe_handler,
        format!("{base_path}.iframe.html"),
        MIME_TYPE_HTML,
        iframe_sub_html(),
        200,
    );
    let iframe_url = iframe.path_url();
    let main = Resource::with_response(
        main_handler,
        base_path,
        MIME_TYPE_HTML,
        iframe_main_html(&iframe_url, sandbox_attribs),
        200,
    );

    if has_sandbox_attrib(sandbox_attribs, "allow-scripts") {
        iframe.expected_success_query_ct = 1;

        // Scripting the parent fails without allow-same-origin, from a
        // non-standard main frame, or across origins. The reported origin is
        // null without allow-same-origin or for a non-standard iframe.
        let has_same_origin = has_sandbox_attrib(sandbox_attribs, "allow-same-origin");
        if !has_same_origin || !main_handler.is_standard() || main_handler != iframe_handler {
            let origin = if !has_same_origin || !iframe_handler.is_standard() {
                NULL_ORIGIN
            } else {
                iframe_handler.origin()
            };
            setup.add_console_message(format!(
                "SecurityError: Blocked a frame with origin \"{origin}\" from accessing a cross-origin frame."
            ));
        }
    } else {
        setup.add_console_message(format!(
            "Blocked script execution in '{iframe_url}' because the document's frame is sandboxed and the 'allow-scripts' permission is not set."
        ));
    }

    setup.add_resource(main);
    setup.add_resource(iframe);
    setup
}

/// Main page that requests a text sub-resource by XHR or fetch.
///
/// Resources are added main first, then the sub-resource.
#[must_use]
pub fn setup_exec_request(
    mode: ExecMode,
    test_name: &str,
    main_handler: HandlerType,
    sub_handler: HandlerType,
    add_header: bool,
) -> TestSetup {
    let base_path = format!("/{test_name}");
    let mut setup = TestSetup::new();

    let mut sub = Resource::with_response(
        sub_handler,
        format!("{base_path}.sub.txt"),
        MIME_TYPE_TEXT,
        DEFAULT_TEXT,
        200,
    );
    sub.init_cors(main_handler, add_header);
    let sub_url = sub.path_url();

    let mut main = Resource::with_response(
        main_handler,
        base_path,
        MIME_TYPE_HTML,
        exec_main_html(mode, &sub_url),
        200,
    );

    let SubResource {
        main_origin,
        supports_cors,
        is_cross_origin,
    } = SubResource::new(main_handler, sub_handler);

    if is_cross_origin && (!supports_cors || !add_header) {
        main.expected_failure_query_ct = 1;

        let message = match (supports_cors, mode) {
            (true, ExecMode::Xhr) => format!(
                "Access to XMLHttpRequest at '{sub_url}' from origin '{main_origin}' has been blocked by CORS policy: No 'Access-Control-Allow-Origin' header is present on the requested resource."
            ),
            (true, ExecMode::Fetch) => format!(
                "Access to fetch at '{sub_url}' from origin '{main_origin}' has been blocked by CORS policy: No 'Access-Control-Allow-Origin' header is present on the requested resource. If an opaque response serves your needs, set the request's mode to 'no-cors' to fetch the resource with CORS disabled."
            ),
            (false, ExecMode::Xhr) => format!(
                "Access to XMLHttpRequest at '{sub_url}' from origin '{main_origin}' has been blocked by CORS policy: Cross origin requests are only supported for protocol schemes:"
            ),
            (false, ExecMode::Fetch) => format!(
                "Fetch API cannot load {sub_url}. URL scheme must be \"http\" or \"https\" for CORS request."
            ),
        };
        setup.add_console_message(message);
    } else {
        main.expected_success_query_ct = 1;
    }

    setup.add_resource(main);
    setup.add_resource(sub);
    setup
}

/// One named test case from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// A single page, optionally sending the success message.
    Basic {
        handler: HandlerType,
        with_query: bool,
    },
    Iframe {
        sandbox: Sandbox,
        main: HandlerType,
        iframe: HandlerType,
    },
    Exec {
        mode: ExecMode,
        add_header: bool,
        main: HandlerType,
        sub: HandlerType,
    },
}

impl Scenario {
    /// Every scenario, in catalog order.
    #[must_use]
    pub fn all() -> Vec<Scenario> {
        let mut all = Vec::new();

        for handler in [
            HandlerType::Server,
            HandlerType::HttpScheme,
            HandlerType::CustomStandardScheme,
        ] {
            for with_query in [false, true] {
                all.push(Scenario::Basic {
                    handler,
                    with_query,
                });
            }
        }

        for sandbox in Sandbox::ALL {
            for (main, iframe) in handler_pairs() {
                all.push(Scenario::Iframe {
                    sandbox,
                    main,
                    iframe,
                });
            }
        }

        for mode in [ExecMode::Xhr, ExecMode::Fetch] {
            for add_header in [false, true] {
                for (main, sub) in handler_pairs() {
                    all.push(Scenario::Exec {
                        mode,
                        add_header,
                        main,
                        sub,
                    });
                }
            }
        }

        all
    }

    /// Looks up a scenario by its full name.
    #[must_use]
    pub fn by_name(name: &str) -> Option<Scenario> {
        Self::all()
            .into_iter()
            .find(|scenario| scenario.name() == name)
    }

    /// Full test name, e.g. `CorsTest.XhrNoHeaderServerToHttpScheme`.
    #[must_use]
    pub fn name(&self) -> String {
        match *self {
            Scenario::Basic {
                handler,
                with_query,
            } => {
                let suffix = if with_query { "WithQuery" } else { "" };
                format!("CorsTest.Basic{handler}{suffix}")
            }
            Scenario::Iframe {
                sandbox,
                main,
                iframe,
            } => format!("CorsTest.Iframe{}{main}To{iframe}", sandbox.name()),
            Scenario::Exec {
                mode,
                add_header,
                main,
                sub,
            } => {
                let header = if add_header { "WithHeader" } else { "NoHeader" };
                format!("CorsTest.{}{header}{main}To{sub}", mode.name())
            }
        }
    }

    /// Builds a fresh setup for this scenario.
    #[must_use]
    pub fn build(&self) -> TestSetup {
        let name = self.name();
        match *self {
            Scenario::Basic {
                handler,
                with_query,
            } => {
                let path = format!("/{name}");
                let resource = if with_query {
                    let mut resource = Resource::with_response(
                        handler,
                        path,
                        MIME_TYPE_HTML,
                        default_success_msg_html(),
                        200,
                    );
                    resource.expected_success_query_ct = 1;
                    resource
                } else {
                    Resource::new(handler, path)
                };

                let mut setup = TestSetup::new();
                setup.add_resource(resource);
                setup
            }
            Scenario::Iframe {
                sandbox,
                main,
                iframe,
            } => setup_iframe_request(&name, main, iframe, sandbox.attribs()),
            Scenario::Exec {
                mode,
                add_header,
                main,
                sub,
            } => setup_exec_request(mode, &name, main, sub, add_header),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

fn handler_pairs() -> impl Iterator<Item = (HandlerType, HandlerType)> {
    HandlerType::ALL
        .into_iter()
        .flat_map(|main| HandlerType::ALL.into_iter().map(move |other| (main, other)))
}
