//! Page payloads served to the browser under test.
//!
//! Pages report back with `window.testQuery`, sending one of two fixed
//! messages. Nothing else in the message is interpreted.

pub const MIME_TYPE_HTML: &str = "text/html";
pub const MIME_TYPE_TEXT: &str = "text/plain";

pub const DEFAULT_HTML: &str = "<html><body>TEST</body></html>";
pub const DEFAULT_TEXT: &str = "TEST";

pub const SUCCESS_MSG: &str = "CorsTestHandler.Success";
pub const FAILURE_MSG: &str = "CorsTestHandler.Failure";

/// How a main page requests its sub-resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecMode {
    Xhr,
    Fetch,
}

impl ExecMode {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ExecMode::Xhr => "Xhr",
            ExecMode::Fetch => "Fetch",
        }
    }
}

/// JS that delivers `msg` to the test driver.
#[must_use]
pub fn msg_js(msg: &str) -> String {
    format!("window.testQuery({{request:'{msg}'}});")
}

#[must_use]
pub fn success_msg_js() -> String {
    msg_js(SUCCESS_MSG)
}

#[must_use]
pub fn failure_msg_js() -> String {
    msg_js(FAILURE_MSG)
}

#[must_use]
pub fn default_success_msg_html() -> String {
    format!("<html><body>TEST<script>{}</script></body></html>", success_msg_js())
}

#[must_use]
pub fn iframe_main_html(iframe_url: &str, sandbox_attribs: &str) -> String {
    format!(
        "<html><body>TEST<iframe src=\"{iframe_url}\" sandbox=\"{sandbox_attribs}\"></iframe></body></html>"
    )
}

/// Tries to script the parent frame, then sends the success message.
#[must_use]
pub fn iframe_sub_html() -> String {
    format!(
        "<html><body>TEST<script>try {{ parent.document.body; }} catch (exception) {{ console.log(exception.toString()); }}{}</script></body></html>",
        success_msg_js()
    )
}

#[must_use]
pub fn xhr_exec_js(sub_url: &str) -> String {
    format!(
        concat!(
            "xhr = new XMLHttpRequest();\n",
            "xhr.open(\"GET\", \"{sub_url}\", true)\n;",
            "xhr.onload = function(e) {{\n",
            "  if (xhr.readyState === 4) {{\n",
            "    if (xhr.status === 200) {{\n",
            "      onResult(xhr.responseText);\n",
            "    }} else {{\n",
            "      console.log('XMLHttpRequest failed with status ' + xhr.status);\n",
            "      onResult('FAILURE');\n",
            "    }}\n",
            "  }}\n",
            "}};\n",
            "xhr.onerror = function(e) {{\n",
            "  onResult('FAILURE');\n",
            "}};\n",
            "xhr.send();\n",
        ),
        sub_url = sub_url
    )
}

#[must_use]
pub fn fetch_exec_js(sub_url: &str) -> String {
    format!(
        concat!(
            "fetch('{sub_url}')\n",
            ".then(function(response) {{\n",
            "  if (response.status === 200) {{\n",
            "      response.text().then(function(text) {{\n",
            "          onResult(text);\n",
            "      }}).catch(function(e) {{\n",
            "          onResult('FAILURE')\n;              }})\n;",
            "  }} else {{\n",
            "      onResult('FAILURE');\n",
            "  }}\n",
            "}}).catch(function(e) {{\n",
            "  onResult('FAILURE');\n",
            "}});\n",
        ),
        sub_url = sub_url
    )
}

/// Main page that requests `sub_url` on load and reports whether the body
/// came back as [`DEFAULT_TEXT`].
#[must_use]
pub fn exec_main_html(mode: ExecMode, sub_url: &str) -> String {
    let exec = match mode {
        ExecMode::Xhr => xhr_exec_js(sub_url),
        ExecMode::Fetch => fetch_exec_js(sub_url),
    };

    format!(
        concat!(
            "<html><head>\n",
            "<script language=\"JavaScript\">\n",
            "function onResult(val) {{\n",
            "  if (val === '{text}') {{{success}}} else {{{failure}}}\n}}\n",
            "function execRequest() {{\n",
            "{exec}",
            "}}\n</script>\n",
            "</head><body onload=\"execRequest();\">",
            "Running execRequest...",
            "</body></html>",
        ),
        text = DEFAULT_TEXT,
        success = success_msg_js(),
        failure = failure_msg_js(),
        exec = exec,
    )
}
