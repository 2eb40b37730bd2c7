//! Chrome process lifecycle.
//!
//! `TestBrowser` launches Chrome, drives its CDP handler and opens pages.
//! Dropping it kills the process; `close()` shuts it down gracefully.

use crate::error::{BrowserError, Result};
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "probe-browser.toml";

/// Configuration for launching a test browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestBrowserConfig {
    /// Run in headless mode (default: true).
    pub headless: bool,

    /// Browser window size (default: 1280x800).
    pub window_size: (u32, u32),

    /// Additional Chrome arguments.
    pub args: Vec<String>,

    /// Chrome executable path (None = auto-detect).
    pub chrome_path: Option<String>,
}

impl TestBrowserConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from defaults, an optional TOML file and
    /// `PROBE_BROWSER_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `BrowserError::Config` if a source has invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let file = path.map(Path::to_path_buf).or_else(|| {
            let default_path = Path::new(CONFIG_FILE);
            default_path.exists().then(|| default_path.to_path_buf())
        });
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }

        Ok(figment.merge(Env::prefixed("PROBE_BROWSER_")).extract()?)
    }

    /// Shows the browser window.
    #[must_use]
    pub fn visible(mut self) -> Self {
        self.headless = false;
        self
    }

    #[must_use]
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args.extend(args);
        self
    }

    #[allow(clippy::result_large_err)]
    fn to_browser_config(&self) -> Result<BrowserConfig> {
        let mut config = BrowserConfig::builder();

        if self.headless && !cfg!(feature = "visible") {
            config = config.arg("--headless");
        } else {
            config = config.with_head();
        }

        config = config.arg(format!(
            "--window-size={},{}",
            self.window_size.0, self.window_size.1
        ));

        // One profile per instance so parallel browsers do not fight over
        // the process singleton lock.
        let user_data_dir =
            std::env::temp_dir().join(format!("probe-browser-{}", uuid::Uuid::new_v4()));
        config = config.arg(format!("--user-data-dir={}", user_data_dir.display()));

        for arg in &self.args {
            config = config.arg(arg.clone());
        }

        if let Some(path) = &self.chrome_path {
            config = config.chrome_executable(path.clone());
        }

        config.build().map_err(|e| BrowserError::LaunchFailed {
            reason: format!("invalid browser configuration: {e}"),
            source: None,
        })
    }
}

impl Default for TestBrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1280, 800),
            args: vec![
                // Containers rarely have user namespaces.
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            chrome_path: None,
        }
    }
}

/// A managed Chrome instance.
pub struct TestBrowser {
    inner: Arc<Mutex<Option<Browser>>>,
}

impl TestBrowser {
    /// Launches Chrome and starts driving its CDP connection.
    ///
    /// # Errors
    ///
    /// Returns `LaunchFailed` if Chrome is not installed, not executable,
    /// or fails to start.
    pub async fn launch(config: TestBrowserConfig) -> Result<Self> {
        debug!(?config, "launching browser");

        let browser_config = config.to_browser_config()?;
        let (browser, mut handler) =
            Browser::launch(browser_config)
                .await
                .map_err(|e| BrowserError::LaunchFailed {
                    reason: "failed to launch Chrome process".to_string(),
                    source: Some(Box::new(e)),
                })?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("browser handler error: {e}");
                }
            }
        });

        debug!("browser launched");
        Ok(Self {
            inner: Arc::new(Mutex::new(Some(browser))),
        })
    }

    /// Opens a blank tab.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` if the browser has been closed.
    pub async fn new_page(&self) -> Result<Page> {
        let browser = self.inner.lock().await;
        let browser = browser.as_ref().ok_or(BrowserError::AlreadyClosed)?;

        browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::ConnectionFailed(e.to_string()))
    }

    /// Closes the browser and waits for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the browser fails to close gracefully.
    pub async fn close(&self) -> Result<()> {
        let browser = self.inner.lock().await.take();

        if let Some(mut browser) = browser {
            debug!("closing browser");
            browser
                .close()
                .await
                .map_err(|e| BrowserError::ConnectionFailed(e.to_string()))?;
            if let Err(e) = browser.wait().await {
                warn!("browser process did not exit cleanly: {e}");
            }
        }

        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

impl Drop for TestBrowser {
    fn drop(&mut self) {
        // chromiumoxide kills the process when the Browser is dropped.
        let open = self.inner.try_lock().map_or(true, |browser| browser.is_some());
        if open {
            warn!("TestBrowser dropped without close(), killing Chrome");
        }
    }
}
