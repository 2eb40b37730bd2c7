//! CORS driver configuration.
//!
//! Defaults < optional `probe-cors.toml` < `PROBE_CORS_*` environment
//! variables.

use crate::error::Result;
use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default wall-clock limit for one test run.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

pub const CONFIG_FILE: &str = "probe-cors.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsTestConfig {
    /// Fail the run if it has not completed after this many milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl CorsTestConfig {
    /// Loads configuration from defaults, an optional TOML file and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `CorsError::Config` if a source has invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let file = path.map(Path::to_path_buf).or_else(|| {
            let default_path = Path::new(CONFIG_FILE);
            default_path.exists().then(|| default_path.to_path_buf())
        });
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }

        Ok(figment.merge(Env::prefixed("PROBE_CORS_")).extract()?)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

impl Default for CorsTestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}
