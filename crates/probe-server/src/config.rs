//! Test server configuration.
//!
//! Configuration is layered with figment. Priority, lowest first:
//! built-in defaults, an optional TOML file, then `PROBE_SERVER_*`
//! environment variables.

use crate::error::Result;
use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

/// Loopback address the server listens on by default.
pub const DEFAULT_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Default port. Must differ from any other server used in the same run.
pub const DEFAULT_PORT: u16 = 8098;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 10;

/// Scheme served by the embedded server.
pub const SERVER_SCHEME: &str = "http";

/// Origin of the server when running with the default address and port.
pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8098";

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "probe-server.toml";

/// Settings for the embedded HTTP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_backlog")]
    pub backlog: u32,

    /// Largest request body the server will buffer before dispatch.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Loads configuration from defaults, an optional TOML file and the
    /// environment.
    ///
    /// When `path` is `None`, `probe-server.toml` in the working directory is
    /// used if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if a source has invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let file = path.map(Path::to_path_buf).or_else(|| {
            let default_path = Path::new(CONFIG_FILE);
            default_path.exists().then(|| default_path.to_path_buf())
        });

        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }

        figment = figment.merge(Env::prefixed("PROBE_SERVER_"));

        Ok(figment.extract()?)
    }

    /// Socket address to bind.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Origin string reported once the server is up.
    #[must_use]
    pub fn origin(&self) -> String {
        origin_for(self.socket_addr())
    }

    /// Returns a copy listening on an OS-assigned port.
    #[must_use]
    pub fn with_ephemeral_port(mut self) -> Self {
        self.port = 0;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            backlog: default_backlog(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Formats the origin for a bound socket address.
#[must_use]
pub fn origin_for(addr: SocketAddr) -> String {
    format!("{SERVER_SCHEME}://{addr}")
}

fn default_address() -> IpAddr {
    DEFAULT_ADDRESS
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_origin_matches_constant() {
        assert_eq!(ServerConfig::default().origin(), DEFAULT_ORIGIN);
    }

    #[test]
    fn ephemeral_port_keeps_address() {
        let config = ServerConfig::default().with_ephemeral_port();
        assert_eq!(config.port, 0);
        assert_eq!(config.address, DEFAULT_ADDRESS);
    }

    #[test]
    fn load_merges_file_then_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                port = 9100
                backlog = 32
                "#,
            )?;
            jail.set_env("PROBE_SERVER_PORT", "9200");

            let config = ServerConfig::load(Some(Path::new("custom.toml")))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.port, 9200);
            assert_eq!(config.backlog, 32);
            assert_eq!(config.address, DEFAULT_ADDRESS);
            Ok(())
        });
    }

    #[test]
    fn load_picks_up_default_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "max_body_bytes = 512")?;

            let config = ServerConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.max_body_bytes, 512);
            assert_eq!(config.port, DEFAULT_PORT);
            Ok(())
        });
    }

    #[test]
    fn load_rejects_bad_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PROBE_SERVER_PORT", "not-a-port");
            assert!(ServerConfig::load(None).is_err());
            Ok(())
        });
    }
}
