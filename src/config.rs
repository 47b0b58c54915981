//! Server configuration.
//!
//! Configuration comes from an optional YAML file named by `HTTPD_CONFIG`,
//! then `HTTP_HOST` / `HTTP_PORT` override the bind address.

use anyhow::Context;
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::reactor::demuxer::WriteInterest;

/// Environment variable naming a YAML configuration file.
pub const CONFIG_PATH_VAR: &str = "HTTPD_CONFIG";
/// Environment variable overriding the bind host.
pub const HOST_VAR: &str = "HTTP_HOST";
/// Environment variable overriding the bind port.
pub const PORT_VAR: &str = "HTTP_PORT";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host or address to bind the listener to
    pub host: String,
    /// TCP port to listen on
    pub port: u16,
    /// Capacity of the readiness event buffer per poll
    pub max_events: usize,
    /// Upper bound on a single poll; bounds shutdown latency
    pub poll_timeout_ms: u64,
    /// When connections are watched for write readiness
    pub write_interest: WriteInterest,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            max_events: 1024,
            poll_timeout_ms: 500,
            write_interest: WriteInterest::OnDemand,
        }
    }
}

impl Config {
    /// Loads configuration from `HTTPD_CONFIG` (if set) and the process environment.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {path}"))?;
                Self::from_yaml(&raw).with_context(|| format!("parsing config file {path}"))?
            }
            Err(_) => Self::default(),
        };

        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        // An empty document deserializes to unit, not a map.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg = serde_yaml::from_str(raw)?;
        Ok(cfg)
    }

    /// Applies `HTTP_HOST` / `HTTP_PORT` overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(HOST_VAR) {
            self.server.host = host;
        }

        if let Some(port) = lookup(PORT_VAR) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid {PORT_VAR} value {port:?}"))?;
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Resolves the configured host to the first matching socket address.
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        (self.server.host.as_str(), self.server.port)
            .to_socket_addrs()
            .with_context(|| format!("resolving {}", self.listen_addr()))?
            .next()
            .with_context(|| format!("no address found for {}", self.listen_addr()))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.server.poll_timeout_ms)
    }
}
