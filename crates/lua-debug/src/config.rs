//! Server configuration (`lua-debug.toml`) and log setup.

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::{DebugError, Result};
use crate::protocol_io::DEFAULT_ENDPOINT;

const DEFAULT_LISTEN: &str = "0.0.0.0:8845";
const DEFAULT_LOG_FILTER: &str = "info";

/// How source paths are compared when deduplicating breakpoint sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathCase {
    /// Follow the host filesystem convention.
    #[default]
    Auto,
    Sensitive,
    Insensitive,
}

impl PathCase {
    /// Whether paths compare ignoring ASCII case.
    #[must_use]
    pub fn ignores_case(self) -> bool {
        match self {
            Self::Auto => cfg!(any(windows, target_os = "macos")),
            Self::Sensitive => false,
            Self::Insensitive => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugServerConfig {
    pub listen: SocketAddr,
    pub endpoint: String,
    pub path_case: PathCase,
    pub log_filter: String,
}

impl Default for DebugServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8845)),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            path_case: PathCase::Auto,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DebugToml {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerSection {
    listen: Option<String>,
    endpoint: Option<String>,
    path_case: Option<PathCase>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogSection {
    filter: Option<String>,
}

impl DebugToml {
    fn into_config(self) -> Result<DebugServerConfig> {
        let listen = self.server.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
        let listen = listen
            .parse::<SocketAddr>()
            .map_err(|err| DebugError::Config(format!("server.listen '{listen}': {err}")))?;
        let endpoint = self
            .server
            .endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        if !endpoint.starts_with('/') || endpoint.contains(char::is_whitespace) {
            return Err(DebugError::Config(format!(
                "server.endpoint '{endpoint}' must be an absolute path without spaces"
            )));
        }
        Ok(DebugServerConfig {
            listen,
            endpoint,
            path_case: self.server.path_case.unwrap_or_default(),
            log_filter: self
                .log
                .filter
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}

impl DebugServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: DebugToml = toml::from_str(text)
            .map_err(|err| DebugError::Config(format!("lua-debug.toml: {err}")))?;
        raw.into_config()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|err| DebugError::Config(format!("lua-debug.toml: {err}")))?;
        Self::from_toml_str(&text)
    }
}

/// Installs a stderr `tracing` subscriber. `RUST_LOG` overrides the configured filter.
pub fn init_tracing(config: &DebugServerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|err| DebugError::Config(format!("log.filter '{}': {err}", config.log_filter)))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| DebugError::Config(format!("tracing subscriber: {err}")))
}
