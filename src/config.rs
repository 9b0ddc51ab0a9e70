//! Server configuration: identity, listener, backend, and function-dispatcher limits.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub listen: ListenConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_network_name")]
    pub network: String,
    #[serde(default)]
    pub debug: bool,
    /// Admin/metrics HTTP port. 0 disables the endpoint.
    #[serde(default)]
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            network: default_network_name(),
            debug: false,
            metrics_port: 0,
        }
    }
}

fn default_server_name() -> String {
    "tenantircd".to_string()
}

fn default_network_name() -> String {
    "IRC Network".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    pub address: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_find_limit")]
    pub find_default_limit: u32,
    #[serde(default = "default_find_max_limit")]
    pub find_max_limit: u32,
    #[serde(default = "default_list_limit")]
    pub list_default_limit: u32,
    #[serde(default = "default_list_max_limit")]
    pub list_max_limit: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            find_default_limit: default_find_limit(),
            find_max_limit: default_find_max_limit(),
            list_default_limit: default_list_limit(),
            list_max_limit: default_list_max_limit(),
        }
    }
}

fn default_find_limit() -> u32 {
    10
}
fn default_find_max_limit() -> u32 {
    50
}
fn default_list_limit() -> u32 {
    20
}
fn default_list_max_limit() -> u32 {
    100
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.trim().is_empty() {
            return Err(ConfigError::Invalid("server.name must not be empty".into()));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "backend.base_url must not be empty".into(),
            ));
        }
        if self.limits.find_default_limit > self.limits.find_max_limit {
            return Err(ConfigError::Invalid(
                "limits.find_default_limit exceeds limits.find_max_limit".into(),
            ));
        }
        if self.limits.list_default_limit > self.limits.list_max_limit {
            return Err(ConfigError::Invalid(
                "limits.list_default_limit exceeds limits.list_max_limit".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_find_limits() {
        let cfg = Config {
            server: ServerConfig::default(),
            listen: ListenConfig {
                address: "127.0.0.1:6667".parse().unwrap(),
            },
            backend: BackendConfig {
                base_url: "http://localhost:3000".into(),
                request_timeout_secs: 10,
            },
            limits: LimitsConfig {
                find_default_limit: 100,
                find_max_limit: 50,
                ..LimitsConfig::default()
            },
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_minimal_config() {
        let cfg = Config {
            server: ServerConfig::default(),
            listen: ListenConfig {
                address: "0.0.0.0:6667".parse().unwrap(),
            },
            backend: BackendConfig {
                base_url: "http://backend.internal".into(),
                request_timeout_secs: 5,
            },
            limits: LimitsConfig::default(),
        };
        assert!(cfg.validate().is_ok());
    }
}
