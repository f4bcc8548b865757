//! System configuration parsing.
//!
//! ```kdl
//! server listen="0.0.0.0:3000"
//! storage backend="postgres"
//! database url="postgres://skilllink@127.0.0.1/skilllink" max-connections=10
//! sessions ttl-minutes=720 provider-key="shared-with-the-auth-provider"
//! logging filter="info" format="json"
//! ```
//!
//! Every node is optional, but the server refuses to start without a
//! provider key (`sessions provider-key` or `SKILLLINK_PROVIDER_KEY`).

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

/// System-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub server: ServerConfig,
    /// Explicit storage choice; see [`SystemConfig::storage_backend`].
    pub storage: Option<StorageBackend>,
    pub database: DatabaseConfig,
    pub sessions: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub ttl_minutes: u32,
    /// Key the auth provider signs sign-in assertions with.
    pub provider_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            },
            storage: None,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
            },
            sessions: SessionConfig {
                ttl_minutes: 720,
                provider_key: None,
            },
            logging: LoggingConfig {
                filter: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}

impl SystemConfig {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        parse_system_config(&text)
    }

    /// Apply environment overrides: `DATABASE_URL` and `SKILLLINK_PROVIDER_KEY`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
            self.database.url = Some(url);
        }
        if let Some(key) = lookup("SKILLLINK_PROVIDER_KEY").filter(|k| !k.is_empty()) {
            self.sessions.provider_key = Some(key);
        }
        self
    }

    pub fn provider_key(&self) -> ConfigResult<&str> {
        self.sessions
            .provider_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("sessions provider-key".to_string()))
    }

    /// The storage to run with: the explicit choice, else PostgreSQL when a
    /// database url is configured, else memory.
    pub fn storage_backend(&self) -> ConfigResult<StorageBackend> {
        match (self.storage, &self.database.url) {
            (Some(StorageBackend::Postgres), None) => {
                Err(ConfigError::MissingField("database url".to_string()))
            }
            (Some(backend), _) => Ok(backend),
            (None, Some(_)) => Ok(StorageBackend::Postgres),
            (None, None) => Ok(StorageBackend::Memory),
        }
    }
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();
    let mut seen = HashSet::new();

    for node in doc.nodes() {
        let name = node.name().value();
        if !seen.insert(name.to_string()) {
            return Err(ConfigError::Duplicate(name.to_string()));
        }

        match name {
            "server" => {
                if let Some(listen) = get_string_prop(node, "listen") {
                    config.server.listen =
                        listen.parse().map_err(|_| ConfigError::InvalidValue {
                            field: "server listen".to_string(),
                            message: format!("not a socket address: {}", listen),
                        })?;
                }
            }
            "storage" => {
                let backend = get_string_prop(node, "backend")
                    .ok_or_else(|| ConfigError::MissingField("storage backend".to_string()))?;
                config.storage = Some(parse_backend(&backend)?);
            }
            "database" => {
                config.database.url = get_string_prop(node, "url");
                if let Some(max) = get_positive_prop(node, "max-connections")? {
                    config.database.max_connections = max;
                }
            }
            "sessions" => {
                if let Some(ttl) = get_positive_prop(node, "ttl-minutes")? {
                    config.sessions.ttl_minutes = ttl;
                }
                if let Some(key) = get_string_prop(node, "provider-key") {
                    if key.is_empty() {
                        return Err(ConfigError::InvalidValue {
                            field: "sessions provider-key".to_string(),
                            message: "must not be empty".to_string(),
                        });
                    }
                    config.sessions.provider_key = Some(key);
                }
            }
            "logging" => {
                if let Some(filter) = get_string_prop(node, "filter") {
                    config.logging.filter = filter;
                }
                if let Some(format) = get_string_prop(node, "format") {
                    config.logging.format = parse_log_format(&format)?;
                }
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_backend(value: &str) -> ConfigResult<StorageBackend> {
    match value {
        "postgres" => Ok(StorageBackend::Postgres),
        "memory" => Ok(StorageBackend::Memory),
        other => Err(ConfigError::InvalidValue {
            field: "storage backend".to_string(),
            message: format!("unknown backend: {}", other),
        }),
    }
}

fn parse_log_format(value: &str) -> ConfigResult<LogFormat> {
    match value {
        "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(ConfigError::InvalidValue {
            field: "logging format".to_string(),
            message: format!("unknown format: {}", other),
        }),
    }
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_positive_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<u32>> {
    let Some(value) = node.get(name) else {
        return Ok(None);
    };
    value
        .as_integer()
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: name.to_string(),
            message: format!("expected a positive integer, got {}", value),
        })
}
