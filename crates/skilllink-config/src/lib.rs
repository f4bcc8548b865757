//! KDL configuration parsing for Skilllink.
//!
//! Handles the server's `skilllink.kdl`: listen address, storage backend,
//! database, sessions and logging.

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    DatabaseConfig, LogFormat, LoggingConfig, ServerConfig, SessionConfig, StorageBackend,
    SystemConfig, parse_system_config,
};
