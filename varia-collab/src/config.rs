//! Server configuration.
//!
//! | Variable                   | Field                       | Default          |
//! |----------------------------|-----------------------------|------------------|
//! | `VARIA_BIND`               | `bind_addr`                 | `127.0.0.1:4000` |
//! | `VARIA_STORAGE`            | `storage_path`              | in-memory        |
//! | `VARIA_OUTBOX_CAPACITY`    | `outbox_capacity`           | 256              |
//! | `VARIA_CACHE_CAPACITY`     | `workspace_cache_capacity`  | 1024             |
//! | `VARIA_RETRY_DELAY_MS`     | `membership_retry_delay_ms` | 1000             |

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Frames buffered per session before they are dropped
    pub outbox_capacity: usize,
    /// Workspaces kept in the project cache
    pub workspace_cache_capacity: NonZeroUsize,
    /// Delay before the single `projectCreated` membership retry
    pub membership_retry_delay_ms: u64,
    /// RocksDB directory (None = in-memory only)
    pub storage_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4000".to_string(),
            outbox_capacity: 256,
            workspace_cache_capacity: NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN),
            membership_retry_delay_ms: 1000,
            storage_path: None,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `VARIA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(bind) = lookup("VARIA_BIND") {
            config.bind_addr = bind;
        }
        if let Some(path) = lookup("VARIA_STORAGE").filter(|p| !p.is_empty()) {
            config.storage_path = Some(PathBuf::from(path));
        }
        if let Some(n) = parse(&lookup, "VARIA_OUTBOX_CAPACITY")? {
            config.outbox_capacity = n;
        }
        if let Some(n) = parse::<usize>(&lookup, "VARIA_CACHE_CAPACITY")? {
            config.workspace_cache_capacity =
                NonZeroUsize::new(n).ok_or_else(|| ConfigError::Invalid {
                    key: "VARIA_CACHE_CAPACITY",
                    value: n.to_string(),
                })?;
        }
        if let Some(ms) = parse(&lookup, "VARIA_RETRY_DELAY_MS")? {
            config.membership_retry_delay_ms = ms;
        }

        Ok(config)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            membership_retry_delay: Duration::from_millis(self.membership_retry_delay_ms),
            workspace_cache_capacity: self.workspace_cache_capacity,
            outbox_capacity: self.outbox_capacity,
        }
    }
}

/// The subset of [`ServerConfig`] the engine needs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub membership_retry_delay: Duration,
    pub workspace_cache_capacity: NonZeroUsize,
    pub outbox_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        ServerConfig::default().engine_config()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(None),
    }
}
