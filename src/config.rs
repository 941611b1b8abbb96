//! Configuration System
//!
//! Layered configuration: merge-policy defaults, the global config file, an explicit
//! config file, then `KVDOC__SECTION__KEY` environment variables. Tests included.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KvdocConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

/// Store connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Connection URL for the redis backend
    #[serde(default = "default_url")]
    pub url: String,

    /// Upper bound on concurrent round trips across all loaders sharing the store
    #[serde(default)]
    pub max_concurrent_round_trips: Option<usize>,

    /// How long a round trip may wait for a free slot
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

fn default_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_url() -> String {
    DEFAULT_REDIS_URL.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_url(),
            max_concurrent_round_trips: None,
            acquire_timeout_ms: None,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.backend == StoreBackend::Redis {
            if self.url.trim().is_empty() {
                return Err("url cannot be empty".to_string());
            }
            let scheme_ok = ["redis://", "rediss://", "redis+unix://", "unix://"]
                .iter()
                .any(|scheme| self.url.starts_with(scheme));
            if !scheme_ok {
                return Err(format!("url '{}' is not a redis URL", self.url));
            }
        }
        if self.max_concurrent_round_trips == Some(0) {
            return Err("max_concurrent_round_trips must be at least 1".to_string());
        }
        if self.acquire_timeout_ms.is_some() && self.max_concurrent_round_trips.is_none() {
            return Err(
                "acquire_timeout_ms requires max_concurrent_round_trips".to_string(),
            );
        }
        Ok(())
    }
}

/// Loader behavior
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Wrap every flushed batch in MULTI/EXEC
    #[serde(default)]
    pub atomic: bool,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Store(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Store(msg) => write!(f, "Store: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

impl KvdocConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.store.validate() {
            errors.push(ValidationError::Store(e));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "unknown level '{}'",
                self.logging.level
            )));
        }
        for (module, level) in &self.logging.modules {
            if !LOG_LEVELS.contains(&level.as_str()) {
                errors.push(ValidationError::Logging(format!(
                    "unknown level '{}' for module '{}'",
                    level, module
                )));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
