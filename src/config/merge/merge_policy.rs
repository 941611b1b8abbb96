//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

use crate::config::DEFAULT_REDIS_URL;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override earlier ones key by key, so a file only needs to name the
/// settings it changes.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("store.backend", "redis")?
        .set_default("store.url", DEFAULT_REDIS_URL)?
        .set_default("loader.atomic", false)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}
