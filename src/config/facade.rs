//! ConfigLoader: assembles the configuration layers.

use super::merge::merge_policy;
use super::sources::{environment, explicit_file, global_file};
use super::KvdocConfig;
use crate::error::KvdocError;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from every layer, with `explicit` as the config file named
    /// on the command line, if any.
    pub fn load(explicit: Option<&Path>) -> Result<KvdocConfig, KvdocError> {
        Self::build(global_file::global_config_path(), explicit, None)
    }

    /// Load a single file on top of the defaults, ignoring other layers.
    pub fn load_from_file(path: &Path) -> Result<KvdocConfig, KvdocError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = explicit_file::add_to_builder(builder, path)?;
        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    /// `env` replaces the process environment when given.
    pub(crate) fn build(
        global: Option<PathBuf>,
        explicit: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<KvdocConfig, KvdocError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        if let Some(global) = global {
            builder = global_file::add_to_builder(builder, &global)?;
        }
        if let Some(explicit) = explicit {
            builder = explicit_file::add_to_builder(builder, explicit)?;
        }
        builder = environment::add_to_builder(builder, env);

        let config: KvdocConfig = builder.build()?.try_deserialize()?;
        debug!(
            backend = ?config.store.backend,
            atomic = config.loader.atomic,
            "Configuration loaded"
        );
        Ok(config)
    }
}
