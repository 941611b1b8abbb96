//! Environment source: KVDOC__SECTION__KEY, e.g. KVDOC__STORE__URL.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub const PREFIX: &str = "KVDOC";
pub const SEPARATOR: &str = "__";

/// Add environment overrides. `vars` stands in for the process environment when set.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    vars: Option<config::Map<String, String>>,
) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(PREFIX)
            .prefix_separator(SEPARATOR)
            .separator(SEPARATOR)
            .try_parsing(true)
            .source(vars),
    )
}
