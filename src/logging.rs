//! Logging System
//!
//! Structured logging via `tracing`. The library only emits events; binaries call
//! [`init_logging`] once to install a subscriber.

use crate::error::KvdocError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Full filter directive, overrides `level` and `modules`.
pub const LOG_ENV: &str = "KVDOC_LOG";
pub const LOG_FORMAT_ENV: &str = "KVDOC_LOG_FORMAT";
pub const LOG_OUTPUT_ENV: &str = "KVDOC_LOG_OUTPUT";
/// Comma separated `module=level` pairs added on top of the configured filter.
pub const LOG_MODULES_ENV: &str = "KVDOC_LOG_MODULES";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    Stderr,
    File,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_format")]
    pub format: LogFormat,

    #[serde(default = "default_output")]
    pub output: LogOutput,

    /// Log file path, used when `output = "file"`
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Colored output (text format, terminal outputs only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels, e.g. `kvdoc::loader = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> LogFormat {
    LogFormat::Text
}

fn default_output() -> LogOutput {
    LogOutput::Stderr
}

fn default_log_file() -> PathBuf {
    PathBuf::from("kvdoc.log")
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: default_true(),
            modules: BTreeMap::new(),
        }
    }
}

/// Initialize the logging system
///
/// Priority order (highest to lowest):
/// 1. Environment variables (`KVDOC_LOG`, `KVDOC_LOG_FORMAT`, `KVDOC_LOG_OUTPUT`)
/// 2. Configuration
/// 3. Defaults
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), KvdocError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);

    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;

    let (writer, ansi) = match output {
        LogOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), config.color),
        LogOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), config.color),
        LogOutput::File => (BoxMakeWriter::new(open_log_file(config)?), false),
    };

    let registry = Registry::default().with(filter);
    let layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(writer);

    let installed = match format {
        LogFormat::Json => registry.with(layer.json()).try_init(),
        LogFormat::Text => registry.with(layer.with_ansi(ansi)).try_init(),
    };
    installed.map_err(|e| KvdocError::Config(format!("Failed to install logger: {}", e)))
}

fn open_log_file(config: &LoggingConfig) -> Result<std::fs::File, KvdocError> {
    if let Some(parent) = config.file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                KvdocError::Config(format!("Failed to create log directory: {}", e))
            })?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.file)
        .map_err(|e| {
            KvdocError::Config(format!(
                "Failed to open log file {}: {}",
                config.file.display(),
                e
            ))
        })
}

/// Build environment filter from config or environment variables
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, KvdocError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }

    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut directives: Vec<String> = config
        .modules
        .iter()
        .map(|(module, level)| format!("{}={}", module, level))
        .collect();
    if let Ok(modules) = std::env::var(LOG_MODULES_ENV) {
        directives.extend(parse_module_directives(&modules));
    }

    let mut filter = EnvFilter::new(&config.level);
    for directive in directives {
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| KvdocError::Config(format!("Invalid log directive '{}': {}", directive, e)))?,
        );
    }
    Ok(filter)
}

/// `a=debug, b = warn` into directives. Entries without `=` are ignored.
fn parse_module_directives(spec: &str) -> Vec<String> {
    spec.split(',')
        .filter_map(|entry| {
            let (module, level) = entry.split_once('=')?;
            let (module, level) = (module.trim(), level.trim());
            (!module.is_empty() && !level.is_empty()).then(|| format!("{}={}", module, level))
        })
        .collect()
}

fn determine_format(config: &LoggingConfig) -> Result<LogFormat, KvdocError> {
    match std::env::var(LOG_FORMAT_ENV) {
        Ok(format) => parse_format(&format),
        Err(_) => Ok(config.format),
    }
}

fn determine_output(config: &LoggingConfig) -> Result<LogOutput, KvdocError> {
    match std::env::var(LOG_OUTPUT_ENV) {
        Ok(output) => parse_output(&output),
        Err(_) => Ok(config.output),
    }
}

pub(crate) fn parse_format(format: &str) -> Result<LogFormat, KvdocError> {
    match format {
        "json" => Ok(LogFormat::Json),
        "text" => Ok(LogFormat::Text),
        other => Err(KvdocError::Config(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            other
        ))),
    }
}

fn parse_output(output: &str) -> Result<LogOutput, KvdocError> {
    match output {
        "stdout" => Ok(LogOutput::Stdout),
        "stderr" => Ok(LogOutput::Stderr),
        "file" => Ok(LogOutput::File),
        other => Err(KvdocError::Config(format!(
            "Invalid log output: {} (must be 'stdout', 'stderr' or 'file')",
            other
        ))),
    }
}
