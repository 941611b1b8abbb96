//! CLI parse: clap types for kvdoc. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// kvdoc CLI - batched document loading over a key-value store
#[derive(Parser)]
#[command(name = "kvdoc")]
#[command(about = "Save, load and delete documents through a batching loader")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Redis URL (overrides store.url)
    #[arg(long)]
    pub url: Option<String>,

    /// Use the in-process memory store
    #[arg(long, conflicts_with = "url")]
    pub memory: bool,

    /// Send every batch as a MULTI/EXEC transaction
    #[arg(long)]
    pub atomic: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sample planet documents
    Planet {
        #[command(subcommand)]
        command: PlanetCommands,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum PlanetCommands {
    /// Save one planet
    Save {
        id: String,
        #[arg(long)]
        name: Option<String>,
        /// Surface gravity in m/s²
        #[arg(long)]
        gravity: Option<f64>,
        /// Diameter in km; never overwritten once stored
        #[arg(long)]
        diameter: Option<u64>,
        /// Read the stored values back as part of the save
        #[arg(long)]
        reload: bool,
    },
    /// Load planets in one batch
    Load {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete planets in one batch
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Save, load, delete, then load again
    Demo,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the effective configuration
    Validate,
}
