//! CLI route: run context and the single dispatch table.

use super::parse::{Cli, Commands, ConfigCommands, PlanetCommands};
use super::planet::{Planet, PlanetView};
use super::presentation::{format_planets_json, format_planets_text, format_stats_text};
use crate::config::{ConfigLoader, KvdocConfig, StoreBackend};
use crate::error::{KvdocError, LoaderError};
use crate::loader::Loader;
use crate::logging::parse_format;
use crate::operation::TraverseOptions;
use crate::store;
use std::sync::Arc;
use tracing::{info, warn};

/// Effective configuration plus output settings for one CLI invocation.
pub struct RunContext {
    config: KvdocConfig,
    json: bool,
}

impl RunContext {
    /// Load layered configuration and apply command-line overrides on top.
    pub fn new(cli: &Cli) -> Result<Self, KvdocError> {
        let mut config = ConfigLoader::load(cli.config.as_deref())?;
        if cli.memory {
            config.store.backend = StoreBackend::Memory;
        }
        if let Some(ref url) = cli.url {
            config.store.backend = StoreBackend::Redis;
            config.store.url = url.clone();
        }
        if cli.atomic {
            config.loader.atomic = true;
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(ref format) = cli.log_format {
            config.logging.format = parse_format(format)?;
        }
        Ok(Self {
            config,
            json: cli.json,
        })
    }

    pub fn config(&self) -> &KvdocConfig {
        &self.config
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, KvdocError> {
        match command {
            Commands::Config { command } => self.handle_config(command),
            Commands::Planet { command } => {
                let loader = self.connect().await?;
                let output = self.handle_planet(&loader, command).await;
                loader.close().await;
                output
            }
        }
    }

    fn validate(&self) -> Result<(), KvdocError> {
        self.config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            KvdocError::Config(messages.join("; "))
        })
    }

    async fn connect(&self) -> Result<Loader, KvdocError> {
        self.validate()?;
        let store = store::connect(&self.config.store).await?;
        info!(store = store.name(), atomic = self.config.loader.atomic, "Loader ready");
        Ok(Loader::with_config(store, &self.config.loader))
    }

    fn handle_config(&self, command: &ConfigCommands) -> Result<String, KvdocError> {
        match command {
            ConfigCommands::Show => {
                toml::to_string_pretty(&self.config).map_err(|e| KvdocError::Output(e.to_string()))
            }
            ConfigCommands::Validate => {
                self.validate()?;
                Ok("Configuration is valid".to_string())
            }
        }
    }

    async fn handle_planet(
        &self,
        loader: &Loader,
        command: &PlanetCommands,
    ) -> Result<String, KvdocError> {
        match command {
            PlanetCommands::Save {
                id,
                name,
                gravity,
                diameter,
                reload,
            } => {
                let planet = Planet::with_fields(id.clone(), name.clone(), *gravity, *diameter);
                let options = TraverseOptions {
                    load_on_save: *reload,
                };
                loader.save_with(Arc::clone(&planet), options).await?;
                self.render(&[planet.view()])
            }
            PlanetCommands::Load { ids } => {
                let planets: Vec<Arc<Planet>> = ids.iter().map(Planet::new).collect();
                loader.load(planets.clone()).await?;
                self.render(&views(&planets))
            }
            PlanetCommands::Delete { ids } => {
                let planets: Vec<Arc<Planet>> = ids.iter().map(Planet::new).collect();
                loader.delete(planets).await?;
                Ok(format!("Deleted {} planet(s)", ids.len()))
            }
            PlanetCommands::Demo => self.demo(loader).await,
        }
    }

    async fn demo(&self, loader: &Loader) -> Result<String, KvdocError> {
        let mut out = Vec::new();
        let planets = vec![
            Planet::with_fields("earth", Some("Earth".into()), Some(9.81), Some(12742)),
            Planet::with_fields("mars", Some("Mars".into()), Some(3.72), Some(6779)),
        ];
        loader.save(planets.clone()).await?;
        out.push(format!("Saved {} planets", planets.len()));

        let fresh: Vec<Arc<Planet>> = planets.iter().map(|p| Planet::new(p.id())).collect();
        loader.load(fresh.clone()).await?;
        out.push(self.render(&views(&fresh))?);

        loader.delete(fresh.clone()).await?;
        out.push(format!("Deleted {} planets", fresh.len()));

        let gone: Vec<Arc<Planet>> = fresh.iter().map(|p| Planet::new(p.id())).collect();
        match loader.load(gone).await {
            Ok(()) => warn!("Deleted planets still loaded"),
            Err(LoaderError::Documents(failures)) => {
                for failure in failures {
                    out.push(format!("Expected: {}", failure));
                }
            }
            Err(other) => return Err(other.into()),
        }

        if !self.json {
            out.push(format_stats_text(&loader.stats()));
        }
        Ok(out.join("\n\n"))
    }

    fn render(&self, planets: &[PlanetView]) -> Result<String, KvdocError> {
        if self.json {
            format_planets_json(planets)
        } else {
            Ok(format_planets_text(planets))
        }
    }
}

fn views(planets: &[Arc<Planet>]) -> Vec<PlanetView> {
    planets.iter().map(|p| p.view()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn context(args: &[&str]) -> (RunContext, Commands) {
        let cli = Cli::try_parse_from(args).unwrap();
        let cx = RunContext::new(&cli).unwrap();
        (cx, cli.command)
    }

    #[test]
    fn test_flags_override_config() {
        let (cx, _) = context(&["kvdoc", "--memory", "--atomic", "--log-level", "debug", "config", "show"]);
        assert_eq!(cx.config().store.backend, StoreBackend::Memory);
        assert!(cx.config().loader.atomic);
        assert_eq!(cx.config().logging.level, "debug");

        let (cx, _) = context(&["kvdoc", "--url", "redis://cache:6380", "config", "show"]);
        assert_eq!(cx.config().store.url, "redis://cache:6380");
    }

    #[tokio::test]
    async fn test_demo_runs_against_memory_store() {
        let (cx, command) = context(&["kvdoc", "--memory", "planet", "demo"]);
        let out = cx.execute(&command).await.unwrap();
        assert!(out.contains("Earth"));
        assert!(out.contains("Expected:"));
    }

    #[tokio::test]
    async fn test_config_show_is_toml() {
        let (cx, command) = context(&["kvdoc", "--memory", "config", "show"]);
        let out = cx.execute(&command).await.unwrap();
        let parsed: KvdocConfig = toml::from_str(&out).unwrap();
        assert_eq!(parsed.store.backend, StoreBackend::Memory);
    }
}
