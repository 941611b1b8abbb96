//! CLI domain: parse, route and presentation for the `kvdoc` binary.

mod parse;
mod planet;
mod presentation;
mod route;

pub use parse::{Cli, Commands, ConfigCommands, PlanetCommands};
pub use planet::{Planet, PlanetView};
pub use presentation::{format_planets_json, format_planets_text};
pub use route::RunContext;
