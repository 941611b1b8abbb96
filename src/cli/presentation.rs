//! CLI presentation: tables and JSON for planet listings.

use super::planet::PlanetView;
use crate::error::KvdocError;
use crate::loader::LoaderStats;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;

fn cell<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn format_planets_text(planets: &[PlanetView]) -> String {
    if planets.is_empty() {
        return "No planets.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Id", "Name", "Gravity (m/s²)", "Diameter (km)"]);
    for planet in planets {
        table.add_row(vec![
            planet.id.clone(),
            cell(&planet.name),
            cell(&planet.gravity),
            cell(&planet.diameter),
        ]);
    }
    table.to_string()
}

pub fn format_planets_json(planets: &[PlanetView]) -> Result<String, KvdocError> {
    serde_json::to_string_pretty(planets).map_err(|e| KvdocError::Output(e.to_string()))
}

pub fn format_stats_text(stats: &LoaderStats) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Round trips", "Tracked operations", "Queued commands"]);
    table.add_row(vec![
        stats.round_trips.to_string(),
        stats.tracked_operations.to_string(),
        stats.queued_commands.to_string(),
    ]);
    table.to_string()
}
