//! Planet: the sample model behind `kvdoc planet`.

use crate::error::DocumentError;
use crate::model::{HookTable, Model, StringField};
use crate::operation::Action;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Stored as `planet:{id}:name`, `planet:{id}:gravity` and `planet:{id}:diameter`.
#[derive(Debug, Default)]
pub struct Planet {
    id: String,
    name: Mutex<Option<String>>,
    gravity: Mutex<Option<f64>>,
    diameter: Mutex<Option<u64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanetView {
    pub id: String,
    pub name: Option<String>,
    pub gravity: Option<f64>,
    pub diameter: Option<u64>,
}

impl Planet {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            ..Self::default()
        })
    }

    pub fn with_fields(
        id: impl Into<String>,
        name: Option<String>,
        gravity: Option<f64>,
        diameter: Option<u64>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            name: Mutex::new(name),
            gravity: Mutex::new(gravity),
            diameter: Mutex::new(diameter),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn view(&self) -> PlanetView {
        PlanetView {
            id: self.id.clone(),
            name: self.name.lock().clone(),
            gravity: *self.gravity.lock(),
            diameter: *self.diameter.lock(),
        }
    }

    fn key(&self, property: &str) -> String {
        format!("planet:{}:{}", self.id, property)
    }
}

fn parse_or_drop<T: std::str::FromStr>(property: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            debug!(property, raw = %raw, "Ignoring unparsable stored value");
            None
        }
    }
}

impl Model for Planet {
    fn hooks() -> &'static HookTable<Self> {
        static HOOKS: OnceLock<HookTable<Planet>> = OnceLock::new();
        HOOKS.get_or_init(|| {
            HookTable::new()
                .field(
                    StringField::new(
                        "name",
                        |p: &Planet| p.key("name"),
                        |p| p.name.lock().clone(),
                        |p, v| *p.name.lock() = v,
                    )
                    .required(),
                )
                .field(StringField::new(
                    "gravity",
                    |p: &Planet| p.key("gravity"),
                    |p| p.gravity.lock().map(|g| g.to_string()),
                    |p, v| *p.gravity.lock() = parse_or_drop("gravity", v),
                ))
                .field(
                    StringField::new(
                        "diameter",
                        |p: &Planet| p.key("diameter"),
                        |p| p.diameter.lock().map(|d| d.to_string()),
                        |p, v| *p.diameter.lock() = parse_or_drop("diameter", v),
                    )
                    .readonly(),
                )
                .on_post(Action::Load, |planet, _, _| {
                    Box::pin(async move {
                        debug!(planet = %planet.id, "Planet loaded");
                        Ok::<(), DocumentError>(())
                    })
                })
        })
    }
}
