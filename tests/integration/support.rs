//! Shared fixtures: a film document whose characters and their homeworlds load as
//! child operations, and helpers for seeding the memory store.

use async_trait::async_trait;
use kvdoc::cli::Planet;
use kvdoc::store::StoreCommand;
use kvdoc::{
    Command, Document, HookContext, HookResult, Loader, MemoryStore, OperationId,
    OperationSpec, Store, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn position(log: &Log, entry: &str) -> usize {
    log.lock()
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("missing log entry {entry}: {:?}", log.lock()))
}

/// Memory store seeded with two films and their characters.
pub async fn film_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let batch = vec![
        set("film:1:title", "A New Hope"),
        StoreCommand::new(
            "SADD",
            vec!["film:1:characters".into(), "luke".into(), "leia".into()],
        ),
        set("character:luke:name", "Luke Skywalker"),
        set("character:luke:homeworld", "tatooine"),
        set("character:leia:name", "Leia Organa"),
        set("character:leia:homeworld", "alderaan"),
        set("planet:tatooine:name", "Tatooine"),
        set("planet:alderaan:name", "Alderaan"),
        set("film:2:title", "The Empire Strikes Back"),
        StoreCommand::new("SADD", vec!["film:2:characters".into(), "han".into()]),
        set("character:han:name", "Han Solo"),
        set("character:han:homeworld", "corellia"),
        set("planet:corellia:name", "Corellia"),
    ];
    for reply in store.execute(&batch).await.unwrap() {
        reply.unwrap();
    }
    store
}

fn set(key: &str, value: &str) -> StoreCommand {
    StoreCommand::new("SET", vec![key.into(), value.into()])
}

pub struct Film {
    pub id: String,
    pub title: Mutex<Option<String>>,
    pub characters: Mutex<Vec<Arc<Character>>>,
    /// Active operation seen by the prepare hook.
    pub operation: Mutex<Option<OperationId>>,
    log: Log,
}

impl Film {
    pub fn new(id: &str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            title: Mutex::new(None),
            characters: Mutex::new(Vec::new()),
            operation: Mutex::new(None),
            log: Arc::clone(log),
        })
    }

    pub fn character(&self, id: &str) -> Arc<Character> {
        self.characters
            .lock()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .unwrap_or_else(|| panic!("character {id} not loaded"))
    }
}

#[async_trait]
impl Document for Film {
    fn prepare_load(self: Arc<Self>, loader: &Loader, _cx: &HookContext) -> HookResult {
        self.log.lock().push(format!("prepare:film:{}", self.id));
        *self.operation.lock() = loader.active_operation();

        let film = Arc::clone(&self);
        loader.enqueue_command(
            Command::new("GET")
                .arg(format!("film:{}:title", self.id))
                .then(move |reply| {
                    *film.title.lock() = reply.and_then(Value::as_text);
                    Ok(())
                }),
        );

        let film = Arc::clone(&self);
        let handle = loader.clone();
        loader.enqueue_command(
            Command::new("SMEMBERS")
                .arg(format!("film:{}:characters", self.id))
                .then(move |reply| {
                    let mut ids: Vec<String> = reply
                        .and_then(Value::as_array)
                        .unwrap_or_default()
                        .iter()
                        .filter_map(Value::as_text)
                        .collect();
                    ids.sort();
                    for id in ids {
                        let character = Character::new(&id, &film.log);
                        film.characters.lock().push(Arc::clone(&character));
                        let log = Arc::clone(&film.log);
                        handle.enqueue_operation(OperationSpec::load(character).on_complete(
                            move |_| log.lock().push(format!("complete:character:{id}")),
                        ));
                    }
                    Ok(())
                }),
        );
        Ok(())
    }

    async fn post_load(self: Arc<Self>, _loader: &Loader, _cx: &HookContext) -> HookResult {
        self.log.lock().push(format!("post:film:{}", self.id));
        Ok(())
    }
}

pub struct Character {
    pub id: String,
    pub name: Mutex<Option<String>>,
    pub homeworld: Mutex<Option<Arc<Planet>>>,
    /// Active operation seen by the prepare hook.
    pub operation: Mutex<Option<OperationId>>,
    /// Active operation and its parent, as seen from a result callback.
    pub callback_context: Mutex<Option<(Option<OperationId>, Option<OperationId>)>>,
    log: Log,
}

impl Character {
    pub fn new(id: &str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            name: Mutex::new(None),
            homeworld: Mutex::new(None),
            operation: Mutex::new(None),
            callback_context: Mutex::new(None),
            log: Arc::clone(log),
        })
    }
}

#[async_trait]
impl Document for Character {
    fn prepare_load(self: Arc<Self>, loader: &Loader, _cx: &HookContext) -> HookResult {
        *self.operation.lock() = loader.active_operation();

        let character = Arc::clone(&self);
        loader.enqueue_command(
            Command::new("GET")
                .arg(format!("character:{}:name", self.id))
                .then(move |reply| {
                    *character.name.lock() = reply.and_then(Value::as_text);
                    Ok(())
                }),
        );

        let character = Arc::clone(&self);
        let handle = loader.clone();
        loader.enqueue_command(
            Command::new("GET")
                .arg(format!("character:{}:homeworld", self.id))
                .then(move |reply| {
                    let active = handle.active_operation();
                    let parent = active.and_then(|id| handle.parent_of(id));
                    *character.callback_context.lock() = Some((active, parent));

                    if let Some(planet_id) = reply.and_then(Value::as_text) {
                        let planet = Planet::new(planet_id.clone());
                        *character.homeworld.lock() = Some(Arc::clone(&planet));
                        let log = Arc::clone(&character.log);
                        handle.enqueue_operation(OperationSpec::load(planet).on_complete(
                            move |_| log.lock().push(format!("complete:planet:{planet_id}")),
                        ));
                    }
                    Ok(())
                }),
        );
        Ok(())
    }

    async fn post_load(self: Arc<Self>, _loader: &Loader, _cx: &HookContext) -> HookResult {
        self.log.lock().push(format!("post:character:{}", self.id));
        Ok(())
    }
}
