//! Operation trees complete bottom-up.

use super::support::{film_store, new_log, position, Film, Log};
use async_trait::async_trait;
use kvdoc::{
    Command, Document, HookContext, HookResult, Loader, MemoryStore, OperationId,
    OperationSpec, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

#[tokio::test]
async fn test_children_complete_before_parents() {
    let store = film_store().await;
    let loader = Loader::new(store);
    let log = new_log();
    let film = Film::new("1", &log);

    let (tx, rx) = oneshot::channel();
    let completion_log = Arc::clone(&log);
    loader.enqueue_operation(OperationSpec::load(film.clone()).on_complete(move |errors| {
        completion_log.lock().push("complete:film:1".to_string());
        let _ = tx.send(errors);
    }));
    assert!(rx.await.unwrap().is_none());

    let film_done = position(&log, "complete:film:1");
    for (character, planet) in [("luke", "tatooine"), ("leia", "alderaan")] {
        let planet_done = position(&log, &format!("complete:planet:{planet}"));
        let character_done = position(&log, &format!("complete:character:{character}"));
        assert!(planet_done < character_done);
        assert!(character_done < film_done);
        assert!(position(&log, &format!("post:character:{character}")) < character_done);
    }
    assert!(position(&log, "prepare:film:1") < position(&log, "post:film:1"));
    assert_eq!(film_done, log.lock().len() - 1);

    assert_eq!(film.title.lock().as_deref(), Some("A New Hope"));
    let luke = film.character("luke");
    assert_eq!(luke.name.lock().as_deref(), Some("Luke Skywalker"));
    let tatooine = luke.homeworld.lock().clone().unwrap();
    assert_eq!(tatooine.view().name.as_deref(), Some("Tatooine"));

    assert_eq!(loader.stats().tracked_operations, 0);
}

#[tokio::test]
async fn test_load_future_resolves_after_whole_tree() {
    let store = film_store().await;
    let loader = Loader::new(store);
    let log = new_log();
    let film = Film::new("1", &log);

    loader.load(film.clone()).await.unwrap();

    for planet in ["tatooine", "alderaan"] {
        position(&log, &format!("complete:planet:{planet}"));
    }
    let leia = film.character("leia");
    let alderaan = leia.homeworld.lock().clone().unwrap();
    assert_eq!(alderaan.view().name.as_deref(), Some("Alderaan"));
}

#[tokio::test]
async fn test_missing_child_data_fails_only_the_child() {
    let store = film_store().await;
    let loader = Loader::new(store);
    let log = new_log();

    // Film 3 does not exist: no title, no characters, no error.
    let film = Film::new("3", &log);
    loader.load(film.clone()).await.unwrap();
    assert!(film.title.lock().is_none());
    assert!(film.characters.lock().is_empty());
}

/// Reads `branch:{name}` and discovers one leaf, either from its prepare hook or
/// from the reply to its read.
struct Branch {
    name: String,
    leaf_from_reply: bool,
    leaf: Arc<Leaf>,
    log: Log,
}

impl Branch {
    fn new(name: &str, leaf_from_reply: bool, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            leaf_from_reply,
            leaf: Leaf::new(name, log),
            log: Arc::clone(log),
        })
    }

    fn leaf_operation(&self) -> OperationSpec {
        let log = Arc::clone(&self.log);
        let name = self.name.clone();
        OperationSpec::load(self.leaf.clone())
            .on_complete(move |_| log.lock().push(format!("complete:leaf:{name}")))
    }
}

#[async_trait]
impl Document for Branch {
    fn prepare_load(self: Arc<Self>, loader: &Loader, _cx: &HookContext) -> HookResult {
        self.log.lock().push(format!("prepare:branch:{}", self.name));
        if !self.leaf_from_reply {
            loader.enqueue_operation(self.leaf_operation());
        }

        let branch = Arc::clone(&self);
        let handle = loader.clone();
        loader.enqueue_command(Command::new("GET").arg(format!("branch:{}", self.name)).then(
            move |_| {
                if branch.leaf_from_reply {
                    handle.enqueue_operation(branch.leaf_operation());
                }
                Ok(())
            },
        ));
        Ok(())
    }
}

struct Leaf {
    name: String,
    log: Log,
    /// Parent of the active operation while preparing.
    parent: Mutex<Option<OperationId>>,
}

impl Leaf {
    fn new(name: &str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: Arc::clone(log),
            parent: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Document for Leaf {
    fn prepare_load(self: Arc<Self>, loader: &Loader, _cx: &HookContext) -> HookResult {
        self.log.lock().push(format!("prepare:leaf:{}", self.name));
        *self.parent.lock() = loader.active_operation().and_then(|id| loader.parent_of(id));

        let log = Arc::clone(&self.log);
        let name = self.name.clone();
        loader.enqueue_command(Command::new("GET").arg(format!("leaf:{}", self.name)).then(
            move |_| {
                log.lock().push(format!("reply:leaf:{name}"));
                Ok(())
            },
        ));
        Ok(())
    }
}

type Completion = oneshot::Receiver<Option<Vec<kvdoc::DocumentError>>>;

fn track(loader: &Loader, branch: Arc<Branch>, log: &Log) -> (OperationId, Completion) {
    let (tx, rx) = oneshot::channel();
    let log = Arc::clone(log);
    let name = branch.name.clone();
    let id = loader.enqueue_operation(OperationSpec::load(branch).on_complete(move |errors| {
        log.lock().push(format!("complete:branch:{name}"));
        let _ = tx.send(errors);
    }));
    (id, rx)
}

#[tokio::test]
async fn test_independent_roots_complete_in_dependency_order() {
    let loader = Loader::new(Arc::new(MemoryStore::new()));
    let log = new_log();
    let first = Branch::new("a", false, &log);
    let second = Branch::new("b", true, &log);

    // The second leaf only shows up once the first round trip is back, so the
    // first leaf's reply arrives a whole generation earlier.
    let (first_id, first_done) = track(&loader, first.clone(), &log);
    let (second_id, second_done) = track(&loader, second.clone(), &log);
    assert!(first_done.await.unwrap().is_none());
    assert!(second_done.await.unwrap().is_none());

    let prepared: Vec<String> = log
        .lock()
        .iter()
        .filter(|entry| entry.starts_with("prepare:"))
        .cloned()
        .collect();
    assert_eq!(
        prepared,
        vec!["prepare:branch:a", "prepare:leaf:a", "prepare:branch:b", "prepare:leaf:b"]
    );

    assert!(position(&log, "reply:leaf:a") < position(&log, "reply:leaf:b"));
    assert!(position(&log, "complete:leaf:a") < position(&log, "complete:branch:a"));
    assert!(position(&log, "complete:branch:a") < position(&log, "complete:leaf:b"));
    assert!(position(&log, "complete:leaf:b") < position(&log, "complete:branch:b"));

    assert_eq!(*first.leaf.parent.lock(), Some(first_id));
    assert_eq!(*second.leaf.parent.lock(), Some(second_id));
    assert_eq!(loader.stats().round_trips, 2);
}

/// Issues a second read from the reply to its first.
struct Chained {
    log: Log,
}

#[async_trait]
impl Document for Chained {
    fn prepare_load(self: Arc<Self>, loader: &Loader, _cx: &HookContext) -> HookResult {
        let log = Arc::clone(&self.log);
        let handle = loader.clone();
        loader.enqueue_command(Command::new("GET").arg("outer").then(move |_| {
            log.lock().push("outer".to_string());
            let log = Arc::clone(&log);
            handle.enqueue_command(Command::new("GET").arg("inner").then(move |reply| {
                log.lock().push("inner".to_string());
                if reply != Some(&Value::Nil) {
                    log.lock().push(format!("unexpected:{:?}", reply));
                }
                Ok(())
            }));
            Ok(())
        }));
        Ok(())
    }

    async fn post_load(self: Arc<Self>, _loader: &Loader, _cx: &HookContext) -> HookResult {
        self.log.lock().push("post".to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_commands_issued_from_replies_finish_before_post_hook() {
    let store = Arc::new(MemoryStore::new());
    let loader = Loader::new(store.clone());
    let log = new_log();

    loader
        .load(Arc::new(Chained {
            log: Arc::clone(&log),
        }))
        .await
        .unwrap();

    assert_eq!(*log.lock(), vec!["outer", "inner", "post"]);
    assert_eq!(store.round_trips(), 2);
}
