//! Commands and child operations are attributed to the operation that issued them.

use super::support::{film_store, new_log, Film};
use async_trait::async_trait;
use kvdoc::{
    Command, Document, Documents, HookContext, HookResult, Loader, MemoryStore, OperationId,
    OperationSpec,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[tokio::test]
async fn test_result_callbacks_run_in_issuing_operation() {
    let store = film_store().await;
    let loader = Loader::new(store);
    let log = new_log();
    let film = Film::new("1", &log);

    loader.load(film.clone()).await.unwrap();

    let film_op = film.operation.lock().expect("film prepared inside its operation");
    for id in ["luke", "leia"] {
        let character = film.character(id);
        let character_op = character.operation.lock().expect("character prepared");
        assert_ne!(character_op, film_op);

        let (active, parent) = character.callback_context.lock().expect("callback ran");
        assert_eq!(active, Some(character_op));
        assert_eq!(parent, Some(film_op));
    }
    assert_eq!(loader.active_operation(), None);
    assert_eq!(loader.stats().active_depth, 0);
}

#[tokio::test]
async fn test_commands_outside_operations_are_unattributed() {
    let store = film_store().await;
    let loader = Loader::new(store);
    assert_eq!(loader.active_operation(), None);
    assert!(loader.enqueue_command(Command::new("PING")));
    assert_eq!(loader.stats().tracked_operations, 0);
}

/// Records the operation it was prepared under and that operation's parent.
#[derive(Default)]
struct Leaf {
    operation: Mutex<Option<OperationId>>,
    parent: Mutex<Option<OperationId>>,
}

#[async_trait]
impl Document for Leaf {
    fn prepare_load(self: Arc<Self>, loader: &Loader, _cx: &HookContext) -> HookResult {
        let active = loader.active_operation();
        *self.operation.lock() = active;
        *self.parent.lock() = active.and_then(|id| loader.parent_of(id));
        loader.enqueue_command(Command::new("PING"));
        Ok(())
    }
}

/// Issues a command whose callback discovers a new leaf.
#[derive(Default)]
struct Issuer {
    operation: Mutex<Option<OperationId>>,
    discovered: Mutex<Option<Arc<Leaf>>>,
}

#[async_trait]
impl Document for Issuer {
    fn prepare_load(self: Arc<Self>, loader: &Loader, _cx: &HookContext) -> HookResult {
        *self.operation.lock() = loader.active_operation();
        let issuer = Arc::clone(&self);
        let handle = loader.clone();
        loader.enqueue_command(Command::new("PING").then(move |_| {
            let leaf = Arc::new(Leaf::default());
            *issuer.discovered.lock() = Some(Arc::clone(&leaf));
            handle.enqueue_operation(OperationSpec::load(leaf));
            Ok(())
        }));
        Ok(())
    }
}

#[tokio::test]
async fn test_child_discovered_in_callback_belongs_to_issuer() {
    let store = Arc::new(MemoryStore::new());
    let loader = Loader::new(store);
    let issuer = Arc::new(Issuer::default());
    let other = Arc::new(Leaf::default());

    // `other` is prepared, and active, after the issuer's command is queued.
    let documents = Documents::new()
        .with(issuer.clone() as Arc<dyn Document>)
        .with(other.clone() as Arc<dyn Document>);
    loader.load(documents).await.unwrap();

    let issuer_op = issuer.operation.lock().expect("issuer prepared");
    let other_op = other.operation.lock().expect("other prepared");
    assert_ne!(issuer_op, other_op);
    assert_eq!(*other.parent.lock(), None);

    let discovered = issuer.discovered.lock().clone().expect("callback ran");
    assert_eq!(*discovered.parent.lock(), Some(issuer_op));
}
