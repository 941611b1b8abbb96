//! One round trip per traversal generation, shared across concurrent calls.

use super::support::{film_store, new_log, Film};
use async_trait::async_trait;
use kvdoc::store::LimitedStore;
use kvdoc::{Command, Document, HookContext, HookResult, Loader, MemoryStore, Value};
use parking_lot::Mutex;
use std::sync::Arc;

#[tokio::test]
async fn test_generations_share_round_trips() {
    let store = film_store().await;
    let seeded = store.round_trips();
    let loader = Loader::new(store.clone());
    let log = new_log();

    // film -> characters -> homeworlds: three generations
    loader.load(Film::new("1", &log)).await.unwrap();
    assert_eq!(loader.stats().round_trips, 3);
    assert_eq!(store.round_trips() - seeded, 3);
}

#[tokio::test]
async fn test_concurrent_loads_batch_together() {
    let store = film_store().await;
    let loader = Loader::new(store);
    let log = new_log();
    let first = Film::new("1", &log);
    let second = Film::new("2", &log);

    let (a, b) = tokio::join!(loader.load(first.clone()), loader.load(second.clone()));
    a.unwrap();
    b.unwrap();

    assert_eq!(loader.stats().round_trips, 3);
    assert_eq!(first.characters.lock().len(), 2);
    let han = second.character("han");
    assert_eq!(han.name.lock().as_deref(), Some("Han Solo"));
}

/// Reads a shared key with `enqueue_command_once`.
struct Reader {
    accepted: Mutex<bool>,
    seen: Mutex<Option<Value>>,
}

#[async_trait]
impl Document for Reader {
    fn prepare_load(self: Arc<Self>, loader: &Loader, _cx: &HookContext) -> HookResult {
        let reader = Arc::clone(&self);
        let accepted = loader.enqueue_command_once(Command::new("GET").arg("shared").then(
            move |reply| {
                *reader.seen.lock() = reply.cloned();
                Ok(())
            },
        ));
        *self.accepted.lock() = accepted;
        Ok(())
    }
}

fn reader() -> Arc<Reader> {
    Arc::new(Reader {
        accepted: Mutex::new(false),
        seen: Mutex::new(None),
    })
}

#[tokio::test]
async fn test_once_commands_are_sent_once_per_batch() {
    let store = Arc::new(MemoryStore::new());
    let loader = Loader::new(store.clone());
    let (first, second) = (reader(), reader());

    loader.load(vec![first.clone(), second.clone()]).await.unwrap();

    assert!(*first.accepted.lock());
    assert!(!*second.accepted.lock());
    assert_eq!(*first.seen.lock(), Some(Value::Nil));
    assert_eq!(*second.seen.lock(), None);
    assert_eq!(store.batches()[0].len(), 1);

    // A later batch may issue the same command again.
    let third = reader();
    loader.load(third.clone()).await.unwrap();
    assert!(*third.accepted.lock());
}

#[tokio::test]
async fn test_loaders_share_a_limited_store() {
    let memory = film_store().await;
    let limited = Arc::new(LimitedStore::new(memory, 1));
    let first = Loader::new(limited.clone());
    let second = Loader::new(limited.clone());
    let log = new_log();

    let (a, b) = tokio::join!(
        first.load(Film::new("1", &log)),
        second.load(Film::new("2", &log))
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(limited.available(), 1);
}
