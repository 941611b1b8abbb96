//! Atomic loaders wrap each batch in MULTI/EXEC.

use async_trait::async_trait;
use kvdoc::cli::Planet;
use kvdoc::config::LoaderConfig;
use kvdoc::{
    Command, Document, DocumentError, Documents, HookContext, HookResult, Loader, MemoryStore,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn atomic_loader(store: &Arc<MemoryStore>) -> Loader {
    Loader::with_config(store.clone(), &LoaderConfig { atomic: true })
}

#[tokio::test]
async fn test_atomic_save_is_one_transaction() {
    let store = Arc::new(MemoryStore::new());
    let loader = atomic_loader(&store);
    let earth = Planet::with_fields("earth", Some("Earth".into()), Some(9.81), None);

    loader.save(earth).await.unwrap();

    let batch = &store.batches()[0];
    assert_eq!(batch.first().map(|c| c.name.as_str()), Some("multi"));
    assert_eq!(batch.last().map(|c| c.name.as_str()), Some("exec"));
    assert_eq!(store.peek_string("planet:earth:name").as_deref(), Some("Earth"));
}

#[tokio::test]
async fn test_aborted_transaction_completes_without_writes() {
    let store = Arc::new(MemoryStore::new());
    let loader = atomic_loader(&store);
    store.abort_next_transaction();

    let mars = Planet::with_fields("mars", Some("Mars".into()), None, Some(6779));
    tokio::time::timeout(Duration::from_secs(1), loader.save(mars))
        .await
        .expect("aborted batch must not stall the loader")
        .unwrap();
    assert!(!store.contains_key("planet:mars:name"));

    // Reading back through an aborted batch leaves the required name missing.
    store.abort_next_transaction();
    let err = tokio::time::timeout(Duration::from_secs(1), loader.load(Planet::new("mars")))
        .await
        .expect("aborted batch must not stall the loader")
        .unwrap_err();
    assert_eq!(err.errors().len(), 1);
}

/// Increments a key during load and fails when the store rejects it.
struct Counter {
    key: String,
    replied: Mutex<Option<bool>>,
}

#[async_trait]
impl Document for Counter {
    fn prepare_load(self: Arc<Self>, loader: &Loader, _cx: &HookContext) -> HookResult {
        let counter = Arc::clone(&self);
        loader.enqueue_command(Command::new("INCR").arg(self.key.as_str()).then(
            move |reply| {
                *counter.replied.lock() = Some(reply.is_some());
                match reply {
                    Some(_) => Ok(()),
                    None => Err(DocumentError::msg("increment rejected")),
                }
            },
        ));
        Ok(())
    }
}

#[tokio::test]
async fn test_failed_command_stays_with_its_document() {
    let store = Arc::new(MemoryStore::new());
    let loader = atomic_loader(&store);
    let earth = Planet::with_fields("earth", Some("Earth".into()), Some(9.81), None);
    loader.save(earth).await.unwrap();

    let reloaded = Planet::new("earth");
    let counter = Arc::new(Counter {
        key: "planet:earth:name".to_string(),
        replied: Mutex::new(None),
    });
    let documents = Documents::new()
        .with(reloaded.clone())
        .with(counter.clone());

    let err = loader.load(documents).await.unwrap_err();

    // Both documents shared one MULTI/EXEC.
    let batch = store.batches().last().cloned().unwrap();
    assert_eq!(batch.first().map(|c| c.name.as_str()), Some("multi"));
    assert!(batch.iter().any(|c| c.name == "incr"));
    assert!(batch.iter().any(|c| c.name == "get"));

    let messages: Vec<String> = err.errors().iter().map(|e| e.to_string()).collect();
    assert_eq!(messages, vec!["increment rejected"]);
    assert_eq!(*counter.replied.lock(), Some(false));
    assert_eq!(reloaded.view().name.as_deref(), Some("Earth"));
    assert_eq!(reloaded.view().gravity, Some(9.81));
    assert_eq!(store.peek_string("planet:earth:name").as_deref(), Some("Earth"));
}
