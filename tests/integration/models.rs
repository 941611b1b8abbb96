//! Model round trips through the loader.

use kvdoc::cli::Planet;
use kvdoc::{DocumentError, Loader, LoaderError, MemoryStore, TraverseOptions};
use std::sync::Arc;

#[tokio::test]
async fn test_save_load_delete_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let loader = Loader::new(store.clone());

    let saturn = Planet::with_fields("saturn", Some("Saturn".into()), Some(10.44), Some(116460));
    loader.save(saturn.clone()).await.unwrap();

    let loaded = Planet::new("saturn");
    loader.load(loaded.clone()).await.unwrap();
    assert_eq!(loaded.view(), saturn.view());

    loader.delete(Planet::new("saturn")).await.unwrap();
    assert!(!store.contains_key("planet:saturn:name"));

    let err = loader.load(Planet::new("saturn")).await.unwrap_err();
    match err {
        LoaderError::Documents(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].document_type, "Planet");
            assert!(matches!(
                failures[0].errors.as_slice(),
                [DocumentError::MissingProperty(p)] if p == "name"
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_load_on_save_reads_back_stored_values() {
    let store = Arc::new(MemoryStore::new());
    let loader = Loader::new(store);

    let first = Planet::with_fields("venus", Some("Venus".into()), None, Some(12104));
    loader.save(first).await.unwrap();

    // diameter is read-only: the stored value wins and is read back.
    let second = Planet::with_fields("venus", Some("Venus".into()), Some(8.87), Some(1));
    loader
        .save_with(second.clone(), TraverseOptions { load_on_save: true })
        .await
        .unwrap();
    assert_eq!(second.view().diameter, Some(12104));
    assert_eq!(second.view().gravity, Some(8.87));
}

#[tokio::test]
async fn test_transport_failure_reports_missing_required_field() {
    let store = Arc::new(MemoryStore::new());
    let loader = Loader::new(store.clone());
    loader
        .save(Planet::with_fields("pluto", Some("Pluto".into()), None, None))
        .await
        .unwrap();

    store.fail_next_round_trip();
    let err = loader.load(Planet::new("pluto")).await.unwrap_err();
    assert_eq!(err.errors().len(), 1);

    // The store recovers for the next call.
    let pluto = Planet::new("pluto");
    loader.load(pluto.clone()).await.unwrap();
    assert_eq!(pluto.view().name.as_deref(), Some("Pluto"));
}

#[tokio::test]
async fn test_save_without_required_field_fails_in_prepare() {
    let store = Arc::new(MemoryStore::new());
    let loader = Loader::new(store.clone());
    let err = loader
        .save(Planet::with_fields("nameless", None, Some(1.0), None))
        .await
        .unwrap_err();
    assert_eq!(err.errors().len(), 1);
    assert!(!store.contains_key("planet:nameless:gravity"));
}
