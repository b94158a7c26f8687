use searchcore::persist::{load_snapshot, save_meta, save_snapshot, IndexPaths, MetaFile};
use searchcore::{Document, EngineConfig, IndexStore, SearchService};
use std::sync::Arc;

#[test]
fn snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let paths = IndexPaths::new(dir.path().join("idx"));

    let svc = SearchService::new(EngineConfig::default()).unwrap();
    svc.build_index(vec![
        Document::new(1, "http://a.test", "A", "alpha beta").with_tags(["x"]),
        Document::new(2, "http://b.test", "B", "beta gamma"),
    ]);
    let before = svc.process_query("beta", 10);
    let meta = save_snapshot(&paths, svc.index_store().as_ref(), svc.documents().as_ref()).unwrap();
    assert_eq!(meta.num_docs, 2);
    assert_eq!(meta.num_terms, 3);
    svc.shutdown();

    let (index, docs, loaded) = load_snapshot(&paths).unwrap();
    assert_eq!(loaded, meta);
    assert_eq!(index.count(), 3);
    let restored = SearchService::with_stores(EngineConfig::default(), Arc::new(index), Arc::new(docs)).unwrap();
    assert_eq!(restored.process_query("beta", 10), before);
    assert_eq!(restored.process_query_with_tags("beta", &["x".to_string()], 10), vec![1]);
    assert!(restored.facade().search("gamma"));
}

#[test]
fn rejects_unknown_version() {
    let dir = tempfile::tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    save_meta(&paths, &MetaFile { num_docs: 0, num_terms: 0, created_at: String::new(), version: 99 }).unwrap();
    assert!(load_snapshot(&paths).is_err());
}

#[test]
fn missing_snapshot_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_snapshot(&IndexPaths::new(dir.path().join("nope"))).unwrap_err();
    assert!(matches!(err, searchcore::SearchError::Io(_)));
}
