//! Persistence seams. The core only talks to these traits; the in-memory
//! implementations back tests, the CLI and snapshot loading.

use crate::index::InvertedIndexEntry;
use crate::{DocId, Document};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

pub trait IndexStore: Send + Sync {
    fn find_by_word(&self, word: &str) -> Option<InvertedIndexEntry>;
    /// Insert or replace the entry for `entry.term`.
    fn save(&self, entry: InvertedIndexEntry);
    fn find_all(&self) -> Vec<InvertedIndexEntry>;
    fn delete_all(&self);
    fn count(&self) -> usize;
}

pub trait DocumentStore: Send + Sync {
    fn get(&self, id: DocId) -> Option<Document>;
    fn find_by_url(&self, url: &str) -> Option<Document>;
    fn save(&self, doc: Document);
    fn find_all(&self) -> Vec<Document>;
    fn delete(&self, id: DocId) -> bool;
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryIndexStore {
    entries: RwLock<BTreeMap<String, InvertedIndexEntry>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self { Self::default() }

    pub fn from_entries<I: IntoIterator<Item = InvertedIndexEntry>>(entries: I) -> Self {
        let map = entries.into_iter().map(|e| (e.term.clone(), e)).collect();
        Self { entries: RwLock::new(map) }
    }
}

impl IndexStore for MemoryIndexStore {
    fn find_by_word(&self, word: &str) -> Option<InvertedIndexEntry> { self.entries.read().get(word).cloned() }

    fn save(&self, entry: InvertedIndexEntry) {
        self.entries.write().insert(entry.term.clone(), entry);
    }

    fn find_all(&self) -> Vec<InvertedIndexEntry> { self.entries.read().values().cloned().collect() }

    fn delete_all(&self) { self.entries.write().clear(); }

    fn count(&self) -> usize { self.entries.read().len() }
}

#[derive(Debug, Default)]
struct DocTables {
    by_id: BTreeMap<DocId, Document>,
    by_url: HashMap<String, DocId>,
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    tables: RwLock<DocTables>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self { Self::default() }

    pub fn from_documents<I: IntoIterator<Item = Document>>(docs: I) -> Self {
        let store = Self::new();
        for d in docs {
            store.save(d);
        }
        store
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get(&self, id: DocId) -> Option<Document> { self.tables.read().by_id.get(&id).cloned() }

    fn find_by_url(&self, url: &str) -> Option<Document> {
        let t = self.tables.read();
        t.by_url.get(url).and_then(|id| t.by_id.get(id)).cloned()
    }

    fn save(&self, doc: Document) {
        let t = &mut *self.tables.write();
        if let Some(old) = t.by_id.get(&doc.id) {
            if old.url != doc.url {
                t.by_url.remove(&old.url);
            }
        }
        t.by_url.insert(doc.url.clone(), doc.id);
        t.by_id.insert(doc.id, doc);
    }

    fn find_all(&self) -> Vec<Document> { self.tables.read().by_id.values().cloned().collect() }

    fn delete(&self, id: DocId) -> bool {
        let t = &mut *self.tables.write();
        match t.by_id.remove(&id) {
            Some(doc) => {
                t.by_url.remove(&doc.url);
                true
            }
            None => false,
        }
    }

    fn clear(&self) {
        let mut t = self.tables.write();
        t.by_id.clear();
        t.by_url.clear();
    }
}
