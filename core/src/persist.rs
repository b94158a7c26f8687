use crate::error::{Result, SearchError};
use crate::index::InvertedIndexEntry;
use crate::store::{DocumentStore, IndexStore, MemoryDocumentStore, MemoryIndexStore};
use crate::Document;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: usize,
    pub num_terms: usize,
    pub created_at: String,
    pub version: u32,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn entries(&self) -> PathBuf { self.root.join("index.bin") }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

fn write_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut f = File::create(path)?;
    let bytes = bincode::serialize(value)?;
    f.write_all(&bytes)?;
    Ok(())
}

fn read_bin<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(bincode::deserialize(&buf)?)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Dump both stores under `paths.root`: entries and documents as bincode, a JSON header beside them.
pub fn save_snapshot(paths: &IndexPaths, index: &dyn IndexStore, docs: &dyn DocumentStore) -> Result<MetaFile> {
    create_dir_all(&paths.root)?;
    let entries = index.find_all();
    let documents = docs.find_all();
    write_bin(&paths.entries(), &entries)?;
    write_bin(&paths.docs(), &documents)?;
    let meta = MetaFile {
        num_docs: documents.len(),
        num_terms: entries.len(),
        created_at: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        version: SNAPSHOT_VERSION,
    };
    save_meta(paths, &meta)?;
    tracing::info!(root = %paths.root.display(), docs = meta.num_docs, terms = meta.num_terms, "snapshot written");
    Ok(meta)
}

/// Read a snapshot back into fresh in-memory stores.
pub fn load_snapshot(paths: &IndexPaths) -> Result<(MemoryIndexStore, MemoryDocumentStore, MetaFile)> {
    let meta = load_meta(paths)?;
    if meta.version != SNAPSHOT_VERSION {
        return Err(SearchError::invalid_input(format!(
            "snapshot version {} is not supported (expected {SNAPSHOT_VERSION})",
            meta.version
        )));
    }
    let entries: Vec<InvertedIndexEntry> = read_bin(&paths.entries())?;
    let documents: Vec<Document> = read_bin(&paths.docs())?;
    tracing::debug!(docs = documents.len(), terms = entries.len(), "snapshot loaded");
    Ok((MemoryIndexStore::from_entries(entries), MemoryDocumentStore::from_documents(documents), meta))
}
