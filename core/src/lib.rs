//! Ranked full-text search core: TF-IDF + PageRank indexing, boolean-AND retrieval with
//! caching, and a trie/bloom/skip-list/n-gram facade for suggestions and fuzzy matching.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub mod bloom;
pub mod cache;
pub mod config;
pub mod distance;
pub mod error;
pub mod facade;
pub mod index;
pub mod links;
pub mod ngram;
pub mod pagerank;
pub mod persist;
pub mod query;
pub mod query_parser;
pub mod service;
pub mod skiplist;
pub mod store;
pub mod suggest;
pub mod tokenizer;
pub mod trie;

pub use config::EngineConfig;
pub use error::{Result, SearchError};
pub use facade::{FuzzyMatch, SearchFacade};
pub use index::{IndexStatistics, InvertedIndexBuilder, InvertedIndexEntry};
pub use query::{DocumentSummary, QueryEngine, SearchResponse};
pub use query_parser::{Operator, ParsedQuery};
pub use service::{BuildReport, SearchService};
pub use store::{DocumentStore, IndexStore, MemoryDocumentStore, MemoryIndexStore};

pub type DocId = u32;

/// A crawled document. Content is immutable once ingested; only `page_rank_score`
/// is rewritten, by the PageRank pass of each index build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub url: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub page_rank_score: f64,
}

impl Document {
    pub fn new(id: DocId, url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
            page_rank_score: 0.0,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// True when every requested tag is on this document.
    pub fn has_tags(&self, wanted: &[String]) -> bool {
        wanted.iter().all(|t| self.tags.contains(t))
    }
}
