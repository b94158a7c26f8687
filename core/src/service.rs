//! The engine as collaborators see it: index building, ranked queries, suggestions and
//! admin operations over one pair of stores.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::facade::{FuzzyMatch, SearchFacade};
use crate::index::{IndexStatistics, InvertedIndexBuilder};
use crate::pagerank::PageRank;
use crate::query::{QueryEngine, SearchResponse};
use crate::query_parser::{self, ParsedQuery};
use crate::store::{DocumentStore, IndexStore, MemoryDocumentStore, MemoryIndexStore};
use crate::suggest::NGramModel;
use crate::tokenizer::normalize;
use crate::trie::Trie;
use crate::{DocId, Document};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Weight of a past query relative to a plain vocabulary match when ranking suggestions.
const HISTORY_WEIGHT: u64 = 5;
/// Word order of the next-word model trained on cached queries.
const SUGGESTION_NGRAM: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    pub documents: usize,
    pub terms: usize,
    pub links: usize,
    pub pagerank_iterations: usize,
    pub pagerank_converged: bool,
    pub elapsed_ms: u64,
}

#[derive(Default)]
struct QueryLog {
    per_user: HashMap<String, Vec<String>>,
    counts: HashMap<String, u64>,
}

pub struct SearchService {
    config: EngineConfig,
    index: Arc<dyn IndexStore>,
    docs: Arc<dyn DocumentStore>,
    builder: InvertedIndexBuilder,
    pagerank: PageRank,
    query: QueryEngine,
    facade: SearchFacade,
    log: RwLock<QueryLog>,
}

impl SearchService {
    /// Service over fresh in-memory stores.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_stores(config, Arc::new(MemoryIndexStore::new()), Arc::new(MemoryDocumentStore::new()))
    }

    /// Service over existing stores. The facade is warmed from whatever the index store already holds.
    pub fn with_stores(config: EngineConfig, index: Arc<dyn IndexStore>, docs: Arc<dyn DocumentStore>) -> Result<Self> {
        config.validate()?;
        let facade = SearchFacade::new(&config.facade)?;
        let query = QueryEngine::new(Arc::clone(&index), Arc::clone(&docs), &config.query_cache, config.query.clone())?;
        let svc = Self {
            pagerank: PageRank::new(&config.pagerank),
            builder: InvertedIndexBuilder::new(),
            config,
            index,
            docs,
            query,
            facade,
            log: RwLock::new(QueryLog::default()),
        };
        let warmed = svc.warm_facade();
        if warmed > 0 {
            tracing::info!(postings = warmed, words = svc.facade.len(), "facade warmed from index store");
        }
        Ok(svc)
    }

    fn warm_facade(&self) -> usize {
        let entries = self.index.find_all();
        self.facade.index_terms(entries.iter().flat_map(|e| e.doc_ids.iter().map(move |&id| (e.term.as_str(), id))))
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn facade(&self) -> &SearchFacade { &self.facade }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> { &self.docs }

    pub fn index_store(&self) -> &Arc<dyn IndexStore> { &self.index }

    /// Index a batch: store the documents, merge their TF-IDF entries into the index store,
    /// feed every term into the facade, then run PageRank over the batch's links and write the
    /// scores back onto the documents. Cached query rankings are dropped afterwards.
    pub fn build_index(&self, documents: Vec<Document>) -> BuildReport {
        if documents.is_empty() {
            return BuildReport { pagerank_converged: true, ..BuildReport::default() };
        }
        let started = Instant::now();
        for doc in &documents {
            self.docs.save(doc.clone());
        }

        let batch = self.builder.build(&documents, |url| self.resolve_url(url));
        let terms = batch.entries.len();
        let mut facade_terms: Vec<(&str, DocId)> = Vec::new();
        for entry in &batch.entries {
            facade_terms.extend(entry.doc_ids.iter().map(|&id| (entry.term.as_str(), id)));
        }
        self.facade.index_terms(facade_terms);

        for entry in batch.entries {
            let merged = match self.index.find_by_word(&entry.term) {
                Some(mut existing) => {
                    existing.merge(entry);
                    existing
                }
                None => entry,
            };
            self.index.save(merged);
        }

        let ranks = self.pagerank.compute(&batch.links);
        for (&id, &score) in &ranks.scores {
            if let Some(mut doc) = self.docs.get(id) {
                doc.page_rank_score = score;
                self.docs.save(doc);
            }
        }
        self.query.invalidate();

        let report = BuildReport {
            documents: batch.total_documents,
            terms,
            links: batch.links.edge_count(),
            pagerank_iterations: ranks.iterations,
            pagerank_converged: ranks.converged,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        if !report.pagerank_converged {
            tracing::warn!(iterations = report.pagerank_iterations, "pagerank hit the iteration cap");
        }
        tracing::info!(documents = report.documents, terms, links = report.links, elapsed_ms = report.elapsed_ms, "index build complete");
        report
    }

    /// Known document for an extracted link. `http://a.test` and `http://a.test/` are the same page.
    fn resolve_url(&self, url: &str) -> Option<DocId> {
        self.docs
            .find_by_url(url)
            .or_else(|| self.docs.find_by_url(url.trim_end_matches('/')))
            .map(|d| d.id)
    }

    pub fn process_query(&self, query: &str, top_k: usize) -> Vec<DocId> { self.query.process_query(query, top_k) }

    pub fn process_query_page(&self, query: &str, top_k: usize, page: usize, size: usize) -> Result<SearchResponse> {
        self.query.process_query_page(query, top_k, page, size)
    }

    pub fn process_query_with_tags(&self, query: &str, tags: &[String], top_k: usize) -> Vec<DocId> {
        self.query.process_query_with_tags(query, tags, top_k)
    }

    pub fn process_query_with_tags_page(&self, query: &str, tags: &[String], top_k: usize, page: usize, size: usize) -> Result<SearchResponse> {
        self.query.process_query_with_tags_page(query, tags, top_k, page, size)
    }

    pub fn process_multiple_query(&self, queries: &[String], top_k: usize, page: usize, size: usize) -> Result<SearchResponse> {
        self.query.process_multiple_query(queries, top_k, page, size)
    }

    pub fn process_query_with_corrections(&self, query: &str, top_k: usize, page: usize, size: usize) -> Result<SearchResponse> {
        self.query.process_query_with_corrections(query, top_k, page, size)
    }

    pub fn fuzzy_search(&self, query: &str, max_distance: usize) -> Vec<FuzzyMatch> { self.facade.fuzzy_search(query, max_distance) }

    pub fn parse_query(&self, query: &str) -> ParsedQuery { query_parser::parse(query) }

    /// Record a query for suggestion ranking. Nothing else reads the log.
    pub fn log_user_query(&self, user_id: &str, query: &str) {
        let query = normalize(query.trim());
        if query.is_empty() { return; }
        let mut log = self.log.write();
        *log.counts.entry(query.clone()).or_insert(0) += 1;
        log.per_user.entry(user_id.to_string()).or_default().push(query);
    }

    /// Vocabulary words starting with `prefix`, ranked by how often each was logged as a
    /// query (x5) plus its indexed frequency.
    pub fn get_suggestions(&self, prefix: &str) -> Vec<String> {
        let log = self.log.read();
        let scored = self
            .facade
            .search_with_prefix(prefix)
            .into_iter()
            .map(|w| {
                let logged = log.counts.get(&w).copied().unwrap_or(0);
                let score = HISTORY_WEIGHT * logged + u64::from(self.facade.frequency(&w));
                (w, score)
            })
            .collect();
        top(scored, self.config.query.suggestion_limit)
    }

    /// Words that followed the last word of `prefix` in cached queries, most frequent first.
    pub fn suggestions_ngram(&self, prefix: &str) -> Vec<String> {
        self.next_words(prefix).into_iter().map(|(w, _)| w).collect()
    }

    /// Cached query strings starting with `prefix`, in lexicographic order.
    pub fn suggestions_trie(&self, prefix: &str) -> Vec<String> {
        let mut trie = Trie::new();
        for query in self.query.cached_queries() {
            trie.insert(query.trim());
        }
        trie.words_with_prefix(prefix.trim())
    }

    fn next_words(&self, prefix: &str) -> Vec<(String, u32)> {
        match NGramModel::new(SUGGESTION_NGRAM) {
            Ok(mut model) => {
                model.train(self.query.cached_queries());
                model.suggestions(prefix)
            }
            Err(e) => {
                tracing::warn!(error = %e, "next-word model unavailable");
                Vec::new()
            }
        }
    }

    /// Suggestions biased by one user's history: each past query starting with `prefix` adds 5,
    /// each cached-query continuation of `prefix` adds 1 and each vocabulary word starting
    /// with it adds 1.
    pub fn get_user_suggestions(&self, user_id: &str, prefix: &str) -> Vec<String> {
        let prefix = normalize(prefix.trim());
        if prefix.is_empty() { return Vec::new(); }
        let mut scores: HashMap<String, u64> = HashMap::new();
        if let Some(history) = self.log.read().per_user.get(user_id) {
            for past in history.iter().filter(|q| q.starts_with(&prefix)) {
                *scores.entry(past.clone()).or_insert(0) += HISTORY_WEIGHT;
            }
        }
        for (next, _) in self.next_words(&prefix) {
            *scores.entry(format!("{prefix} {next}")).or_insert(0) += 1;
        }
        for word in self.facade.search_with_prefix(&prefix) {
            *scores.entry(word).or_insert(0) += 1;
        }
        top(scores.into_iter().collect(), self.config.query.suggestion_limit)
    }

    /// Drop the index and rebuild it from every stored document.
    pub fn reindex_all(&self) -> BuildReport {
        self.clear_index();
        let docs = self.docs.find_all();
        tracing::info!(documents = docs.len(), "reindexing");
        self.build_index(docs)
    }

    /// Dedupe postings and drop orphan scores. Returns the number of records removed.
    pub fn optimize_index(&self) -> usize {
        let mut removed = 0;
        for mut entry in self.index.find_all() {
            let n = entry.optimize();
            if n > 0 {
                removed += n;
                self.index.save(entry);
            }
        }
        if removed > 0 {
            self.query.invalidate();
        }
        tracing::info!(removed, "index optimized");
        removed
    }

    /// Delete every index entry and the facade vocabulary. Documents are kept.
    pub fn clear_index(&self) {
        self.index.delete_all();
        self.facade.clear();
        self.query.invalidate();
        tracing::info!("index cleared");
    }

    pub fn index_statistics(&self) -> IndexStatistics { IndexStatistics::from_entries(&self.index.find_all()) }

    pub fn query_count(&self) -> u64 { self.query.query_count() }

    pub fn cache_hit_rate(&self) -> f64 { self.query.cache_hit_rate() }

    /// Stop the background cache sweepers.
    pub fn shutdown(&self) {
        self.query.shutdown();
        self.facade.shutdown();
    }
}

fn top(mut scored: Vec<(String, u64)>, limit: usize) -> Vec<String> {
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.into_iter().take(limit).map(|(w, _)| w).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    fn config() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.query_cache = CacheConfig { sweep_interval_secs: None, ..CacheConfig::default() };
        cfg
    }

    fn corpus() -> Vec<Document> {
        vec![
            Document::new(1, "http://a.test", "Cats", r#"cat dog <a href="http://b.test/">b</a>"#),
            Document::new(2, "http://b.test", "Dogs", r#"dog dog <a href="http://a.test">a</a>"#),
            Document::new(3, "http://c.test", "Cars", "car catalog cat"),
        ]
    }

    #[test]
    fn build_then_query() {
        let svc = SearchService::new(config()).unwrap();
        let report = svc.build_index(corpus());
        assert_eq!(report.documents, 3);
        assert_eq!(report.links, 2);
        assert!(report.pagerank_converged);

        let hits = svc.process_query("cat", 10);
        assert_eq!(hits.len(), 2);
        assert!(hits.contains(&1) && hits.contains(&3));
        assert_eq!(svc.process_query("cat dog", 10), vec![1]);

        // the two linked pages outrank the unlinked one
        let a = svc.documents().get(1).unwrap().page_rank_score;
        let c = svc.documents().get(3).unwrap().page_rank_score;
        assert!(a > c);
    }

    #[test]
    fn build_feeds_the_facade() {
        let svc = SearchService::new(config()).unwrap();
        svc.build_index(corpus());
        assert!(svc.facade().search("catalog"));
        assert_eq!(svc.facade().posting_list("dog"), vec![1, 2]);
        assert_eq!(svc.facade().trie_posting_list("cat"), vec![1, 3]);
        let fuzzy: Vec<String> = svc.fuzzy_search("dgo", 2).into_iter().map(|m| m.word).collect();
        assert!(fuzzy.contains(&"dog".to_string()));
    }

    #[test]
    fn new_batches_merge_into_existing_entries() {
        let svc = SearchService::new(config()).unwrap();
        svc.build_index(corpus());
        assert_eq!(svc.process_query("cat", 10).len(), 2);
        svc.build_index(vec![Document::new(4, "http://d.test", "More", "cat")]);
        let entry = svc.index_store().find_by_word("cat").unwrap();
        assert_eq!(entry.doc_ids, vec![1, 3, 4]);
        assert_eq!(svc.process_query("cat", 10).len(), 3);
    }

    #[test]
    fn suggestions_weight_history() {
        let svc = SearchService::new(config()).unwrap();
        svc.build_index(corpus());
        assert_eq!(svc.get_suggestions("ca"), vec!["cat", "car", "catalog"]);

        svc.log_user_query("u1", "Catalog");
        assert_eq!(svc.get_suggestions("ca")[0], "catalog");

        svc.log_user_query("u1", "cat videos");
        let user = svc.get_user_suggestions("u1", "cat");
        // history entries score 5 or 6, plain vocabulary matches score 1
        assert_eq!(user, vec!["catalog", "cat videos", "cat"]);
        assert_eq!(svc.get_user_suggestions("someone-else", "cat"), vec!["cat", "catalog"]);
        assert!(svc.get_user_suggestions("u1", "").is_empty());
    }

    #[test]
    fn cached_queries_drive_next_word_suggestions() {
        let svc = SearchService::new(config()).unwrap();
        svc.build_index(corpus());
        assert!(svc.suggestions_ngram("cat").is_empty());
        svc.process_query("cat dog", 10);
        svc.process_query("cat catalog", 10);
        svc.process_query("car", 10);
        // "cat catalog" matches doc 3 only; "dog cat" matches doc 1
        svc.process_query("dog cat", 10);

        assert_eq!(svc.suggestions_ngram("cat"), vec!["catalog", "dog"]);
        assert_eq!(svc.suggestions_ngram("the Dog"), vec!["cat"]);
        assert_eq!(svc.suggestions_trie("ca"), vec!["car", "cat catalog", "cat dog"]);
        assert_eq!(svc.suggestions_trie("cat d"), vec!["cat dog"]);
        assert!(svc.suggestions_trie("x").is_empty());

        svc.log_user_query("u1", "cat dog");
        // "cat dog": history 5 + continuation 1; "cat catalog": continuation 1
        assert_eq!(svc.get_user_suggestions("u1", "cat"), vec!["cat dog", "cat", "cat catalog", "catalog"]);
    }

    #[test]
    fn parses_query_structure() {
        let svc = SearchService::new(config()).unwrap();
        let parsed = svc.parse_query(r#""red fox" AND jump* NOT lazy"#);
        assert_eq!(parsed.phrases, vec!["red fox"]);
        assert_eq!(parsed.wildcards, vec!["jump*"]);
        assert_eq!(parsed.tokens, vec!["lazy"]);
        assert_eq!(parsed.operators.len(), 2);
    }

    #[test]
    fn admin_operations() {
        let svc = SearchService::new(config()).unwrap();
        svc.build_index(corpus());
        let stats = svc.index_statistics();
        assert_eq!(stats.total_terms, svc.index_store().count());
        assert!(stats.average_postings_per_term >= 1.0);
        assert_eq!(svc.optimize_index(), 0);

        svc.clear_index();
        assert_eq!(svc.index_statistics().total_terms, 0);
        assert!(svc.process_query("cat", 10).is_empty());
        assert!(!svc.facade().search("cat"));
        assert_eq!(svc.documents().find_all().len(), 3);

        let report = svc.reindex_all();
        assert_eq!(report.documents, 3);
        assert_eq!(svc.process_query("cat", 10).len(), 2);
    }

    #[test]
    fn warm_start_from_existing_stores() {
        let index: Arc<dyn IndexStore> = Arc::new(MemoryIndexStore::new());
        let docs: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let first = SearchService::with_stores(config(), Arc::clone(&index), Arc::clone(&docs)).unwrap();
        first.build_index(corpus());
        first.shutdown();

        let second = SearchService::with_stores(config(), index, docs).unwrap();
        assert!(second.facade().search("catalog"));
        assert_eq!(second.process_query("cat dog", 10), vec![1]);
    }

    #[test]
    fn counters_track_queries() {
        let svc = SearchService::new(config()).unwrap();
        svc.build_index(corpus());
        svc.process_query("cat", 10);
        svc.process_query("cat", 10);
        assert_eq!(svc.query_count(), 2);
        assert!((svc.cache_hit_rate() - 0.5).abs() < 1e-12);
    }
}
