//! Autocomplete and fuzzy matching over the indexed vocabulary.
//!
//! The trie, the n-gram index and the bloom filter live behind one lock, so a reader
//! never sees a word in one of them but not the others. Skip-list postings and the
//! fuzzy result cache each have their own.

use crate::bloom::BloomFilter;
use crate::cache::LruCache;
use crate::config::FacadeConfig;
use crate::distance::within_distance;
use crate::error::Result;
use crate::ngram::NGramIndexer;
use crate::skiplist::SkipList;
use crate::tokenizer::normalize;
use crate::trie::Trie;
use crate::DocId;
use parking_lot::RwLock;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyMatch {
    pub word: String,
    pub distance: usize,
    pub frequency: u32,
}

struct Lexicon {
    trie: Trie,
    ngrams: NGramIndexer,
    bloom: BloomFilter,
}

impl Lexicon {
    /// `word` must already be normalized and non-empty.
    fn insert(&mut self, word: &str) -> u32 {
        let freq = self.trie.insert(word);
        if freq == 1 {
            self.ngrams.index_word(word);
        }
        self.bloom.add(word);
        freq
    }
}

pub struct SearchFacade {
    lexicon: RwLock<Lexicon>,
    postings: RwLock<HashMap<String, SkipList<()>>>,
    /// "max_distance:query" -> ranked matches.
    cache: LruCache<String, Vec<FuzzyMatch>>,
    pool: ThreadPool,
    parallel_threshold: usize,
}

impl SearchFacade {
    pub fn new(cfg: &FacadeConfig) -> Result<Self> {
        let lexicon = Lexicon {
            trie: Trie::new(),
            ngrams: NGramIndexer::new(cfg.ngram_size)?,
            bloom: BloomFilter::new(cfg.bloom_bits, &cfg.bloom_seeds)?,
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(cfg.worker_threads())
            .thread_name(|i| format!("fuzzy-worker-{i}"))
            .build()?;
        tracing::debug!(threads = pool.current_num_threads(), ngram = cfg.ngram_size, "search facade ready");
        Ok(Self {
            lexicon: RwLock::new(lexicon),
            postings: RwLock::new(HashMap::new()),
            cache: LruCache::from_config(&cfg.fuzzy_cache)?,
            pool,
            parallel_threshold: cfg.parallel_threshold,
        })
    }

    /// Called after every vocabulary change. Clearing bumps the cache epoch, so a fuzzy
    /// result computed against the old vocabulary can no longer be stored.
    fn touched(&self) { self.cache.clear() }

    /// Insert a word and return its frequency. Empty input is ignored and returns 0.
    pub fn insert(&self, word: &str) -> u32 {
        let word = normalize(word);
        if word.is_empty() { return 0; }
        let freq = self.lexicon.write().insert(&word);
        self.touched();
        freq
    }

    /// Insert `word` and record `doc_id` in both its trie postings and its skip-list postings.
    pub fn insert_for_document(&self, word: &str, doc_id: DocId) {
        self.index_terms([(word, doc_id)]);
    }

    /// Bulk form of [`insert_for_document`](Self::insert_for_document) taking the lexicon lock once.
    /// Returns how many non-empty words were inserted.
    pub fn index_terms<'a, I>(&self, terms: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, DocId)>,
    {
        let terms: Vec<(String, DocId)> =
            terms.into_iter().map(|(w, id)| (normalize(w), id)).filter(|(w, _)| !w.is_empty()).collect();
        if terms.is_empty() { return 0; }
        {
            let mut lex = self.lexicon.write();
            for (word, doc_id) in &terms {
                lex.insert(word);
                lex.trie.add_posting(word, *doc_id);
            }
        }
        {
            let mut postings = self.postings.write();
            for (word, doc_id) in &terms {
                postings.entry(word.clone()).or_default().insert(*doc_id, ());
            }
        }
        self.touched();
        terms.len()
    }

    /// Exact lookup. The bloom filter answers definite misses without touching the trie.
    pub fn search(&self, word: &str) -> bool {
        let word = normalize(word);
        if word.is_empty() { return false; }
        let lex = self.lexicon.read();
        lex.bloom.might_contain(&word) && lex.trie.contains(&word)
    }

    pub fn search_with_prefix(&self, prefix: &str) -> Vec<String> { self.lexicon.read().trie.words_with_prefix(prefix) }

    pub fn top_searches(&self, prefix: &str) -> Vec<String> { self.lexicon.read().trie.top_searches(prefix) }

    pub fn frequency(&self, word: &str) -> u32 { self.lexicon.read().trie.frequency(word).unwrap_or(0) }

    /// False means definitely never inserted.
    pub fn might_contain(&self, word: &str) -> bool {
        let word = normalize(word);
        !word.is_empty() && self.lexicon.read().bloom.might_contain(&word)
    }

    /// Every inserted word within `max_distance` edits of `query`, by frequency descending,
    /// then distance ascending, then word.
    pub fn fuzzy_search(&self, query: &str, max_distance: usize) -> Vec<FuzzyMatch> {
        let query = normalize(query);
        if query.is_empty() { return Vec::new(); }
        let key = format!("{max_distance}:{query}");
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }
        let epoch = self.cache.epoch();

        let candidates = {
            let lex = self.lexicon.read();
            if lex.ngrams.covers(&query, max_distance) {
                lex.ngrams
                    .candidates(&query)
                    .into_iter()
                    .map(|w| {
                        let f = lex.trie.frequency(&w).unwrap_or(0);
                        (w, f)
                    })
                    .collect::<Vec<_>>()
            } else if lex.trie.len() < self.parallel_threshold {
                // short query with a wide radius; scan in place
                let mut hits: Vec<FuzzyMatch> = lex
                    .trie
                    .fuzzy_scan(&query, max_distance)
                    .into_iter()
                    .map(|h| FuzzyMatch { word: h.word, distance: h.distance, frequency: h.frequency })
                    .collect();
                drop(lex);
                rank(&mut hits);
                return self.remember(key, epoch, hits);
            } else {
                lex.trie.words()
            }
        };

        let mut hits = self.score(&candidates, |word| within_distance(&query, word, max_distance));
        rank(&mut hits);
        tracing::debug!(query = %query, max_distance, candidates = candidates.len(), hits = hits.len(), "fuzzy search");
        self.remember(key, epoch, hits)
    }

    /// Run `distance` over every candidate, on the pool once there are enough of them.
    /// A candidate whose scoring panics is logged and left out.
    fn score<F>(&self, candidates: &[(String, u32)], distance: F) -> Vec<FuzzyMatch>
    where
        F: Fn(&str) -> Option<usize> + Sync,
    {
        let score_one = |(word, frequency): &(String, u32)| -> Option<FuzzyMatch> {
            match catch_unwind(AssertUnwindSafe(|| distance(word))) {
                Ok(d) => d.map(|distance| FuzzyMatch { word: word.clone(), distance, frequency: *frequency }),
                Err(_) => {
                    tracing::error!(candidate = %word, "fuzzy scoring task panicked; candidate dropped");
                    None
                }
            }
        };
        if candidates.len() < self.parallel_threshold {
            candidates.iter().filter_map(score_one).collect()
        } else {
            self.pool.install(|| candidates.par_iter().filter_map(score_one).collect())
        }
    }

    fn remember(&self, key: String, epoch: u64, hits: Vec<FuzzyMatch>) -> Vec<FuzzyMatch> {
        if !self.cache.put_if_current(key, hits.clone(), epoch) {
            tracing::debug!("vocabulary changed during fuzzy search; result not cached");
        }
        hits
    }

    /// Add `doc_id` to the skip-list postings of `word`. False if it was already there.
    pub fn add_document(&self, word: &str, doc_id: DocId) -> bool {
        let word = normalize(word);
        if word.is_empty() { return false; }
        self.postings.write().entry(word).or_default().insert(doc_id, ()).is_none()
    }

    pub fn remove_document(&self, word: &str, doc_id: DocId) -> bool {
        let word = normalize(word);
        let mut postings = self.postings.write();
        let Some(list) = postings.get_mut(&word) else { return false };
        let removed = list.delete(doc_id);
        if list.is_empty() {
            postings.remove(&word);
        }
        removed
    }

    /// Skip-list postings of `word`, ascending.
    pub fn posting_list(&self, word: &str) -> Vec<DocId> {
        self.postings.read().get(&normalize(word)).map(SkipList::keys).unwrap_or_default()
    }

    /// Postings recorded on the word's trie node.
    pub fn trie_posting_list(&self, word: &str) -> Vec<DocId> {
        self.lexicon.read().trie.posting_list(word).unwrap_or_default()
    }

    /// Distinct words known.
    pub fn len(&self) -> usize { self.lexicon.read().trie.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn bloom_fill_ratio(&self) -> f64 { self.lexicon.read().bloom.fill_ratio() }

    pub fn cached_queries(&self) -> usize { self.cache.len() }

    pub fn clear(&self) {
        {
            let mut lex = self.lexicon.write();
            lex.trie.clear();
            lex.ngrams.clear();
            lex.bloom.clear();
        }
        self.postings.write().clear();
        self.touched();
    }

    pub fn shutdown(&self) { self.cache.shutdown() }
}

fn rank(hits: &mut [FuzzyMatch]) {
    hits.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.distance.cmp(&b.distance)));
}
