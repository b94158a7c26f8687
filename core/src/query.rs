use crate::cache::LruCache;
use crate::config::{CacheConfig, QueryConfig};
use crate::distance::levenshtein;
use crate::error::{Result, SearchError};
use crate::store::{DocumentStore, IndexStore};
use crate::tokenizer::{normalize, terms};
use crate::{DocId, Document};
use serde::Serialize;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hydrated result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub doc_id: DocId,
    pub title: String,
    pub url: String,
    pub short_content: String,
}

/// One page of ranked results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub documents: Vec<DocumentSummary>,
    pub total_results: usize,
    pub total_pages: usize,
    pub current_page: usize,
    pub page_size: usize,
}

/// Boolean-AND retrieval with positional + PageRank scoring and a query-string cache.
pub struct QueryEngine {
    index: Arc<dyn IndexStore>,
    docs: Arc<dyn DocumentStore>,
    /// Raw query -> full ranking. Truncation to top-k happens on the way out.
    cache: LruCache<String, Vec<DocId>>,
    cfg: QueryConfig,
    query_count: AtomicU64,
    cache_hits: AtomicU64,
}

impl QueryEngine {
    pub fn new(index: Arc<dyn IndexStore>, docs: Arc<dyn DocumentStore>, cache_cfg: &CacheConfig, cfg: QueryConfig) -> Result<Self> {
        Ok(Self {
            index,
            docs,
            cache: LruCache::from_config(cache_cfg)?,
            cfg,
            query_count: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        })
    }

    /// Top `top_k` doc ids for `query`, best first.
    pub fn process_query(&self, query: &str, top_k: usize) -> Vec<DocId> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        if query.trim().is_empty() { return Vec::new(); }

        if let Some(mut hit) = self.cache.get(&query.to_string()) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(query, "query cache hit");
            hit.truncate(top_k);
            return hit;
        }

        // read before ranking so an invalidation during `rank` keeps the result out of the cache
        let epoch = self.cache.epoch();
        let ranked: Vec<DocId> = self.rank(query).into_iter().map(|(id, _)| id).collect();
        let mut ranked = self.remember(query, epoch, ranked);
        ranked.truncate(top_k);
        ranked
    }

    fn remember(&self, query: &str, epoch: u64, ranked: Vec<DocId>) -> Vec<DocId> {
        if !ranked.is_empty() && !self.cache.put_if_current(query.to_string(), ranked.clone(), epoch) {
            tracing::debug!(query, "index changed while ranking; result not cached");
        }
        ranked
    }

    /// Every document containing all query terms, scored and sorted descending.
    /// Equal scores keep ascending doc id order.
    pub fn rank(&self, query: &str) -> Vec<(DocId, f64)> {
        let query_terms = unique_terms(query);
        if query_terms.is_empty() { return Vec::new(); }

        let mut survivors: Option<BTreeSet<DocId>> = None;
        for term in &query_terms {
            let Some(entry) = self.index.find_by_word(term) else {
                tracing::debug!(term, "no postings; empty intersection");
                return Vec::new();
            };
            let ids: BTreeSet<DocId> = entry.doc_ids.into_iter().collect();
            survivors = Some(match survivors {
                None => ids,
                Some(acc) => acc.intersection(&ids).copied().collect(),
            });
        }

        let mut scored: Vec<(DocId, f64)> = survivors
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.docs.get(id).map(|doc| (id, composite_score(&doc, &query_terms))))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(CmpOrdering::Equal));
        scored
    }

    /// `page` of `size` results (1-indexed) out of the top `top_k`.
    pub fn process_query_page(&self, query: &str, top_k: usize, page: usize, size: usize) -> Result<SearchResponse> {
        check_page(page, size)?;
        let ranked = self.process_query(query, top_k);
        Ok(self.paginate(&ranked, &unique_terms(query), page, size))
    }

    /// Ranked ids restricted to documents carrying every tag in `tags`.
    pub fn process_query_with_tags(&self, query: &str, tags: &[String], top_k: usize) -> Vec<DocId> {
        let ranked = self.process_query(query, top_k);
        if tags.is_empty() { return ranked; }
        ranked.into_iter().filter(|&id| self.docs.get(id).is_some_and(|d| d.has_tags(tags))).collect()
    }

    /// Tag-filtered form of [`process_query_page`](Self::process_query_page).
    pub fn process_query_with_tags_page(&self, query: &str, tags: &[String], top_k: usize, page: usize, size: usize) -> Result<SearchResponse> {
        check_page(page, size)?;
        let ranked = self.process_query_with_tags(query, tags, top_k);
        Ok(self.paginate(&ranked, &unique_terms(query), page, size))
    }

    /// Run several queries, each contributing `max(1, top_k / n)` ids, merge without duplicates and paginate.
    pub fn process_multiple_query(&self, queries: &[String], top_k: usize, page: usize, size: usize) -> Result<SearchResponse> {
        check_page(page, size)?;
        if queries.is_empty() {
            return Ok(self.paginate(&[], &[], page, size));
        }
        let per_query = (top_k / queries.len()).max(1);
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        let mut all_terms = Vec::new();
        for q in queries {
            for id in self.process_query(q, per_query) {
                if seen.insert(id) {
                    merged.push(id);
                }
            }
            all_terms.extend(unique_terms(q));
        }
        Ok(self.paginate(&merged, &all_terms, page, size))
    }

    /// Like [`process_query_page`](Self::process_query_page), but a query with no hits is
    /// retried through the closest previously cached queries.
    pub fn process_query_with_corrections(&self, query: &str, top_k: usize, page: usize, size: usize) -> Result<SearchResponse> {
        let direct = self.process_query_page(query, top_k, page, size)?;
        if direct.total_results > 0 { return Ok(direct); }
        let corrections = self.corrections(query, top_k);
        if corrections.is_empty() { return Ok(direct); }
        tracing::info!(query, ?corrections, "retrying with corrected queries");
        self.process_multiple_query(&corrections, top_k, page, size)
    }

    /// Cached queries within `floor(len(query) / 3)` edits of `query`, closest first.
    pub fn corrections(&self, query: &str, limit: usize) -> Vec<String> {
        let max = query.chars().count() / 3;
        let mut close: Vec<(usize, String)> = self
            .cache
            .keys()
            .into_iter()
            .filter(|k| k != query)
            .filter_map(|k| {
                let d = levenshtein(query, &k);
                (d <= max).then_some((d, k))
            })
            .collect();
        close.sort();
        close.into_iter().take(limit).map(|(_, k)| k).collect()
    }

    fn paginate(&self, ranked: &[DocId], query_terms: &[String], page: usize, size: usize) -> SearchResponse {
        let total = ranked.len();
        let start = (page - 1).saturating_mul(size).min(total);
        let end = start.saturating_add(size).min(total);
        let documents = ranked[start..end]
            .iter()
            .filter_map(|&id| self.docs.get(id))
            .map(|doc| DocumentSummary {
                doc_id: doc.id,
                short_content: short_content(&doc.content, query_terms, self.cfg.short_content_len),
                title: doc.title,
                url: doc.url,
            })
            .collect();
        SearchResponse { documents, total_results: total, total_pages: total.div_ceil(size), current_page: page, page_size: size }
    }

    pub fn query_count(&self) -> u64 { self.query_count.load(Ordering::Relaxed) }

    pub fn cache_hits(&self) -> u64 { self.cache_hits.load(Ordering::Relaxed) }

    /// Hits over total queries, 0 before the first query.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.query_count();
        if total == 0 { 0.0 } else { self.cache_hits() as f64 / total as f64 }
    }

    /// Cached query strings, most recently used first.
    pub fn cached_queries(&self) -> Vec<String> { self.cache.keys() }

    /// Drop cached rankings after the index changed.
    pub fn invalidate(&self) { self.cache.clear() }

    pub fn shutdown(&self) { self.cache.shutdown() }
}

fn check_page(page: usize, size: usize) -> Result<()> {
    if page == 0 {
        return Err(SearchError::invalid_input("page is 1-indexed"));
    }
    if size == 0 {
        return Err(SearchError::invalid_input("page size must be positive"));
    }
    Ok(())
}

fn unique_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    terms(query).into_iter().filter(|t| seen.insert(t.clone())).collect()
}

/// Sum over terms of `1 / (1 + first char offset)` in the lowercased content, plus PageRank.
fn composite_score(doc: &Document, query_terms: &[String]) -> f64 {
    let content = normalize(&doc.content);
    let positional: f64 = query_terms
        .iter()
        .filter_map(|t| char_offset(&content, t))
        .map(|idx| 1.0 / (1.0 + idx as f64))
        .sum();
    positional + doc.page_rank_score
}

fn char_offset(haystack: &str, needle: &str) -> Option<usize> {
    haystack.find(needle).map(|byte| haystack[..byte].chars().count())
}

/// `len` chars of content around the first query term, or the head of the content.
fn short_content(content: &str, query_terms: &[String], len: usize) -> String {
    let lowered = normalize(content);
    let first = query_terms.iter().filter_map(|t| char_offset(&lowered, t)).min();
    let start = first.map(|idx| idx.saturating_sub(len / 4)).unwrap_or(0);
    // offsets come from the normalized text; fall back to the head if lengths diverged
    let start = if lowered.chars().count() == content.chars().count() { start } else { 0 };
    content.chars().skip(start).take(len).collect()
}
