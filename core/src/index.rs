use crate::links::LinkGraph;
use crate::tokenizer::tokenize;
use crate::{DocId, Document};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Postings and TF-IDF weights of one normalized term.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvertedIndexEntry {
    pub term: String,
    /// Posting list, ascending doc ids.
    pub doc_ids: Vec<DocId>,
    pub tfidf_scores: HashMap<DocId, f64>,
}

impl InvertedIndexEntry {
    pub fn new(term: impl Into<String>) -> Self {
        Self { term: term.into(), ..Self::default() }
    }

    pub fn contains(&self, doc_id: DocId) -> bool { self.doc_ids.binary_search(&doc_id).is_ok() }

    pub fn score(&self, doc_id: DocId) -> Option<f64> { self.tfidf_scores.get(&doc_id).copied() }

    /// Union the doc ids of `other` into this entry; its scores win where both have one.
    pub fn merge(&mut self, other: InvertedIndexEntry) {
        self.doc_ids.extend(other.doc_ids);
        self.doc_ids.sort_unstable();
        self.doc_ids.dedup();
        self.tfidf_scores.extend(other.tfidf_scores);
    }

    /// Sort and dedupe postings and drop scores for ids no longer posted.
    /// Returns how many duplicate or orphan records were removed.
    pub fn optimize(&mut self) -> usize {
        let before = self.doc_ids.len() + self.tfidf_scores.len();
        self.doc_ids.sort_unstable();
        self.doc_ids.dedup();
        let posted: HashSet<DocId> = self.doc_ids.iter().copied().collect();
        self.tfidf_scores.retain(|id, _| posted.contains(id));
        before - (self.doc_ids.len() + self.tfidf_scores.len())
    }
}

/// Term count and postings-per-term summary of an index store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IndexStatistics {
    pub total_terms: usize,
    pub total_postings: usize,
    pub average_postings_per_term: f64,
}

impl IndexStatistics {
    pub fn from_entries(entries: &[InvertedIndexEntry]) -> Self {
        let total_terms = entries.len();
        let total_postings: usize = entries.iter().map(|e| e.doc_ids.len()).sum();
        let average_postings_per_term = if total_terms > 0 { total_postings as f64 / total_terms as f64 } else { 0.0 };
        Self { total_terms, total_postings, average_postings_per_term }
    }
}

/// Output of one build pass over a batch of documents.
#[derive(Debug, Clone, Default)]
pub struct BatchIndex {
    /// One entry per term, sorted by term.
    pub entries: Vec<InvertedIndexEntry>,
    pub links: LinkGraph,
    pub total_documents: usize,
}

/// `ln(total / df)`, with a zero document frequency treated as 1.
pub fn idf(total_documents: usize, document_frequency: usize) -> f64 {
    (total_documents as f64 / document_frequency.max(1) as f64).ln()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InvertedIndexBuilder;

impl InvertedIndexBuilder {
    pub fn new() -> Self { Self }

    /// Tokenize a batch, weight every (term, doc) pair by raw count x IDF and extract the link graph.
    /// IDF is relative to this batch: `total_documents` is `docs.len()`, not a corpus-wide count.
    pub fn build<F>(&self, docs: &[Document], resolve: F) -> BatchIndex
    where
        F: Fn(&str) -> Option<DocId>,
    {
        // term -> doc -> raw count
        let mut tf: BTreeMap<String, BTreeMap<DocId, u32>> = BTreeMap::new();
        let mut df: HashMap<String, usize> = HashMap::new();

        for doc in docs {
            let mut seen_in_doc: HashSet<String> = HashSet::new();
            for (term, _pos) in tokenize(&doc.content) {
                *tf.entry(term.clone()).or_default().entry(doc.id).or_insert(0) += 1;
                if seen_in_doc.insert(term.clone()) {
                    *df.entry(term).or_insert(0) += 1;
                }
            }
        }

        let total_documents = docs.len();
        let entries = tf
            .into_iter()
            .map(|(term, counts)| {
                let term_idf = idf(total_documents, df.get(&term).copied().unwrap_or(1));
                let doc_ids = counts.keys().copied().collect();
                let tfidf_scores = counts.into_iter().map(|(id, raw)| (id, raw as f64 * term_idf)).collect();
                InvertedIndexEntry { term, doc_ids, tfidf_scores }
            })
            .collect::<Vec<_>>();

        let links = LinkGraph::from_documents(docs, resolve);
        tracing::debug!(total_documents, terms = entries.len(), edges = links.edge_count(), "batch indexed");
        BatchIndex { entries, links, total_documents }
    }
}
