//! N-gram candidate index used to prune fuzzy matching.

use crate::error::{Result, SearchError};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Boundary marker padded around each word before slicing n-grams.
pub const BOUNDARY: char = '$';

#[derive(Debug)]
pub struct NGramIndexer {
    n: usize,
    grams: HashMap<String, HashSet<String>>,
}

impl NGramIndexer {
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(SearchError::invalid_input("n-gram size must be positive"));
        }
        Ok(Self { n, grams: HashMap::new() })
    }

    pub fn n(&self) -> usize { self.n }

    pub fn gram_count(&self) -> usize { self.grams.len() }

    pub fn index_word(&mut self, word: &str) {
        for gram in self.ngrams(word) {
            self.grams.entry(gram).or_default().insert(word.to_string());
        }
    }

    /// Every indexed word sharing at least one n-gram with `query`, in sorted order.
    pub fn candidates(&self, query: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        if query.is_empty() { return out; }
        for gram in self.ngrams(query) {
            if let Some(words) = self.grams.get(&gram) {
                out.extend(words.iter().cloned());
            }
        }
        out
    }

    /// Whether n-gram candidates alone are guaranteed to contain every word within
    /// `max_distance` of `query`. A padded word of `k` chars yields `k + 3 - n` grams and one
    /// edit destroys at most `n` of them.
    pub fn covers(&self, query: &str, max_distance: usize) -> bool {
        let grams = (query.chars().count() + 3).saturating_sub(self.n);
        grams > self.n * max_distance
    }

    /// Distinct n-grams of `$word$`. Words shorter than `n - 2` yield the padded word itself.
    pub fn ngrams(&self, word: &str) -> HashSet<String> {
        let padded: Vec<char> = std::iter::once(BOUNDARY).chain(word.chars()).chain(std::iter::once(BOUNDARY)).collect();
        if padded.len() <= self.n {
            return std::iter::once(padded.into_iter().collect()).collect();
        }
        padded.windows(self.n).map(|w| w.iter().collect()).collect()
    }

    pub fn clear(&mut self) { self.grams.clear(); }
}
