//! Arena-backed prefix tree.
//!
//! Every node is owned by the arena and reached only through its parent's child map,
//! so dropping the trie drops every node. Children are kept in a `BTreeMap` which makes
//! prefix listings come out in lexicographic order.

use crate::distance::within_distance;
use crate::tokenizer::normalize;
use crate::DocId;
use std::collections::{BTreeMap, BTreeSet};

/// Bound on each node's top-searches set.
pub const TOP_SEARCHES_SIZE: usize = 5;
const ROOT: usize = 0;

#[derive(Debug, Default)]
pub struct TrieNode {
    pub children: BTreeMap<char, usize>,
    pub is_end_of_word: bool,
    pub word: Option<String>,
    pub frequency: u32,
    /// Words routed through this node. Holds at most `TOP_SEARCHES_SIZE` entries and
    /// evicts the lexicographically smallest, not the least frequent.
    pub top_searches: BTreeSet<String>,
    pub posting_list: BTreeSet<DocId>,
}

impl TrieNode {
    fn add_to_top_searches(&mut self, word: &str) {
        if self.top_searches.contains(word) { return; }
        self.top_searches.insert(word.to_string());
        if self.top_searches.len() > TOP_SEARCHES_SIZE {
            self.top_searches.pop_first();
        }
    }
}

/// A word found by a trie scan together with its distance to the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHit {
    pub word: String,
    pub distance: usize,
    pub frequency: u32,
}

#[derive(Debug)]
pub struct Trie {
    nodes: Vec<TrieNode>,
    words: usize,
}

impl Default for Trie {
    fn default() -> Self { Self::new() }
}

impl Trie {
    pub fn new() -> Self { Self { nodes: vec![TrieNode::default()], words: 0 } }

    /// Distinct words stored.
    pub fn len(&self) -> usize { self.words }
    pub fn is_empty(&self) -> bool { self.words == 0 }
    pub fn node_count(&self) -> usize { self.nodes.len() }

    /// Insert a word (case-folded) and return its new frequency. Empty input is ignored.
    pub fn insert(&mut self, word: &str) -> u32 {
        let word = normalize(word);
        if word.is_empty() { return 0; }
        let mut current = ROOT;
        for ch in word.chars() {
            current = match self.nodes[current].children.get(&ch) {
                Some(&child) => child,
                None => {
                    self.nodes.push(TrieNode::default());
                    let child = self.nodes.len() - 1;
                    self.nodes[current].children.insert(ch, child);
                    child
                }
            };
            self.nodes[current].add_to_top_searches(&word);
        }
        let node = &mut self.nodes[current];
        if !node.is_end_of_word {
            node.is_end_of_word = true;
            self.words += 1;
        }
        node.word = Some(word);
        node.frequency += 1;
        node.frequency
    }

    fn find(&self, s: &str) -> Option<usize> {
        let mut current = ROOT;
        for ch in s.chars() {
            current = *self.nodes[current].children.get(&ch)?;
        }
        Some(current)
    }

    fn find_word(&self, word: &str) -> Option<&TrieNode> {
        let word = normalize(word);
        if word.is_empty() { return None; }
        let node = &self.nodes[self.find(&word)?];
        node.is_end_of_word.then_some(node)
    }

    pub fn contains(&self, word: &str) -> bool { self.find_word(word).is_some() }

    pub fn frequency(&self, word: &str) -> Option<u32> { self.find_word(word).map(|n| n.frequency) }

    /// Every stored word starting with `prefix`, in lexicographic order.
    pub fn words_with_prefix(&self, prefix: &str) -> Vec<String> {
        let prefix = normalize(prefix);
        if prefix.is_empty() { return Vec::new(); }
        match self.find(&prefix) {
            Some(start) => self.collect(start).into_iter().map(|n| n.word.clone().unwrap_or_default()).collect(),
            None => Vec::new(),
        }
    }

    /// Terminal nodes under `start`, depth first in char order.
    fn collect(&self, start: usize) -> Vec<&TrieNode> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.is_end_of_word {
                out.push(node);
            }
            stack.extend(node.children.values().rev().copied());
        }
        out
    }

    /// All stored words with their frequencies, lexicographic order.
    pub fn words(&self) -> Vec<(String, u32)> {
        self.collect(ROOT).into_iter().map(|n| (n.word.clone().unwrap_or_default(), n.frequency)).collect()
    }

    /// Scan every stored word and keep those within `max_distance` of `query`.
    pub fn fuzzy_scan(&self, query: &str, max_distance: usize) -> Vec<ScanHit> {
        let query = normalize(query);
        if query.is_empty() { return Vec::new(); }
        self.collect(ROOT)
            .into_iter()
            .filter_map(|n| {
                let word = n.word.as_deref()?;
                within_distance(&query, word, max_distance).map(|distance| ScanHit {
                    word: word.to_string(),
                    distance,
                    frequency: n.frequency,
                })
            })
            .collect()
    }

    /// The bounded top-searches set of the node reached by `prefix`.
    pub fn top_searches(&self, prefix: &str) -> Vec<String> {
        let prefix = normalize(prefix);
        if prefix.is_empty() { return Vec::new(); }
        self.find(&prefix).map(|i| self.nodes[i].top_searches.iter().cloned().collect()).unwrap_or_default()
    }

    /// Record `doc_id` on the node of an existing word. Returns false if the word is absent.
    pub fn add_posting(&mut self, word: &str, doc_id: DocId) -> bool {
        let word = normalize(word);
        if word.is_empty() { return false; }
        match self.find(&word) {
            Some(idx) if self.nodes[idx].is_end_of_word => {
                self.nodes[idx].posting_list.insert(doc_id);
                true
            }
            _ => false,
        }
    }

    pub fn posting_list(&self, word: &str) -> Option<Vec<DocId>> {
        self.find_word(word).map(|n| n.posting_list.iter().copied().collect())
    }

    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[ROOT] = TrieNode::default();
        self.words = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_search_case_insensitive() {
        let mut t = Trie::new();
        t.insert("Hello");
        t.insert("world");
        assert!(t.contains("hello"));
        assert!(t.contains("HELLO"));
        assert!(!t.contains("hell"));
        assert!(!t.contains(""));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn reinsert_increments_frequency_without_new_nodes() {
        let mut t = Trie::new();
        assert_eq!(t.insert("cat"), 1);
        let nodes = t.node_count();
        assert_eq!(t.insert("CAT"), 2);
        assert_eq!(t.node_count(), nodes);
        assert_eq!(t.frequency("cat"), Some(2));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn prefix_listing_is_sorted_and_exact() {
        let mut t = Trie::new();
        for w in ["help", "hello", "helm", "world", "he"] {
            t.insert(w);
        }
        assert_eq!(t.words_with_prefix("HEL"), vec!["hello", "helm", "help"]);
        assert_eq!(t.words_with_prefix("he"), vec!["he", "hello", "helm", "help"]);
        assert!(t.words_with_prefix("x").is_empty());
        assert!(t.words_with_prefix("").is_empty());
    }

    #[test]
    fn top_searches_keep_largest_five() {
        let mut t = Trie::new();
        for w in ["aa", "ab", "ac", "ad", "ae", "af", "ab"] {
            t.insert(w);
        }
        assert_eq!(t.top_searches("a"), vec!["ab", "ac", "ad", "ae", "af"]);
        assert_eq!(t.top_searches("ab"), vec!["ab"]);
    }

    #[test]
    fn fuzzy_scan_finds_all_within_distance() {
        let mut t = Trie::new();
        for w in ["cat", "cut", "cart", "dog"] {
            t.insert(w);
        }
        let mut hits: Vec<String> = t.fuzzy_scan("cat", 1).into_iter().map(|h| h.word).collect();
        hits.sort();
        assert_eq!(hits, vec!["cart", "cat", "cut"]);
    }

    #[test]
    fn postings_only_on_existing_words() {
        let mut t = Trie::new();
        t.insert("doc");
        assert!(t.add_posting("doc", 3));
        assert!(t.add_posting("doc", 1));
        assert!(!t.add_posting("missing", 1));
        assert_eq!(t.posting_list("doc"), Some(vec![1, 3]));
        assert_eq!(t.posting_list("missing"), None);
    }

    #[test]
    fn clear_drops_everything() {
        let mut t = Trie::new();
        t.insert("abc");
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.node_count(), 1);
        assert!(!t.contains("abc"));
    }
}
