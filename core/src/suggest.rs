//! Word n-gram model over past queries, used for next-word suggestions.

use crate::error::{Result, SearchError};
use crate::tokenizer::normalize;
use std::collections::HashMap;

#[derive(Debug)]
pub struct NGramModel {
    n: usize,
    /// Space-joined `n - 1` word context -> next word -> count.
    grams: HashMap<String, HashMap<String, u32>>,
}

impl NGramModel {
    /// `n` counts the predicted word, so a bigram model is `new(2)`.
    pub fn new(n: usize) -> Result<Self> {
        if n < 2 {
            return Err(SearchError::invalid_input("word n-gram model needs n >= 2"));
        }
        Ok(Self { n, grams: HashMap::new() })
    }

    pub fn n(&self) -> usize { self.n }

    pub fn len(&self) -> usize { self.grams.len() }

    pub fn is_empty(&self) -> bool { self.grams.is_empty() }

    /// Count every `n`-word window of each query. Queries are case-folded and split on whitespace.
    pub fn train<I, S>(&mut self, queries: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for query in queries {
            let query = normalize(query.as_ref());
            let words: Vec<&str> = query.split_whitespace().collect();
            for window in words.windows(self.n) {
                let (context, next) = window.split_at(self.n - 1);
                *self.grams.entry(context.join(" ")).or_default().entry(next[0].to_string()).or_insert(0) += 1;
            }
        }
    }

    /// Words seen after the last `n - 1` words of `context`, most frequent first.
    pub fn suggestions(&self, context: &str) -> Vec<(String, u32)> {
        let context = normalize(context);
        let words: Vec<&str> = context.split_whitespace().collect();
        if words.len() < self.n - 1 { return Vec::new(); }
        let key = words[words.len() - (self.n - 1)..].join(" ");
        let mut out: Vec<(String, u32)> = match self.grams.get(&key) {
            Some(next) => next.iter().map(|(w, &c)| (w.clone(), c)).collect(),
            None => return Vec::new(),
        };
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    pub fn clear(&mut self) { self.grams.clear(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigrams_rank_by_count() {
        let mut m = NGramModel::new(2).unwrap();
        m.train(["cat videos", "Cat videos funny", "cat food", "dog food"]);
        assert_eq!(m.suggestions("cat"), vec![("videos".to_string(), 2), ("food".to_string(), 1)]);
        assert_eq!(m.suggestions("cute cat"), m.suggestions("cat"));
        assert_eq!(m.suggestions("videos"), vec![("funny".to_string(), 1)]);
        assert!(m.suggestions("food").is_empty());
        assert!(m.suggestions("").is_empty());
    }

    #[test]
    fn trigrams_need_two_words_of_context() {
        let mut m = NGramModel::new(3).unwrap();
        m.train(["how to cook", "how to code", "how to cook rice"]);
        assert_eq!(m.suggestions("how to")[0], ("cook".to_string(), 2));
        assert!(m.suggestions("to").is_empty());
        assert_eq!(m.suggestions("to cook"), vec![("rice".to_string(), 1)]);
    }

    #[test]
    fn rejects_unigram_models() {
        assert!(NGramModel::new(1).is_err());
        assert!(NGramModel::new(0).is_err());
    }

    #[test]
    fn single_word_queries_train_nothing() {
        let mut m = NGramModel::new(2).unwrap();
        m.train(["cat", "  "]);
        assert!(m.is_empty());
        m.train(["cat dog"]);
        assert_eq!(m.len(), 1);
        m.clear();
        assert!(m.is_empty());
    }
}
