//! Additive-only Bloom filter over words.

use crate::error::{Result, SearchError};
use bit_vec::BitVec;

/// Fixed bit array indexed by one polynomial string hash per seed.
/// `might_contain` never returns false for an added word; there is no removal.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: BitVec,
    seeds: Vec<u32>,
}

impl BloomFilter {
    pub fn new(size: usize, seeds: &[u32]) -> Result<Self> {
        if size == 0 {
            return Err(SearchError::invalid_input("bloom filter size must be positive"));
        }
        if seeds.is_empty() {
            return Err(SearchError::invalid_input("bloom filter needs at least one seed"));
        }
        Ok(Self { bits: BitVec::from_elem(size, false), seeds: seeds.to_vec() })
    }

    pub fn size(&self) -> usize { self.bits.len() }

    fn slot(&self, word: &str, seed: u32) -> usize {
        let mut h: u32 = 0;
        for c in word.chars() {
            h = h.wrapping_mul(seed).wrapping_add(c as u32);
        }
        (h & 0x7fff_ffff) as usize % self.bits.len()
    }

    pub fn add(&mut self, word: &str) {
        for i in 0..self.seeds.len() {
            let slot = self.slot(word, self.seeds[i]);
            self.bits.set(slot, true);
        }
    }

    /// `false` means definitely absent; `true` means possibly present.
    pub fn might_contain(&self, word: &str) -> bool {
        self.seeds.iter().all(|&seed| self.bits.get(self.slot(word, seed)).unwrap_or(false))
    }

    /// Fraction of bits set, a rough saturation gauge.
    pub fn fill_ratio(&self) -> f64 {
        self.bits.iter().filter(|b| *b).count() as f64 / self.bits.len() as f64
    }

    pub fn clear(&mut self) { self.bits.clear(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> BloomFilter { BloomFilter::new(10_000, &[3, 7, 11, 17]).unwrap() }

    #[test]
    fn no_false_negatives() {
        let mut bf = filter();
        let words: Vec<String> = (0..500).map(|i| format!("word{i}")).collect();
        for w in &words {
            bf.add(w);
        }
        assert!(words.iter().all(|w| bf.might_contain(w)));
    }

    #[test]
    fn absent_word_rejected() {
        let mut bf = filter();
        bf.add("example");
        bf.add("query");
        assert!(!bf.might_contain("random"));
        assert!(!bf.might_contain("zebra"));
    }

    #[test]
    fn invalid_arguments() {
        assert!(BloomFilter::new(0, &[3]).is_err());
        assert!(BloomFilter::new(10, &[]).is_err());
    }

    #[test]
    fn clear_resets_bits() {
        let mut bf = filter();
        bf.add("example");
        assert!(bf.fill_ratio() > 0.0);
        bf.clear();
        assert_eq!(bf.fill_ratio(), 0.0);
        assert!(!bf.might_contain("example"));
    }
}
