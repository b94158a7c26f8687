use crate::cache::ExpirationPolicy;
use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration. Every section falls back to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub query_cache: CacheConfig,
    pub facade: FacadeConfig,
    pub pagerank: PageRankConfig,
    pub query: QueryConfig,
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = File::open(path)?;
        let cfg: EngineConfig = serde_json::from_reader(BufReader::new(f))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.query_cache.validate()?;
        self.facade.validate()?;
        self.pagerank.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
    pub policy: ExpirationPolicy,
    /// Interval of the background expiry sweep; `None` disables the sweep thread.
    pub sweep_interval_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 1000, ttl_secs: 600, policy: ExpirationPolicy::AfterAccess, sweep_interval_secs: Some(300) }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration { Duration::from_secs(self.ttl_secs) }
    pub fn sweep_interval(&self) -> Option<Duration> { self.sweep_interval_secs.map(Duration::from_secs) }

    fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(SearchError::invalid_input("cache capacity must be positive"));
        }
        if self.sweep_interval_secs == Some(0) {
            return Err(SearchError::invalid_input("sweep interval must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FacadeConfig {
    pub ngram_size: usize,
    pub bloom_bits: usize,
    pub bloom_seeds: Vec<u32>,
    pub fuzzy_cache: CacheConfig,
    /// Size of the fuzzy scoring pool; defaults to the number of cores.
    pub worker_threads: Option<usize>,
    /// Candidate sets smaller than this are scored on the calling thread.
    pub parallel_threshold: usize,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            ngram_size: 3,
            bloom_bits: 10_000,
            bloom_seeds: vec![3, 7, 11, 17],
            fuzzy_cache: CacheConfig {
                capacity: 1000,
                ttl_secs: 30 * 60,
                policy: ExpirationPolicy::AfterWrite,
                sweep_interval_secs: None,
            },
            worker_threads: None,
            parallel_threshold: 64,
        }
    }
}

impl FacadeConfig {
    pub fn worker_threads(&self) -> usize { self.worker_threads.unwrap_or_else(num_cpus::get).max(1) }

    fn validate(&self) -> Result<()> {
        if self.ngram_size == 0 {
            return Err(SearchError::invalid_input("n-gram size must be positive"));
        }
        if self.bloom_bits == 0 || self.bloom_seeds.is_empty() {
            return Err(SearchError::invalid_input("bloom filter needs bits and at least one seed"));
        }
        self.fuzzy_cache.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRankConfig {
    pub damping: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self { damping: 0.85, max_iterations: 100, tolerance: 0.001 }
    }
}

impl PageRankConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(SearchError::invalid_input(format!("damping {} outside [0, 1]", self.damping)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Characters of content kept in a hydrated result.
    pub short_content_len: usize,
    pub suggestion_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { short_content_len: 200, suggestion_limit: 5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"pagerank":{"damping":0.5}}"#).unwrap();
        assert_eq!(cfg.pagerank.damping, 0.5);
        assert_eq!(cfg.pagerank.max_iterations, 100);
        assert_eq!(cfg.query_cache.capacity, 1000);
        assert_eq!(cfg.facade.bloom_seeds, vec![3, 7, 11, 17]);
        assert_eq!(cfg.query_cache.policy, ExpirationPolicy::AfterAccess);
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = EngineConfig::default();
        cfg.query_cache.capacity = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.pagerank.damping = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.facade.bloom_seeds.clear();
        assert!(cfg.validate().is_err());
    }
}
