//! Damped iterative PageRank over a [`LinkGraph`].

use crate::config::PageRankConfig;
use crate::links::LinkGraph;
use crate::DocId;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PageRankResult {
    pub scores: BTreeMap<DocId, f64>,
    pub iterations: usize,
    /// False when the iteration cap was hit first. Callers treat the scores as final either way.
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub struct PageRank {
    damping: f64,
    max_iterations: usize,
    tolerance: f64,
}

impl Default for PageRank {
    fn default() -> Self { Self::new(&PageRankConfig::default()) }
}

impl PageRank {
    pub fn new(cfg: &PageRankConfig) -> Self {
        Self { damping: cfg.damping, max_iterations: cfg.max_iterations, tolerance: cfg.tolerance }
    }

    /// Start every node at `1/N`, then repeat
    /// `score(n) = (1-d)/N + d * sum(score(m) / out(m))` over incoming `m`
    /// until the summed absolute change drops below the tolerance.
    /// Dangling nodes keep their mass; it is not redistributed.
    pub fn compute(&self, graph: &LinkGraph) -> PageRankResult {
        let n = graph.node_count();
        if n == 0 {
            return PageRankResult { scores: BTreeMap::new(), iterations: 0, converged: true };
        }
        let base = (1.0 - self.damping) / n as f64;
        let mut scores: BTreeMap<DocId, f64> = graph.nodes().map(|id| (id, 1.0 / n as f64)).collect();

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            iterations += 1;
            let mut next = BTreeMap::new();
            let mut delta = 0.0;
            for node in graph.nodes() {
                let inflow: f64 = graph
                    .incoming(node)
                    .iter()
                    .map(|&m| {
                        let out = graph.out_degree(m);
                        if out == 0 { 0.0 } else { scores[&m] / out as f64 }
                    })
                    .sum();
                let score = base + self.damping * inflow;
                delta += (score - scores[&node]).abs();
                next.insert(node, score);
            }
            scores = next;
            if delta < self.tolerance {
                converged = true;
                break;
            }
        }
        tracing::debug!(nodes = n, iterations, converged, "pagerank finished");
        PageRankResult { scores, iterations, converged }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutual_pair_converges_to_half() {
        let mut g = LinkGraph::new();
        g.add_edge(1, 2);
        g.add_edge(2, 1);
        let r = PageRank::default().compute(&g);
        assert!(r.converged);
        assert!((r.scores[&1] - 0.5).abs() < 1e-6);
        assert!((r.scores[&2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn hub_outranks_leaves() {
        let mut g = LinkGraph::new();
        for leaf in 2..=5 {
            g.add_edge(leaf, 1);
        }
        g.add_edge(1, 2);
        let r = PageRank::default().compute(&g);
        let hub = r.scores[&1];
        assert!((2..=5).all(|leaf| hub > r.scores[&leaf]));
        assert!(r.scores[&2] > r.scores[&3]);
    }

    #[test]
    fn dangling_mass_is_not_redistributed() {
        let mut g = LinkGraph::new();
        g.add_edge(1, 2);
        let r = PageRank::default().compute(&g);
        // 1 has no inbound links; 2 gains from 1 but never passes anything on
        assert!((r.scores[&1] - 0.075).abs() < 1e-9);
        assert!((r.scores[&2] - (0.075 + 0.85 * 0.075)).abs() < 1e-9);
        let total: f64 = r.scores.values().sum();
        assert!(total < 1.0);
    }

    #[test]
    fn isolated_nodes_get_teleport_share() {
        let mut g = LinkGraph::new();
        g.add_node(7);
        g.add_node(8);
        let r = PageRank::default().compute(&g);
        assert!((r.scores[&7] - 0.075).abs() < 1e-12);
        assert_eq!(r.iterations, 2);
    }

    #[test]
    fn iteration_cap_stops_silently() {
        let mut g = LinkGraph::new();
        g.add_edge(1, 2);
        g.add_edge(2, 3);
        g.add_edge(3, 1);
        let cfg = PageRankConfig { max_iterations: 1, tolerance: 0.0, ..PageRankConfig::default() };
        let r = PageRank::new(&cfg).compute(&g);
        assert_eq!(r.iterations, 1);
        assert!(!r.converged);
        assert_eq!(r.scores.len(), 3);
    }

    #[test]
    fn empty_graph() {
        let r = PageRank::default().compute(&LinkGraph::new());
        assert!(r.scores.is_empty());
    }
}
