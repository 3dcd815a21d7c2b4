//! Heavy-edge partner rating.
//!
//! The attraction between `u` and a candidate `v` is the sum of
//! `ω(e)/(|e|−1)` over shared hyperedges. Candidates must share `u`'s
//! community and stay below the cluster weight cap; ties are broken by a
//! salted hash of the pair so the choice is stable across runs and
//! independent of iteration order.

use ahash::AHasher;
use hashbrown::HashMap;
use std::hash::Hasher;

use crate::hypergraph::{NodeId, NodeWeight, StaticHypergraph, INVALID_NODE};

#[inline]
fn tie_break_hash(salt: u64, u: NodeId, v: NodeId) -> u64 {
    let mut h = AHasher::default();
    h.write_u64(salt);
    h.write_u32(u);
    h.write_u32(v);
    h.finish()
}

/// Scratch state for rating one node at a time; reused across calls to
/// avoid reallocation.
#[derive(Default)]
pub struct Rater {
    scores: HashMap<NodeId, f64>,
}

impl Rater {
    pub fn new() -> Self {
        Rater::default()
    }

    /// Best contraction partner for `u`, or `INVALID_NODE`.
    ///
    /// `cluster_weight(v)` must return the current weight of the cluster a
    /// candidate belongs to, and `representative(v)` its cluster root, so
    /// the rater works for both fresh nodes and grown clusters.
    #[allow(clippy::too_many_arguments)]
    pub fn rate<W, R>(
        &mut self,
        hg: &StaticHypergraph,
        u: NodeId,
        cluster_weight: W,
        representative: R,
        max_cluster_weight: NodeWeight,
        salt: u64,
    ) -> NodeId
    where
        W: Fn(NodeId) -> NodeWeight,
        R: Fn(NodeId) -> NodeId,
    {
        self.scores.clear();
        let own_weight = cluster_weight(representative(u));
        let own_community = hg.community(u);
        for &e in hg.incident_nets(u) {
            let size = hg.edge_size(e);
            if size < 2 {
                continue;
            }
            let score = hg.edge_weight(e) as f64 / (size - 1) as f64;
            for &pin in hg.pins(e) {
                let root = representative(pin);
                if root != representative(u) {
                    *self.scores.entry(root).or_insert(0.0) += score;
                }
            }
        }

        let mut best = INVALID_NODE;
        let mut best_score = 0.0f64;
        let mut best_hash = u64::MAX;
        for (&v, &score) in self.scores.iter() {
            if hg.community(v) != own_community {
                continue;
            }
            if own_weight + cluster_weight(v) > max_cluster_weight {
                continue;
            }
            let h = tie_break_hash(salt, representative(u).min(v), representative(u).max(v));
            if score > best_score || (score == best_score && h < best_hash) {
                best = v;
                best_score = score;
                best_hash = h;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> StaticHypergraph {
        // Node 0 shares a 2-pin edge with 1 (score 1.0) and a 3-pin edge
        // with 1 and 2 (score 0.5 each).
        StaticHypergraph::build(vec![1; 3], &[vec![0, 1], vec![0, 1, 2]], vec![1, 1])
    }

    #[test]
    fn prefers_heavier_connection() {
        let hg = fixture();
        let mut rater = Rater::new();
        let best = rater.rate(&hg, 0, |v| hg.node_weight(v), |v| v, 10, 42);
        assert_eq!(best, 1); // 1.0 + 0.5 beats 0.5
    }

    #[test]
    fn respects_weight_cap() {
        let hg = StaticHypergraph::build(vec![5, 9, 1], &[vec![0, 1], vec![0, 2]], vec![10, 1]);
        let mut rater = Rater::new();
        // Cap 10 excludes partner 1 (5+9), leaving 2 despite the lighter edge.
        let best = rater.rate(&hg, 0, |v| hg.node_weight(v), |v| v, 10, 42);
        assert_eq!(best, 2);
        // No candidate fits under cap 5.
        let best = rater.rate(&hg, 0, |v| hg.node_weight(v), |v| v, 5, 42);
        assert_eq!(best, INVALID_NODE);
    }

    #[test]
    fn respects_communities() {
        let mut hg = fixture();
        hg.set_communities(vec![0, 1, 0]);
        let mut rater = Rater::new();
        let best = rater.rate(&hg, 0, |v| hg.node_weight(v), |v| v, 10, 42);
        assert_eq!(best, 2); // node 1 is in another community
    }

    #[test]
    fn tie_break_is_stable() {
        // Symmetric star: 0 tied to 1 and 2 with equal score.
        let hg = StaticHypergraph::build(vec![1; 3], &[vec![0, 1], vec![0, 2]], vec![1, 1]);
        let mut rater = Rater::new();
        let a = rater.rate(&hg, 0, |v| hg.node_weight(v), |v| v, 10, 7);
        let b = rater.rate(&hg, 0, |v| hg.node_weight(v), |v| v, 10, 7);
        assert_eq!(a, b);
    }
}
