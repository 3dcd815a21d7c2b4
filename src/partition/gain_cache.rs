//! Incrementally maintained move gains for the connectivity objective.
//!
//! For every vertex `v` the cache holds `penalty(v)`, the weight of
//! incident edges that keep `v`'s block in their connectivity set if `v`
//! leaves, and `benefit(v, p)` for every block `p`, the weight of
//! incident edges already connected to `p`. The km1 gain of moving `v`
//! to `p` is then `benefit(v, p) − penalty(v)`, available in O(1).
//!
//! Committers keep the cache consistent by calling [`GainCache::delta_update`]
//! from inside the move's per-edge delta hook (the same ordering as the pin
//! count updates) and [`GainCache::recompute_penalty`] for the moved vertex
//! after the commit.

use rayon::prelude::*;
use std::sync::atomic::{AtomicI64, Ordering};

use super::PartitionedHypergraph;
use crate::hypergraph::{BlockId, EdgeId, EdgeWeight, Gain, NodeId, Topology};

#[derive(Debug, Default)]
pub struct GainCache {
    k: usize,
    /// Flattened `v * k + p`.
    benefit: Vec<AtomicI64>,
    penalty: Vec<AtomicI64>,
    initialized: bool,
}

impl GainCache {
    pub fn new() -> Self {
        GainCache::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn reset(&mut self) {
        self.initialized = false;
    }

    /// (Re)build the cache from the current partition, in parallel.
    pub fn initialize<H: Topology>(&mut self, phg: &PartitionedHypergraph<H>) {
        let n = phg.hypergraph().num_nodes();
        let k = phg.k();
        if self.benefit.len() != n * k {
            self.benefit = (0..n * k).map(|_| AtomicI64::new(0)).collect();
            self.penalty = (0..n).map(|_| AtomicI64::new(0)).collect();
        }
        self.k = k;
        self.recompute(phg);
        self.initialized = true;
    }

    /// Recompute every entry in place. The cache must already be sized
    /// for this overlay (the uncoarsener initializes it per level).
    pub fn recompute<H: Topology>(&self, phg: &PartitionedHypergraph<H>) {
        let n = phg.hypergraph().num_nodes();
        let k = self.k;
        debug_assert_eq!(self.benefit.len(), n * k);
        (0..n).into_par_iter().for_each(|v| {
            let hg = phg.hypergraph();
            for p in 0..k {
                self.benefit[v * k + p].store(0, Ordering::Relaxed);
            }
            if !hg.is_node_enabled(v as NodeId) {
                self.penalty[v].store(0, Ordering::Relaxed);
                return;
            }
            let own = phg.part_id(v as NodeId);
            let mut penalty = 0;
            for &e in hg.incident_nets(v as NodeId) {
                let we = hg.edge_weight(e);
                if phg.pin_count_in_part(e, own) > 1 {
                    penalty += we;
                }
                for p in phg.connectivity_set(e) {
                    self.benefit[v * k + p as usize].fetch_add(we, Ordering::Relaxed);
                }
            }
            self.penalty[v].store(penalty, Ordering::Relaxed);
        });
    }

    #[inline]
    pub fn benefit_term(&self, v: NodeId, p: BlockId) -> Gain {
        self.benefit[v as usize * self.k + p as usize].load(Ordering::Acquire)
    }

    #[inline]
    pub fn penalty_term(&self, v: NodeId) -> Gain {
        self.penalty[v as usize].load(Ordering::Acquire)
    }

    /// km1 gain of moving `v` to `to` (positive = objective improves).
    #[inline]
    pub fn gain(&self, v: NodeId, to: BlockId) -> Gain {
        self.benefit_term(v, to) - self.penalty_term(v)
    }

    /// Apply the cache deltas for one edge touched by a committed move of
    /// `v` from `from` to `to`. Must be called with the pin counts after
    /// the move, from inside the move's delta hook.
    pub fn delta_update<H: Topology>(
        &self,
        phg: &PartitionedHypergraph<H>,
        moved: NodeId,
        from: BlockId,
        to: BlockId,
        e: EdgeId,
        we: EdgeWeight,
        pin_count_in_from_after: u32,
        pin_count_in_to_after: u32,
    ) {
        let k = self.k;
        let hg = phg.hypergraph();
        if pin_count_in_from_after == 1 {
            // One pin left in `from`: moving it away now frees the edge.
            for &u in hg.pins(e) {
                if u != moved && phg.part_id(u) == from {
                    self.penalty[u as usize].fetch_sub(we, Ordering::AcqRel);
                }
            }
        }
        if pin_count_in_from_after == 0 {
            // `from` left the connectivity set.
            for &u in hg.pins(e) {
                self.benefit[u as usize * k + from as usize].fetch_sub(we, Ordering::AcqRel);
            }
        }
        if pin_count_in_to_after == 1 {
            // `to` entered the connectivity set.
            for &u in hg.pins(e) {
                self.benefit[u as usize * k + to as usize].fetch_add(we, Ordering::AcqRel);
            }
        }
        if pin_count_in_to_after == 2 {
            // The pin that was alone in `to` is no longer the last one.
            for &u in hg.pins(e) {
                if u != moved && phg.part_id(u) == to {
                    self.penalty[u as usize].fetch_add(we, Ordering::AcqRel);
                }
            }
        }
    }

    /// Recompute the penalty of one vertex from the live pin counts.
    /// Required for the moved vertex after each committed move, and for
    /// vertices moved by other refiners when force-updates are on.
    pub fn recompute_penalty<H: Topology>(&self, phg: &PartitionedHypergraph<H>, v: NodeId) {
        let own = phg.part_id(v);
        let mut penalty = 0;
        for &e in phg.hypergraph().incident_nets(v) {
            if phg.pin_count_in_part(e, own) > 1 {
                penalty += phg.hypergraph().edge_weight(e);
            }
        }
        self.penalty[v as usize].store(penalty, Ordering::Release);
    }

    /// Compare every cached term against a from-scratch recomputation.
    pub fn validate<H: Topology>(
        &self,
        phg: &PartitionedHypergraph<H>,
    ) -> Result<(), crate::error::HypercutError> {
        use crate::error::HypercutError;
        let hg = phg.hypergraph();
        for v in 0..hg.num_nodes() as NodeId {
            if !hg.is_node_enabled(v) {
                continue;
            }
            let own = phg.part_id(v);
            let mut penalty = 0;
            let mut benefit = vec![0 as Gain; self.k];
            for &e in hg.incident_nets(v) {
                let we = hg.edge_weight(e);
                if phg.pin_count_in_part(e, own) > 1 {
                    penalty += we;
                }
                for p in phg.connectivity_set(e) {
                    benefit[p as usize] += we;
                }
            }
            if penalty != self.penalty_term(v) {
                return Err(HypercutError::Internal(format!(
                    "gain cache penalty of node {} drifted: cached {}, actual {}",
                    v,
                    self.penalty_term(v),
                    penalty
                )));
            }
            for (p, &b) in benefit.iter().enumerate() {
                if b != self.benefit_term(v, p as BlockId) {
                    return Err(HypercutError::Internal(format!(
                        "gain cache benefit of node {} towards block {} drifted",
                        v, p
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::{NodeWeight, StaticHypergraph};

    fn overlay() -> PartitionedHypergraph<StaticHypergraph> {
        let hg = StaticHypergraph::build(
            vec![1; 7],
            &[vec![0, 2], vec![0, 1, 3, 4], vec![3, 4, 6], vec![2, 5, 6]],
            vec![1; 4],
        );
        let phg = PartitionedHypergraph::new(3, hg);
        for (v, p) in [(0, 0), (1, 0), (2, 0), (3, 1), (4, 1), (5, 2), (6, 2)] {
            phg.set_only_node_part(v, p);
        }
        phg.initialize_partition();
        phg
    }

    #[test]
    fn initialization_matches_definition() {
        let phg = overlay();
        let mut cache = GainCache::new();
        cache.initialize(&phg);
        cache.validate(&phg).unwrap();
        // Node 0: edges {0,2} (pc0=2) and {0,1,3,4} (pc0=2) both keep
        // block 0 occupied if 0 leaves.
        assert_eq!(cache.penalty_term(0), 2);
        // Moving 0 to block 1 connects to edge 1 only.
        assert_eq!(cache.benefit_term(0, 1), 1);
        assert_eq!(cache.gain(0, 1), -1);
    }

    #[test]
    fn gain_matches_observed_delta() {
        let phg = overlay();
        let mut cache = GainCache::new();
        cache.initialize(&phg);

        for (v, to) in [(0u32, 1u32), (6, 1), (2, 2), (4, 0)] {
            let from = phg.part_id(v);
            if from == to {
                continue;
            }
            let predicted = cache.gain(v, to);
            let mut delta = 0;
            let moved = phg.change_node_part_with(
                v,
                from,
                to,
                NodeWeight::MAX,
                |e, we, size, pf, pt| {
                    cache.delta_update(&phg, v, from, to, e, we, pf, pt);
                    delta += super::super::Objective::Km1.delta(we, size, pf, pt);
                },
            );
            assert!(moved);
            cache.recompute_penalty(&phg, v);
            // Positive gain = objective drops by that amount.
            assert_eq!(-predicted, delta, "node {v} to block {to}");
            cache.validate(&phg).unwrap();
        }
    }
}
