//! Concurrently mutable k-way partition overlay of a hypergraph.
//!
//! The overlay owns its hypergraph and maintains, under concurrent moves:
//! block weights, pin counts per (edge, block), connectivity sets,
//! and the per-vertex count of incident cut hyperedges (border status).
//! Any interleaving of accepted [`change_node_part_with`] calls leaves the
//! derived state equal to some serial execution of the accepted subset;
//! rejected moves leave no trace.
//!
//! [`change_node_part_with`]: PartitionedHypergraph::change_node_part_with

use rayon::prelude::*;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use super::bitset::{ConnectivitySets, OneBits};
use crate::hypergraph::{
    BlockId, DynamicHypergraph, EdgeId, EdgeOp, EdgeWeight, NodeId, NodeWeight, StaticHypergraph,
    Topology, INVALID_BLOCK,
};

#[derive(Debug)]
pub struct PartitionedHypergraph<H: Topology> {
    hg: H,
    k: usize,
    part_ids: Vec<AtomicU32>,
    part_weights: Vec<AtomicI64>,
    /// Flattened `e * k + p`.
    pin_counts: Vec<AtomicU32>,
    connectivity_sets: ConnectivitySets,
    num_incident_cut_edges: Vec<AtomicU32>,
}

impl<H: Topology> PartitionedHypergraph<H> {
    pub fn new(k: usize, hg: H) -> Self {
        let n = hg.num_nodes();
        let m = hg.num_edges();
        PartitionedHypergraph {
            connectivity_sets: ConnectivitySets::new(m, k),
            part_ids: (0..n).map(|_| AtomicU32::new(INVALID_BLOCK)).collect(),
            part_weights: (0..k).map(|_| AtomicI64::new(0)).collect(),
            pin_counts: (0..m * k).map(|_| AtomicU32::new(0)).collect(),
            num_incident_cut_edges: (0..n).map(|_| AtomicU32::new(0)).collect(),
            hg,
            k,
        }
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn hypergraph(&self) -> &H {
        &self.hg
    }

    pub fn into_hypergraph(self) -> H {
        self.hg
    }

    #[inline]
    pub fn part_id(&self, v: NodeId) -> BlockId {
        self.part_ids[v as usize].load(Ordering::Acquire)
    }

    #[inline]
    pub fn part_weight(&self, p: BlockId) -> NodeWeight {
        self.part_weights[p as usize].load(Ordering::Acquire)
    }

    #[inline]
    pub fn pin_count_in_part(&self, e: EdgeId, p: BlockId) -> u32 {
        self.pin_counts[e as usize * self.k + p as usize].load(Ordering::Acquire)
    }

    #[inline]
    pub fn connectivity(&self, e: EdgeId) -> u32 {
        self.connectivity_sets.connectivity(e as usize)
    }

    #[inline]
    pub fn connectivity_set(&self, e: EdgeId) -> OneBits<'_> {
        self.connectivity_sets.iter(e as usize)
    }

    #[inline]
    pub fn num_incident_cut_edges(&self, v: NodeId) -> u32 {
        self.num_incident_cut_edges[v as usize].load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_border_node(&self, v: NodeId) -> bool {
        self.num_incident_cut_edges(v) > 0
    }

    /// Assign `v` to block `p` without touching any derived state.
    /// Use during bulk initialization, then call [`initialize_partition`].
    ///
    /// [`initialize_partition`]: PartitionedHypergraph::initialize_partition
    #[inline]
    pub fn set_only_node_part(&self, v: NodeId, p: BlockId) {
        debug_assert!((p as usize) < self.k);
        self.part_ids[v as usize].store(p, Ordering::Release);
    }

    /// Recompute every piece of derived state from the current block
    /// assignment, in parallel.
    pub fn initialize_partition(&self) {
        let k = self.k;
        // Block weights.
        let mut weights = vec![0 as NodeWeight; k];
        for v in 0..self.hg.num_nodes() as NodeId {
            if !self.hg.is_node_enabled(v) {
                continue;
            }
            let p = self.part_id(v);
            debug_assert!(p != INVALID_BLOCK, "node {v} unassigned");
            weights[p as usize] += self.hg.node_weight(v);
        }
        for (p, w) in weights.into_iter().enumerate() {
            self.part_weights[p].store(w, Ordering::Release);
        }

        // Pin counts and connectivity sets.
        (0..self.hg.num_edges()).into_par_iter().for_each(|e| {
            let mut counts = vec![0u32; k];
            for &v in self.hg.pins(e as EdgeId) {
                counts[self.part_id(v) as usize] += 1;
            }
            for (p, &c) in counts.iter().enumerate() {
                self.pin_counts[e * k + p].store(c, Ordering::Release);
                if c > 0 {
                    self.connectivity_sets.insert(e, p as BlockId);
                } else {
                    self.connectivity_sets.remove(e, p as BlockId);
                }
            }
        });

        // Border-node counters.
        (0..self.hg.num_nodes()).into_par_iter().for_each(|v| {
            let cut = self
                .hg
                .incident_nets(v as NodeId)
                .iter()
                .filter(|&&e| self.connectivity(e) >= 2)
                .count() as u32;
            self.num_incident_cut_edges[v].store(cut, Ordering::Release);
        });
    }

    /// Forget the partition: all nodes unassigned, all derived state zero.
    pub fn reset_partition(&self) {
        for id in &self.part_ids {
            id.store(INVALID_BLOCK, Ordering::Relaxed);
        }
        for w in &self.part_weights {
            w.store(0, Ordering::Relaxed);
        }
        for c in &self.pin_counts {
            c.store(0, Ordering::Relaxed);
        }
        for c in &self.num_incident_cut_edges {
            c.store(0, Ordering::Relaxed);
        }
        self.connectivity_sets.reset();
    }

    /// Move `v` from `from` to `to` if `partWeight[to] + w(v)` stays within
    /// `cap`. The weight test-and-add is the only admission gate; on
    /// rejection nothing is changed. On success, pin counts, connectivity
    /// sets and border counters are updated edge by edge, and `delta` is
    /// invoked per incident edge with
    /// `(e, ω(e), |e|, pin_count_in_from_after, pin_count_in_to_after)`.
    pub fn change_node_part_with<F>(
        &self,
        v: NodeId,
        from: BlockId,
        to: BlockId,
        cap: NodeWeight,
        mut delta: F,
    ) -> bool
    where
        F: FnMut(EdgeId, EdgeWeight, usize, u32, u32),
    {
        debug_assert!(from != to);
        let w = self.hg.node_weight(v);

        let to_weight_after = self.part_weights[to as usize].fetch_add(w, Ordering::AcqRel) + w;
        if to_weight_after > cap {
            self.part_weights[to as usize].fetch_sub(w, Ordering::AcqRel);
            return false;
        }
        // A contested move of the same vertex serializes here: the loser
        // sees a changed part id, refunds the weight and reports failure.
        if self.part_ids[v as usize]
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.part_weights[to as usize].fetch_sub(w, Ordering::AcqRel);
            return false;
        }
        self.part_weights[from as usize].fetch_sub(w, Ordering::AcqRel);

        let k = self.k;
        for &e in self.hg.incident_nets(v) {
            let ei = e as usize;
            let size = self.hg.edge_size(e);
            let pin_count_in_from_after =
                self.pin_counts[ei * k + from as usize].fetch_sub(1, Ordering::AcqRel) - 1;
            if pin_count_in_from_after == 0 {
                self.connectivity_sets.remove(ei, from);
            }
            let pin_count_in_to_after =
                self.pin_counts[ei * k + to as usize].fetch_add(1, Ordering::AcqRel) + 1;
            if pin_count_in_to_after == 1 {
                self.connectivity_sets.insert(ei, to);
            }

            if size > 1 {
                if pin_count_in_from_after as usize == size - 1 {
                    // The edge was entirely in `from` and just became cut.
                    for &u in self.hg.pins(e) {
                        self.num_incident_cut_edges[u as usize].fetch_add(1, Ordering::AcqRel);
                    }
                }
                if pin_count_in_to_after as usize == size {
                    // The edge just became entirely contained in `to`.
                    for &u in self.hg.pins(e) {
                        self.num_incident_cut_edges[u as usize].fetch_sub(1, Ordering::AcqRel);
                    }
                }
            }

            delta(
                e,
                self.hg.edge_weight(e),
                size,
                pin_count_in_from_after,
                pin_count_in_to_after,
            );
        }
        true
    }

    /// [`change_node_part_with`] without a delta hook.
    ///
    /// [`change_node_part_with`]: PartitionedHypergraph::change_node_part_with
    pub fn change_node_part(&self, v: NodeId, from: BlockId, to: BlockId, cap: NodeWeight) -> bool {
        self.change_node_part_with(v, from, to, cap, |_, _, _, _, _| {})
    }

    /// Copy the block assignment into a plain vector.
    pub fn partition_vec(&self) -> Vec<BlockId> {
        (0..self.hg.num_nodes())
            .map(|v| self.part_id(v as NodeId))
            .collect()
    }

    /// Heaviest block weight over the cap, or zero if balanced.
    pub fn overload(&self, max_part_weight: NodeWeight) -> NodeWeight {
        (0..self.k as BlockId)
            .map(|p| (self.part_weight(p) - max_part_weight).max(0))
            .sum()
    }

    /// Recompute all derived state from scratch and compare against the
    /// incrementally maintained state. Used by tests and strict builds.
    pub fn validate_derived_state(&self) -> Result<(), crate::error::HypercutError> {
        use crate::error::HypercutError;
        let k = self.k;
        let mut weights = vec![0 as NodeWeight; k];
        for v in 0..self.hg.num_nodes() as NodeId {
            if self.hg.is_node_enabled(v) {
                weights[self.part_id(v) as usize] += self.hg.node_weight(v);
            }
        }
        for p in 0..k {
            if weights[p] != self.part_weight(p as BlockId) {
                return Err(HypercutError::Internal(format!(
                    "block {} weight drifted: tracked {}, actual {}",
                    p,
                    self.part_weight(p as BlockId),
                    weights[p]
                )));
            }
        }
        for e in 0..self.hg.num_edges() as EdgeId {
            let mut counts = vec![0u32; k];
            for &v in self.hg.pins(e) {
                counts[self.part_id(v) as usize] += 1;
            }
            for (p, &c) in counts.iter().enumerate() {
                if c != self.pin_count_in_part(e, p as BlockId) {
                    return Err(HypercutError::Internal(format!(
                        "pin count of edge {} in block {} drifted",
                        e, p
                    )));
                }
                let in_set = self.connectivity_set(e).any(|b| b as usize == p);
                if (c > 0) != in_set {
                    return Err(HypercutError::Internal(format!(
                        "connectivity set of edge {} wrong at block {}",
                        e, p
                    )));
                }
            }
        }
        for v in 0..self.hg.num_nodes() as NodeId {
            if !self.hg.is_node_enabled(v) {
                continue;
            }
            let cut = self
                .hg
                .incident_nets(v)
                .iter()
                .filter(|&&e| self.connectivity(e) >= 2)
                .count() as u32;
            if cut != self.num_incident_cut_edges(v) {
                return Err(HypercutError::Internal(format!(
                    "incident cut-edge counter of node {} drifted",
                    v
                )));
            }
        }
        Ok(())
    }
}

impl PartitionedHypergraph<StaticHypergraph> {
    /// Build the sub-hypergraph induced by block `p`.
    ///
    /// With `split_cut_nets`, every incident hyperedge is projected onto
    /// its pins in `p` and kept when at least two remain; otherwise only
    /// hyperedges fully contained in `p` survive. Returns the extracted
    /// hypergraph and the mapping from original node ids to new ones
    /// (`INVALID_NODE` for nodes outside the block). Community ids project
    /// onto the extracted nodes.
    pub fn extract(
        &self,
        block: BlockId,
        split_cut_nets: bool,
    ) -> (StaticHypergraph, Vec<NodeId>) {
        let n = self.hg.num_nodes();
        let mut mapping = vec![crate::hypergraph::INVALID_NODE; n];
        let mut weights = Vec::new();
        for v in 0..n as NodeId {
            if self.part_id(v) == block {
                mapping[v as usize] = weights.len() as NodeId;
                weights.push(self.hg.node_weight(v));
            }
        }

        let mut pin_lists = Vec::new();
        let mut edge_weights = Vec::new();
        for e in self.hg.edges() {
            let keep = if split_cut_nets {
                self.pin_count_in_part(e, block) >= 2
            } else {
                self.connectivity(e) == 1 && self.pin_count_in_part(e, block) > 0
            };
            if keep {
                pin_lists.push(
                    self.hg
                        .pins(e)
                        .iter()
                        .filter(|&&v| self.part_id(v) == block)
                        .map(|&v| mapping[v as usize])
                        .collect::<Vec<_>>(),
                );
                edge_weights.push(self.hg.edge_weight(e));
            }
        }

        let mut extracted = StaticHypergraph::build(weights, &pin_lists, edge_weights);
        if self.hg.has_communities() {
            let mut comms = vec![0; extracted.num_nodes()];
            for v in 0..n as NodeId {
                let mapped = mapping[v as usize];
                if mapped != crate::hypergraph::INVALID_NODE {
                    comms[mapped as usize] = self.hg.community(v);
                }
            }
            extracted.set_communities(comms);
        }
        (extracted, mapping)
    }
}

impl PartitionedHypergraph<DynamicHypergraph> {
    /// Reverse one contraction while keeping the partition overlay exact:
    /// the reactivated node inherits its representative's block, restored
    /// pins raise the pin count of their block, and border counters move
    /// with the pins.
    pub fn uncontract(&mut self, memento: &crate::hypergraph::ContractionMemento) {
        let u = memento.u;
        let v = memento.v;
        let block = self.part_id(u);
        debug_assert!(block != INVALID_BLOCK);
        self.part_ids[v as usize].store(block, Ordering::Release);

        let k = self.k;
        let Self {
            hg, pin_counts, ..
        } = self;
        hg.uncontract(memento, |e, _restored| {
            pin_counts[e as usize * k + block as usize].fetch_add(1, Ordering::AcqRel);
        });

        // Pin counts and connectivity are settled; shift border counters.
        for op in memento.ops() {
            match *op {
                EdgeOp::Shrink { e, .. } => {
                    if self.connectivity(e) >= 2 {
                        self.num_incident_cut_edges[v as usize].fetch_add(1, Ordering::AcqRel);
                    }
                }
                EdgeOp::Replace { e, .. } => {
                    if self.connectivity(e) >= 2 {
                        self.num_incident_cut_edges[u as usize].fetch_sub(1, Ordering::AcqRel);
                        self.num_incident_cut_edges[v as usize].fetch_add(1, Ordering::AcqRel);
                    }
                }
            }
        }
    }
}
