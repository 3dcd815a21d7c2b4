//! Immutable CSR hypergraph.
//!
//! Incidence is fixed after construction: pins per hyperedge and incident
//! nets per vertex are stored in two CSR arrays that stay consistent
//! (`v ∈ pins(e) ⇔ e ∈ incident_nets(v)`). All iteration is cheap slice
//! access, so parallel loops over nodes or edges are plain Rayon
//! `par_iter` over index ranges.

use hashbrown::HashMap;
use rayon::prelude::*;

use super::{CommunityId, EdgeId, EdgeWeight, NodeId, NodeWeight};

#[derive(Debug, Clone, Default)]
pub struct StaticHypergraph {
    node_weights: Vec<NodeWeight>,
    incident_offsets: Vec<usize>,
    incident_nets: Vec<EdgeId>,
    pin_offsets: Vec<usize>,
    pins: Vec<NodeId>,
    edge_weights: Vec<EdgeWeight>,
    total_weight: NodeWeight,
    max_edge_size: usize,
    community_ids: Vec<CommunityId>,
}

impl StaticHypergraph {
    /// Build directly from pin lists. No net removal or merging happens
    /// here; use [`crate::hypergraph::HypergraphFactory`] for user input.
    /// Pin lists must reference nodes `< node_weights.len()`.
    pub fn build(
        node_weights: Vec<NodeWeight>,
        edge_pin_lists: &[Vec<NodeId>],
        edge_weights: Vec<EdgeWeight>,
    ) -> Self {
        debug_assert_eq!(edge_pin_lists.len(), edge_weights.len());
        let n = node_weights.len();
        let m = edge_pin_lists.len();

        let mut pin_offsets = Vec::with_capacity(m + 1);
        pin_offsets.push(0usize);
        for list in edge_pin_lists {
            pin_offsets.push(pin_offsets.last().unwrap() + list.len());
        }
        let num_pins = *pin_offsets.last().unwrap();
        let mut pins = Vec::with_capacity(num_pins);
        for list in edge_pin_lists {
            pins.extend_from_slice(list);
        }

        // Incident-net CSR via counting sort over pins.
        let mut degrees = vec![0usize; n];
        for &p in &pins {
            degrees[p as usize] += 1;
        }
        let mut incident_offsets = Vec::with_capacity(n + 1);
        incident_offsets.push(0usize);
        for v in 0..n {
            incident_offsets.push(incident_offsets[v] + degrees[v]);
        }
        let mut cursor = incident_offsets.clone();
        let mut incident_nets = vec![0 as EdgeId; num_pins];
        for e in 0..m {
            for &p in &pins[pin_offsets[e]..pin_offsets[e + 1]] {
                incident_nets[cursor[p as usize]] = e as EdgeId;
                cursor[p as usize] += 1;
            }
        }

        let total_weight = node_weights.iter().sum();
        let max_edge_size = (0..m)
            .map(|e| pin_offsets[e + 1] - pin_offsets[e])
            .max()
            .unwrap_or(0);

        StaticHypergraph {
            node_weights,
            incident_offsets,
            incident_nets,
            pin_offsets,
            pins,
            edge_weights,
            total_weight,
            max_edge_size,
            community_ids: Vec::new(),
        }
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.node_weights.len()
    }

    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edge_weights.len()
    }

    #[inline]
    pub fn num_pins(&self) -> usize {
        self.pins.len()
    }

    #[inline]
    pub fn total_weight(&self) -> NodeWeight {
        self.total_weight
    }

    #[inline]
    pub fn max_edge_size(&self) -> usize {
        self.max_edge_size
    }

    #[inline]
    pub fn node_weight(&self, v: NodeId) -> NodeWeight {
        self.node_weights[v as usize]
    }

    #[inline]
    pub fn edge_weight(&self, e: EdgeId) -> EdgeWeight {
        self.edge_weights[e as usize]
    }

    #[inline]
    pub fn edge_size(&self, e: EdgeId) -> usize {
        let e = e as usize;
        self.pin_offsets[e + 1] - self.pin_offsets[e]
    }

    #[inline]
    pub fn pins(&self, e: EdgeId) -> &[NodeId] {
        let e = e as usize;
        &self.pins[self.pin_offsets[e]..self.pin_offsets[e + 1]]
    }

    #[inline]
    pub fn incident_nets(&self, v: NodeId) -> &[EdgeId] {
        let v = v as usize;
        &self.incident_nets[self.incident_offsets[v]..self.incident_offsets[v + 1]]
    }

    #[inline]
    pub fn node_degree(&self, v: NodeId) -> usize {
        self.incident_nets(v).len()
    }

    pub fn nodes(&self) -> std::ops::Range<NodeId> {
        0..self.num_nodes() as NodeId
    }

    pub fn edges(&self) -> std::ops::Range<EdgeId> {
        0..self.num_edges() as EdgeId
    }

    pub fn par_nodes(&self) -> rayon::range::Iter<NodeId> {
        (0..self.num_nodes() as NodeId).into_par_iter()
    }

    pub fn par_edges(&self) -> rayon::range::Iter<EdgeId> {
        (0..self.num_edges() as EdgeId).into_par_iter()
    }

    // --- communities ---------------------------------------------------

    pub fn has_communities(&self) -> bool {
        !self.community_ids.is_empty()
    }

    pub fn community(&self, v: NodeId) -> CommunityId {
        if self.community_ids.is_empty() {
            0
        } else {
            self.community_ids[v as usize]
        }
    }

    pub fn set_communities(&mut self, ids: Vec<CommunityId>) {
        debug_assert!(ids.is_empty() || ids.len() == self.num_nodes());
        self.community_ids = ids;
    }

    pub fn clear_communities(&mut self) {
        self.community_ids.clear();
    }

    // --- contraction ---------------------------------------------------

    /// Contract according to `clustering`, which maps every node to a
    /// cluster id dense in `0..num_clusters`. Returns the coarse
    /// hypergraph. Coarse pins are deduplicated per edge; edges shrinking
    /// to a single pin are dropped; identical coarse edges are merged with
    /// summed weight. Communities project onto cluster representatives.
    pub fn contract(&self, clustering: &[NodeId], num_clusters: usize) -> StaticHypergraph {
        debug_assert_eq!(clustering.len(), self.num_nodes());

        let mut coarse_weights = vec![0 as NodeWeight; num_clusters];
        for v in 0..self.num_nodes() {
            coarse_weights[clustering[v] as usize] += self.node_weights[v];
        }

        // Map pins per edge in parallel; sort+dedup gives a canonical key
        // for parallel-net merging.
        let mapped: Vec<Vec<NodeId>> = self
            .par_edges()
            .map(|e| {
                let mut coarse_pins: Vec<NodeId> =
                    self.pins(e).iter().map(|&p| clustering[p as usize]).collect();
                coarse_pins.sort_unstable();
                coarse_pins.dedup();
                coarse_pins
            })
            .collect();

        // Sequential merge in edge order keeps the coarse edge ids (and
        // therefore the whole level) deterministic.
        let mut edge_of_key: HashMap<Vec<NodeId>, usize> = HashMap::with_capacity(self.num_edges());
        let mut coarse_pin_lists: Vec<Vec<NodeId>> = Vec::new();
        let mut coarse_edge_weights: Vec<EdgeWeight> = Vec::new();
        for (e, coarse_pins) in mapped.into_iter().enumerate() {
            if coarse_pins.len() < 2 {
                continue;
            }
            match edge_of_key.entry(coarse_pins) {
                hashbrown::hash_map::Entry::Occupied(slot) => {
                    coarse_edge_weights[*slot.get()] += self.edge_weights[e];
                }
                hashbrown::hash_map::Entry::Vacant(slot) => {
                    let id = coarse_pin_lists.len();
                    coarse_pin_lists.push(slot.key().clone());
                    coarse_edge_weights.push(self.edge_weights[e]);
                    slot.insert(id);
                }
            }
        }

        let mut coarse = StaticHypergraph::build(coarse_weights, &coarse_pin_lists, coarse_edge_weights);
        if self.has_communities() {
            let mut coarse_comms = vec![0 as CommunityId; num_clusters];
            for v in 0..self.num_nodes() {
                coarse_comms[clustering[v] as usize] = self.community(v as NodeId);
            }
            coarse.set_communities(coarse_comms);
        }
        coarse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seven_node_fixture() -> StaticHypergraph {
        StaticHypergraph::build(
            vec![1; 7],
            &[vec![0, 2], vec![0, 1, 3, 4], vec![3, 4, 6], vec![2, 5, 6]],
            vec![1; 4],
        )
    }

    #[test]
    fn csr_construction_is_consistent() {
        let hg = seven_node_fixture();
        assert_eq!(hg.num_nodes(), 7);
        assert_eq!(hg.num_edges(), 4);
        assert_eq!(hg.num_pins(), 12);
        assert_eq!(hg.max_edge_size(), 4);
        assert_eq!(hg.total_weight(), 7);
        assert_eq!(hg.pins(1), &[0, 1, 3, 4]);
        assert_eq!(hg.incident_nets(0), &[0, 1]);
        assert_eq!(hg.incident_nets(6), &[2, 3]);
        // Pins and incident nets agree.
        for e in hg.edges() {
            for &p in hg.pins(e) {
                assert!(hg.incident_nets(p).contains(&e));
            }
        }
        for v in hg.nodes() {
            for &e in hg.incident_nets(v) {
                assert!(hg.pins(e).contains(&v));
            }
        }
    }

    #[test]
    fn contract_merges_parallel_and_drops_single_pin_nets() {
        let hg = seven_node_fixture();
        // Clusters: {0,2}, {1}, {3,4}, {5,6}
        let clustering = vec![0, 1, 0, 2, 2, 3, 3];
        let coarse = hg.contract(&clustering, 4);
        // Edge {0,2} collapses to a single pin and disappears.
        // Edge {0,1,3,4} -> {0,1,2}; {3,4,6} -> {2,3}; {2,5,6} -> {0,3}.
        assert_eq!(coarse.num_nodes(), 4);
        assert_eq!(coarse.num_edges(), 3);
        assert_eq!(coarse.node_weight(0), 2);
        assert_eq!(coarse.node_weight(2), 2);
        assert_eq!(coarse.pins(0), &[0, 1, 2]);
    }

    #[test]
    fn contract_sums_weights_of_merged_nets() {
        let hg = StaticHypergraph::build(
            vec![1; 4],
            &[vec![0, 1], vec![2, 3], vec![0, 1, 2, 3]],
            vec![2, 3, 5],
        );
        // Merge {0,1} and {2,3} into two clusters; first two edges become
        // distinct 1-pin edges (dropped), the big edge spans both clusters.
        let coarse = hg.contract(&[0, 0, 1, 1], 2);
        assert_eq!(coarse.num_edges(), 1);
        assert_eq!(coarse.edge_weight(0), 5);

        // Now a case with genuinely parallel coarse edges.
        let hg2 = StaticHypergraph::build(
            vec![1; 4],
            &[vec![0, 2], vec![1, 3], vec![0, 3]],
            vec![2, 3, 7],
        );
        let coarse2 = hg2.contract(&[0, 0, 1, 1], 2);
        // All three edges map to {0,1}.
        assert_eq!(coarse2.num_edges(), 1);
        assert_eq!(coarse2.edge_weight(0), 12);
    }
}
