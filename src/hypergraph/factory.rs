//! Validated hypergraph construction from user input.
//!
//! The factory checks the preconditions of the public partitioning API
//! (positive weights, in-range pins, monotone offsets), strips single-pin
//! hyperedges and merges parallel hyperedges (identical pin sets) with
//! summed weight before handing a [`StaticHypergraph`] to the pipeline.

use hashbrown::HashMap;

use super::{EdgeWeight, NodeId, NodeWeight, StaticHypergraph};
use crate::error::HypercutError;

/// What construction removed, for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovedNets {
    pub single_pin: usize,
    pub parallel: usize,
}

pub struct HypergraphFactory;

impl HypergraphFactory {
    /// Construct from per-edge pin lists. Weights default to 1 when the
    /// corresponding vector is empty.
    pub fn construct(
        num_nodes: usize,
        edge_pin_lists: Vec<Vec<NodeId>>,
        edge_weights: Vec<EdgeWeight>,
        node_weights: Vec<NodeWeight>,
    ) -> Result<(StaticHypergraph, RemovedNets), HypercutError> {
        let m = edge_pin_lists.len();
        let edge_weights = if edge_weights.is_empty() {
            vec![1; m]
        } else {
            edge_weights
        };
        let node_weights = if node_weights.is_empty() {
            vec![1; num_nodes]
        } else {
            node_weights
        };
        if edge_weights.len() != m {
            return Err(HypercutError::InconsistentIncidence(format!(
                "{} edge weights for {} edges",
                edge_weights.len(),
                m
            )));
        }
        if node_weights.len() != num_nodes {
            return Err(HypercutError::InconsistentIncidence(format!(
                "{} node weights for {} nodes",
                node_weights.len(),
                num_nodes
            )));
        }
        for (v, &w) in node_weights.iter().enumerate() {
            if w <= 0 {
                return Err(HypercutError::NonpositiveWeight {
                    entity: "vertex",
                    id: v as u64,
                });
            }
        }
        for (e, &w) in edge_weights.iter().enumerate() {
            if w <= 0 {
                return Err(HypercutError::NonpositiveWeight {
                    entity: "hyperedge",
                    id: e as u64,
                });
            }
        }
        for (e, pins) in edge_pin_lists.iter().enumerate() {
            for &p in pins {
                if p as usize >= num_nodes {
                    return Err(HypercutError::InconsistentIncidence(format!(
                        "pin {} of hyperedge {} out of range (n = {})",
                        p, e, num_nodes
                    )));
                }
            }
        }

        let mut removed = RemovedNets::default();
        let mut kept_pins: Vec<Vec<NodeId>> = Vec::with_capacity(m);
        let mut kept_weights: Vec<EdgeWeight> = Vec::with_capacity(m);
        let mut net_of_key: HashMap<Vec<NodeId>, usize> = HashMap::with_capacity(m);
        for (e, mut pins) in edge_pin_lists.into_iter().enumerate() {
            pins.sort_unstable();
            pins.dedup();
            if pins.len() < 2 {
                removed.single_pin += 1;
                continue;
            }
            match net_of_key.entry(pins) {
                hashbrown::hash_map::Entry::Occupied(slot) => {
                    kept_weights[*slot.get()] += edge_weights[e];
                    removed.parallel += 1;
                }
                hashbrown::hash_map::Entry::Vacant(slot) => {
                    let id = kept_pins.len();
                    kept_pins.push(slot.key().clone());
                    kept_weights.push(edge_weights[e]);
                    slot.insert(id);
                }
            }
        }
        if removed.single_pin > 0 || removed.parallel > 0 {
            log::debug!(
                "construction removed {} single-pin and merged {} parallel hyperedges",
                removed.single_pin,
                removed.parallel
            );
        }

        Ok((
            StaticHypergraph::build(node_weights, &kept_pins, kept_weights),
            removed,
        ))
    }

    /// Construct from the flat CSR buffers of the array-based API.
    /// `edge_offsets` must be monotone nondecreasing with `offsets[0] = 0`.
    pub fn construct_from_arrays(
        num_nodes: usize,
        num_edges: usize,
        edge_offsets: &[usize],
        edge_pins: &[NodeId],
        edge_weights: &[EdgeWeight],
        node_weights: &[NodeWeight],
    ) -> Result<(StaticHypergraph, RemovedNets), HypercutError> {
        if edge_offsets.len() != num_edges + 1 || edge_offsets[0] != 0 {
            return Err(HypercutError::InconsistentIncidence(
                "edge offsets must have m+1 entries starting at 0".into(),
            ));
        }
        for e in 0..num_edges {
            if edge_offsets[e + 1] < edge_offsets[e] {
                return Err(HypercutError::InconsistentIncidence(format!(
                    "edge offsets decrease at position {}",
                    e + 1
                )));
            }
        }
        if *edge_offsets.last().unwrap() != edge_pins.len() {
            return Err(HypercutError::InconsistentIncidence(
                "final edge offset does not match pin array length".into(),
            ));
        }
        let pin_lists: Vec<Vec<NodeId>> = (0..num_edges)
            .map(|e| edge_pins[edge_offsets[e]..edge_offsets[e + 1]].to_vec())
            .collect();
        Self::construct(
            num_nodes,
            pin_lists,
            edge_weights.to_vec(),
            node_weights.to_vec(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nonpositive_weights() {
        let err = HypergraphFactory::construct(2, vec![vec![0, 1]], vec![1], vec![1, 0]);
        assert!(matches!(
            err,
            Err(HypercutError::NonpositiveWeight {
                entity: "vertex",
                id: 1
            })
        ));
        let err = HypergraphFactory::construct(2, vec![vec![0, 1]], vec![-3], vec![1, 1]);
        assert!(matches!(
            err,
            Err(HypercutError::NonpositiveWeight {
                entity: "hyperedge",
                id: 0
            })
        ));
    }

    #[test]
    fn rejects_out_of_range_pins() {
        let err = HypergraphFactory::construct(2, vec![vec![0, 5]], vec![1], vec![1, 1]);
        assert!(matches!(err, Err(HypercutError::InconsistentIncidence(_))));
    }

    #[test]
    fn strips_single_pin_and_merges_parallel_nets() {
        let (hg, removed) = HypergraphFactory::construct(
            4,
            vec![vec![0], vec![0, 1], vec![1, 0], vec![2, 3]],
            vec![1, 2, 3, 4],
            vec![1; 4],
        )
        .unwrap();
        assert_eq!(removed.single_pin, 1);
        assert_eq!(removed.parallel, 1);
        assert_eq!(hg.num_edges(), 2);
        assert_eq!(hg.edge_weight(0), 5); // 2 + 3 merged
        assert_eq!(hg.edge_weight(1), 4);
    }

    #[test]
    fn array_construction_validates_offsets() {
        let err = HypergraphFactory::construct_from_arrays(
            3,
            2,
            &[0, 3, 2],
            &[0, 1, 2, 1],
            &[1, 1],
            &[1, 1, 1],
        );
        assert!(matches!(err, Err(HypercutError::InconsistentIncidence(_))));

        let (hg, _) = HypergraphFactory::construct_from_arrays(
            3,
            2,
            &[0, 2, 4],
            &[0, 1, 1, 2],
            &[1, 1],
            &[1, 1, 1],
        )
        .unwrap();
        assert_eq!(hg.num_edges(), 2);
        assert_eq!(hg.pins(1), &[1, 2]);
    }
}
