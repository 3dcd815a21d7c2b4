//! Partition quality metrics.
//!
//! All metrics are pure functions of the partition overlay and recompute
//! from the tracked pin counts; they are O(E) and intended for phase
//! boundaries, reporting and tests, not inner loops.

use rayon::prelude::*;

use crate::hypergraph::{EdgeId, Gain, NodeWeight, Topology};
use crate::partition::{Objective, PartitionedHypergraph};

/// Total weight of hyperedges spanning at least two blocks.
pub fn hyperedge_cut<H: Topology>(phg: &PartitionedHypergraph<H>) -> Gain {
    (0..phg.hypergraph().num_edges() as EdgeId)
        .into_par_iter()
        .map(|e| {
            if phg.connectivity(e) >= 2 {
                phg.hypergraph().edge_weight(e)
            } else {
                0
            }
        })
        .sum()
}

/// Connectivity metric Σ_e ω(e)·(λ(e)−1).
pub fn km1<H: Topology>(phg: &PartitionedHypergraph<H>) -> Gain {
    (0..phg.hypergraph().num_edges() as EdgeId)
        .into_par_iter()
        .map(|e| {
            let lambda = phg.connectivity(e) as Gain;
            if lambda > 1 {
                phg.hypergraph().edge_weight(e) * (lambda - 1)
            } else {
                0
            }
        })
        .sum()
}

/// The configured objective.
pub fn objective<H: Topology>(phg: &PartitionedHypergraph<H>, obj: Objective) -> Gain {
    match obj {
        Objective::Km1 => km1(phg),
        Objective::Cut => hyperedge_cut(phg),
    }
}

/// Maximum admissible block weight L_max = ⌈(1+ε)·W/k⌉.
pub fn max_part_weight(total_weight: NodeWeight, k: usize, epsilon: f64) -> NodeWeight {
    ((1.0 + epsilon) * total_weight as f64 / k as f64).ceil() as NodeWeight
}

/// max_p partWeight[p] / (W/k) − 1.
pub fn imbalance<H: Topology>(phg: &PartitionedHypergraph<H>) -> f64 {
    let k = phg.k();
    let total = phg.hypergraph().total_weight();
    let heaviest = (0..k as u32)
        .map(|p| phg.part_weight(p))
        .max()
        .unwrap_or(0);
    heaviest as f64 / (total as f64 / k as f64) - 1.0
}

/// True iff every block respects L_max.
pub fn is_balanced<H: Topology>(phg: &PartitionedHypergraph<H>, max_weight: NodeWeight) -> bool {
    (0..phg.k() as u32).all(|p| phg.part_weight(p) <= max_weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::StaticHypergraph;

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
    fn cut_and_km1_on_fixture() {
        let phg = overlay();
        // Edges 1, 2, 3 are cut; edge 0 is internal to block 0.
        assert_eq!(hyperedge_cut(&phg), 3);
        // λ = (1, 2, 2, 2) → km1 = 0 + 1 + 1 + 1.
        assert_eq!(km1(&phg), 3);
        assert_eq!(objective(&phg, Objective::Cut), 3);
        assert_eq!(objective(&phg, Objective::Km1), 3);
    }

    #[test]
    fn max_part_weight_rounds_up() {
        assert_eq!(max_part_weight(7, 3, 0.0), 3);
        assert_eq!(max_part_weight(7, 3, 0.03), 3);
        assert_eq!(max_part_weight(100, 4, 0.05), 27);
    }

    #[test]
    fn balance_checks() {
        let phg = overlay();
        assert!(is_balanced(&phg, 3));
        assert!(!is_balanced(&phg, 2));
        let imb = imbalance(&phg);
        assert!((imb - (3.0 / (7.0 / 3.0) - 1.0)).abs() < 1e-9);
    }
}
