//! Rebalancing after an unconstrained FM round: label propagation in
//! rebalance mode drains overweight blocks into feasible ones, accepting
//! the least-damaging targets.

use super::label_propagation::LabelPropagationRefiner;
use super::{Refiner, TimeBudget};
use crate::hypergraph::{Gain, NodeWeight, Topology};
use crate::partition::{GainCache, Objective, PartitionedHypergraph};

const REBALANCE_ROUNDS: usize = 10;

/// Returns the objective delta of the rebalancing moves (may be positive;
/// restoring balance is allowed to cost quality).
pub fn rebalance<H: Topology>(
    phg: &PartitionedHypergraph<H>,
    objective: Objective,
    max_part_weight: NodeWeight,
    seed: u64,
    gain_cache: Option<&GainCache>,
) -> Gain {
    let mut lp = LabelPropagationRefiner::new(
        objective,
        max_part_weight,
        REBALANCE_ROUNDS,
        seed,
        true,
    )
    .rebalancing();
    lp.refine(phg, &[], gain_cache, &TimeBudget::unlimited())
}
