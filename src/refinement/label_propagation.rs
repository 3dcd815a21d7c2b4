//! Parallel label propagation.
//!
//! Rounds over the active set (border nodes, or every node in rebalance
//! mode). Each round shuffles the set with a round-seeded RNG, computes
//! per node the best target block from the live pin counts, and commits
//! through `change_node_part_with` with the balance cap. Moving a node
//! activates its neighbors for the next round through one-shot
//! compare-and-set flags. In deterministic mode the round is executed
//! sequentially in the shuffled order, making the result a pure function
//! of (input, seed).
//!
//! Committed moves whose measured delta turns out positive (a concurrent
//! neighbor move invalidated the estimate) are undone on the spot, so the
//! total reported delta never exceeds zero.

use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use super::{Refiner, TimeBudget};
use crate::hypergraph::{BlockId, Gain, NodeId, NodeWeight, Topology, INVALID_BLOCK};
use crate::parallel::round_rng;
use crate::partition::{GainCache, Objective, PartitionedHypergraph};
use parking_lot::Mutex;

pub struct LabelPropagationRefiner {
    objective: Objective,
    max_part_weight: NodeWeight,
    maximum_iterations: usize,
    seed: u64,
    sequential: bool,
    /// Activate every node and allow negative-gain moves out of
    /// overweight blocks.
    rebalance: bool,
}

impl LabelPropagationRefiner {
    pub fn new(
        objective: Objective,
        max_part_weight: NodeWeight,
        maximum_iterations: usize,
        seed: u64,
        sequential: bool,
    ) -> Self {
        LabelPropagationRefiner {
            objective,
            max_part_weight,
            maximum_iterations,
            seed,
            sequential,
            rebalance: false,
        }
    }

    pub fn rebalancing(mut self) -> Self {
        self.rebalance = true;
        self
    }

    fn initial_active_nodes<H: Topology>(
        &self,
        phg: &PartitionedHypergraph<H>,
        refinement_nodes: &[NodeId],
    ) -> Vec<NodeId> {
        if !refinement_nodes.is_empty() {
            return refinement_nodes.to_vec();
        }
        let n = phg.hypergraph().num_nodes() as NodeId;
        (0..n)
            .filter(|&v| {
                phg.hypergraph().is_node_enabled(v) && (self.rebalance || phg.is_border_node(v))
            })
            .collect()
    }

    /// One attempted move. Returns the measured objective delta of the
    /// committed (and possibly undone) move, or `None` if nothing moved.
    fn move_node<H: Topology>(
        &self,
        phg: &PartitionedHypergraph<H>,
        gain_cache: Option<&GainCache>,
        v: NodeId,
        next_active: &[AtomicBool],
    ) -> Option<Gain> {
        let own = phg.part_id(v);
        let weight = phg.hypergraph().node_weight(v);
        let overweight = phg.part_weight(own) > self.max_part_weight;
        if self.rebalance && !overweight {
            return None;
        }

        let (to, gain) = best_target(phg, v, self.objective)?;
        let balance_improves =
            phg.part_weight(to) + weight < phg.part_weight(own);
        let acceptable = if self.rebalance && overweight {
            phg.part_weight(to) + weight <= self.max_part_weight
        } else {
            gain > 0 || (gain == 0 && balance_improves)
        };
        if !acceptable {
            return None;
        }

        let mut delta = 0;
        let cap = self.max_part_weight;
        let committed = phg.change_node_part_with(v, own, to, cap, |e, we, size, pf, pt| {
            if let Some(cache) = gain_cache {
                cache.delta_update(phg, v, own, to, e, we, pf, pt);
            }
            delta += self.objective.delta(we, size, pf, pt);
        });
        if !committed {
            return None;
        }
        if let Some(cache) = gain_cache {
            cache.recompute_penalty(phg, v);
        }

        if delta > 0 && !self.rebalance {
            // A concurrent move invalidated the estimate; undo.
            let mut undo_delta = 0;
            let undone =
                phg.change_node_part_with(v, to, own, NodeWeight::MAX, |e, we, size, pf, pt| {
                    if let Some(cache) = gain_cache {
                        cache.delta_update(phg, v, to, own, e, we, pf, pt);
                    }
                    undo_delta += self.objective.delta(we, size, pf, pt);
                });
            debug_assert!(undone);
            if let Some(cache) = gain_cache {
                cache.recompute_penalty(phg, v);
            }
            return Some(delta + undo_delta);
        }

        // Wake the neighborhood.
        for &e in phg.hypergraph().incident_nets(v) {
            for &u in phg.hypergraph().pins(e) {
                let _ = next_active[u as usize].compare_exchange(
                    false,
                    true,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                );
            }
        }
        Some(delta)
    }
}

/// Best target block for `v` with its gain from the live pin counts.
pub(crate) fn best_target<H: Topology>(
    phg: &PartitionedHypergraph<H>,
    v: NodeId,
    objective: Objective,
) -> Option<(BlockId, Gain)> {
    let own = phg.part_id(v);
    let k = phg.k();
    let mut benefit = vec![0 as Gain; k];
    let mut penalty = 0 as Gain;
    for &e in phg.hypergraph().incident_nets(v) {
        let we = phg.hypergraph().edge_weight(e);
        let size = phg.hypergraph().edge_size(e);
        if size < 2 {
            continue;
        }
        match objective {
            Objective::Km1 => {
                for p in phg.connectivity_set(e) {
                    benefit[p as usize] += we;
                }
                if phg.pin_count_in_part(e, own) > 1 {
                    penalty += we;
                }
            }
            Objective::Cut => {
                for p in phg.connectivity_set(e) {
                    if phg.pin_count_in_part(e, p) as usize == size - 1 {
                        benefit[p as usize] += we;
                    }
                }
                if phg.pin_count_in_part(e, own) as usize == size {
                    penalty += we;
                }
            }
        }
    }

    let mut best = INVALID_BLOCK;
    let mut best_gain = Gain::MIN;
    let mut best_weight = NodeWeight::MAX;
    for p in 0..k as BlockId {
        if p == own {
            continue;
        }
        let gain = benefit[p as usize] - penalty;
        let weight = phg.part_weight(p);
        if gain > best_gain || (gain == best_gain && weight < best_weight) {
            best = p;
            best_gain = gain;
            best_weight = weight;
        }
    }
    (best != INVALID_BLOCK).then_some((best, best_gain))
}

impl<H: Topology> Refiner<H> for LabelPropagationRefiner {
    fn refine(
        &mut self,
        phg: &PartitionedHypergraph<H>,
        refinement_nodes: &[NodeId],
        gain_cache: Option<&GainCache>,
        budget: &TimeBudget,
    ) -> Gain {
        let n = phg.hypergraph().num_nodes();
        let mut active = self.initial_active_nodes(phg, refinement_nodes);
        let next_active: Vec<AtomicBool> = (0..n).map(|_| AtomicBool::new(false)).collect();
        let total_delta = AtomicI64::new(0);

        for round in 0..self.maximum_iterations {
            if active.is_empty() || budget.expired() {
                break;
            }
            active.shuffle(&mut round_rng(self.seed, "lp-round", round as u64));

            let moved_any = AtomicBool::new(false);
            let moved_nodes: Mutex<Vec<NodeId>> = Mutex::new(Vec::new());
            let process = |&v: &NodeId| {
                if let Some(delta) = self.move_node(phg, gain_cache, v, &next_active) {
                    total_delta.fetch_add(delta, Ordering::Relaxed);
                    moved_any.store(true, Ordering::Relaxed);
                    if gain_cache.is_some() {
                        moved_nodes.lock().push(v);
                    }
                }
            };
            if self.sequential {
                active.iter().for_each(process);
            } else {
                active.par_iter().for_each(process);
            }

            // Force-update pass: moved vertices' penalties against the
            // settled pin counts of this round.
            if let Some(cache) = gain_cache {
                let moved = moved_nodes.into_inner();
                moved.par_iter().for_each(|&v| cache.recompute_penalty(phg, v));
            }

            if !moved_any.load(Ordering::Relaxed) {
                break;
            }
            // Collect the next active set in id order and reset the flags.
            active = (0..n as NodeId)
                .filter(|&v| next_active[v as usize].swap(false, Ordering::AcqRel))
                .collect();
        }

        let delta = total_delta.load(Ordering::Relaxed);
        debug_assert!(
            self.rebalance || delta <= 0,
            "label propagation worsened the objective by {delta}"
        );
        delta
    }
}
