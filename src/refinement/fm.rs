//! Localized FM with gain recomputation and best-prefix rollback.
//!
//! Workers claim border seeds through an atomic node tracker and run
//! bounded searches. A search keeps one max-heap of movable vertices per
//! block plus a block heap keyed by the best vertex gain, pops the
//! globally best candidate, recomputes its gain against the live
//! partition (accepting only when the recomputed gain is at least the
//! queued estimate, re-inserting with the corrected key otherwise),
//! commits through the weight-cap gate, and finally rolls back every move
//! behind the best prefix of its move sequence.
//!
//! The constrained strategy admits moves with the balance cap; the
//! unconstrained strategy tolerates a bounded overshoot and runs a
//! rebalancing pass afterwards, falling back to the pre-round partition
//! when the result is worse or stays infeasible.

use hashbrown::HashMap;
use priority_queue::PriorityQueue;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use super::label_propagation::best_target;
use super::rebalance;
use super::{Refiner, TimeBudget};
use crate::hypergraph::{BlockId, Gain, NodeId, NodeWeight, Topology, INVALID_BLOCK};
use crate::parallel::round_rng;
use crate::partition::{GainCache, Objective, PartitionedHypergraph};

/// Search id 0 means "unclaimed".
struct NodeTracker {
    owner: Vec<AtomicU32>,
}

impl NodeTracker {
    fn new(n: usize) -> Self {
        NodeTracker {
            owner: (0..n).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    fn claim(&self, v: NodeId, search: u32) -> bool {
        self.owner[v as usize]
            .compare_exchange(0, search, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    fn owned_by(&self, v: NodeId, search: u32) -> bool {
        self.owner[v as usize].load(Ordering::Acquire) == search
    }

    fn release(&self, v: NodeId) {
        self.owner[v as usize].store(0, Ordering::Release);
    }

    fn reset(&self) {
        for o in &self.owner {
            o.store(0, Ordering::Relaxed);
        }
    }
}

/// Where a search gets its gains: the km1 gain cache in O(1), or a live
/// scan for the cut objective.
#[derive(Clone, Copy)]
enum GainProvider<'a> {
    Cache(&'a GainCache),
    Live(Objective),
}

impl GainProvider<'_> {
    fn best<H: Topology>(
        &self,
        phg: &PartitionedHypergraph<H>,
        v: NodeId,
    ) -> Option<(BlockId, Gain)> {
        match *self {
            GainProvider::Live(objective) => best_target(phg, v, objective),
            GainProvider::Cache(cache) => {
                let own = phg.part_id(v);
                let mut best = INVALID_BLOCK;
                let mut best_gain = Gain::MIN;
                let mut best_weight = NodeWeight::MAX;
                for p in 0..phg.k() as BlockId {
                    if p == own {
                        continue;
                    }
                    let gain = cache.gain(v, p);
                    let weight = phg.part_weight(p);
                    if gain > best_gain || (gain == best_gain && weight < best_weight) {
                        best = p;
                        best_gain = gain;
                        best_weight = weight;
                    }
                }
                (best != INVALID_BLOCK).then_some((best, best_gain))
            }
        }
    }
}

pub struct FmRefiner {
    objective: Objective,
    max_part_weight: NodeWeight,
    num_seed_nodes: usize,
    max_moves_per_search: usize,
    num_rounds: usize,
    unconstrained: bool,
    seed: u64,
    sequential: bool,
}

impl FmRefiner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        objective: Objective,
        max_part_weight: NodeWeight,
        num_seed_nodes: usize,
        max_moves_per_search: usize,
        num_rounds: usize,
        unconstrained: bool,
        seed: u64,
        sequential: bool,
    ) -> Self {
        FmRefiner {
            objective,
            max_part_weight,
            num_seed_nodes: num_seed_nodes.max(1),
            max_moves_per_search: max_moves_per_search.max(1),
            num_rounds,
            unconstrained,
            seed,
            sequential,
        }
    }

    /// Overweight tolerated during an unconstrained round.
    fn relaxed_cap(&self) -> NodeWeight {
        self.max_part_weight + self.max_part_weight / 20 + 1
    }
}

struct AppliedMove {
    v: NodeId,
    from: BlockId,
    to: BlockId,
}

/// One bounded search seeded with claimed border vertices. Returns the
/// objective delta of the moves that survived rollback.
#[allow(clippy::too_many_arguments)]
fn localized_search<H: Topology>(
    phg: &PartitionedHypergraph<H>,
    provider: GainProvider<'_>,
    objective: Objective,
    tracker: &NodeTracker,
    search_id: u32,
    seeds: &[NodeId],
    cap: NodeWeight,
    max_moves: usize,
    budget: &TimeBudget,
) -> Gain {
    let k = phg.k();
    let mut vertex_pqs: Vec<PriorityQueue<NodeId, Gain>> =
        (0..k).map(|_| PriorityQueue::new()).collect();
    let mut block_pq: PriorityQueue<BlockId, Gain> = PriorityQueue::new();
    let mut target_of: HashMap<NodeId, BlockId> = HashMap::new();
    let mut claimed_unmoved: Vec<NodeId> = Vec::new();

    let sync_block_pq =
        |block_pq: &mut PriorityQueue<BlockId, Gain>, vertex_pqs: &[PriorityQueue<NodeId, Gain>], b: BlockId| {
            match vertex_pqs[b as usize].peek() {
                Some((_, &g)) => {
                    block_pq.push(b, g);
                }
                None => {
                    block_pq.remove(&b);
                }
            }
        };

    let insert = |v: NodeId,
                      vertex_pqs: &mut Vec<PriorityQueue<NodeId, Gain>>,
                      block_pq: &mut PriorityQueue<BlockId, Gain>,
                      target_of: &mut HashMap<NodeId, BlockId>| {
        if let Some((to, gain)) = provider.best(phg, v) {
            let own = phg.part_id(v);
            vertex_pqs[own as usize].push(v, gain);
            target_of.insert(v, to);
            sync_block_pq(block_pq, vertex_pqs, own);
        }
    };

    for &s in seeds {
        if tracker.claim(s, search_id) {
            claimed_unmoved.push(s);
            insert(s, &mut vertex_pqs, &mut block_pq, &mut target_of);
        }
    }

    let mut moves: Vec<AppliedMove> = Vec::new();
    let mut current_gain = 0;
    let mut best_gain = 0;
    let mut best_prefix = 0;

    while moves.len() < max_moves && !budget.expired() {
        let Some((&from, _)) = block_pq.peek() else {
            break;
        };
        let Some((v, estimate)) = vertex_pqs[from as usize].pop() else {
            block_pq.remove(&from);
            continue;
        };
        sync_block_pq(&mut block_pq, &vertex_pqs, from);
        target_of.remove(&v);

        if phg.part_id(v) != from {
            // Claimed but moved meanwhile by a rollback; re-insert fresh.
            insert(v, &mut vertex_pqs, &mut block_pq, &mut target_of);
            continue;
        }
        let Some((to, live_gain)) = provider.best(phg, v) else {
            continue;
        };
        if live_gain < estimate {
            // Stale key: correct it and retry.
            vertex_pqs[from as usize].push(v, live_gain);
            target_of.insert(v, to);
            sync_block_pq(&mut block_pq, &vertex_pqs, from);
            continue;
        }

        let mut delta = 0;
        let committed = phg.change_node_part_with(v, from, to, cap, |e, we, size, pf, pt| {
            if let GainProvider::Cache(cache) = provider {
                cache.delta_update(phg, v, from, to, e, we, pf, pt);
            }
            delta += objective.delta(we, size, pf, pt);
        });
        if !committed {
            continue;
        }
        if let GainProvider::Cache(cache) = provider {
            cache.recompute_penalty(phg, v);
        }
        claimed_unmoved.retain(|&u| u != v);
        moves.push(AppliedMove { v, from, to });
        current_gain += -delta;
        if current_gain > best_gain {
            best_gain = current_gain;
            best_prefix = moves.len();
        }

        // Refresh keys of queued neighbors and try to grow the search.
        for &e in phg.hypergraph().incident_nets(v) {
            for &u in phg.hypergraph().pins(e) {
                if u == v {
                    continue;
                }
                if tracker.owned_by(u, search_id) {
                    let own = phg.part_id(u);
                    if vertex_pqs[own as usize].get_priority(&u).is_some() {
                        if let Some((to_u, gain_u)) = provider.best(phg, u) {
                            vertex_pqs[own as usize].change_priority(&u, gain_u);
                            target_of.insert(u, to_u);
                            sync_block_pq(&mut block_pq, &vertex_pqs, own);
                        }
                    }
                } else if phg.is_border_node(u) && tracker.claim(u, search_id) {
                    claimed_unmoved.push(u);
                    insert(u, &mut vertex_pqs, &mut block_pq, &mut target_of);
                }
            }
        }
    }

    // Roll back everything behind the best prefix.
    for m in moves.drain(best_prefix..).rev() {
        let undone =
            phg.change_node_part_with(m.v, m.to, m.from, NodeWeight::MAX, |e, we, _, pf, pt| {
                if let GainProvider::Cache(cache) = provider {
                    cache.delta_update(phg, m.v, m.to, m.from, e, we, pf, pt);
                }
            });
        debug_assert!(undone);
        if let GainProvider::Cache(cache) = provider {
            cache.recompute_penalty(phg, m.v);
        }
    }

    // Unmoved nodes become available to other searches again; moved ones
    // stay claimed until the round ends.
    for u in claimed_unmoved {
        tracker.release(u);
    }

    -best_gain
}

impl<H: Topology> Refiner<H> for FmRefiner {
    fn refine(
        &mut self,
        phg: &PartitionedHypergraph<H>,
        _refinement_nodes: &[NodeId],
        gain_cache: Option<&GainCache>,
        budget: &TimeBudget,
    ) -> Gain {
        let n = phg.hypergraph().num_nodes();
        let provider = match (self.objective, gain_cache) {
            (Objective::Km1, Some(cache)) if cache.is_initialized() => GainProvider::Cache(cache),
            _ => GainProvider::Live(self.objective),
        };
        if self.unconstrained {
            // Delta-maintained entries are enough for the constrained
            // strategy; the unconstrained one starts from a full rebuild.
            if let GainProvider::Cache(cache) = provider {
                cache.recompute(phg);
            }
        }
        let tracker = NodeTracker::new(n);
        let cap = if self.unconstrained {
            self.relaxed_cap()
        } else {
            self.max_part_weight
        };
        let snapshot = if self.unconstrained {
            Some(phg.partition_vec())
        } else {
            None
        };
        let objective_before = crate::metrics::objective(phg, self.objective);

        let mut total_delta: Gain = 0;
        for round in 0..self.num_rounds {
            if budget.expired() {
                break;
            }
            let mut border: Vec<NodeId> = (0..n as NodeId)
                .filter(|&v| phg.hypergraph().is_node_enabled(v) && phg.is_border_node(v))
                .collect();
            if border.is_empty() {
                break;
            }
            border.shuffle(&mut round_rng(self.seed, "fm-round", round as u64));
            tracker.reset();

            let round_delta = AtomicI64::new(0);
            let run_search = |(idx, seeds): (usize, &[NodeId])| {
                let search_id = (idx + 1) as u32;
                let delta = localized_search(
                    phg,
                    provider,
                    self.objective,
                    &tracker,
                    search_id,
                    seeds,
                    cap,
                    self.max_moves_per_search,
                    budget,
                );
                round_delta.fetch_add(delta, Ordering::Relaxed);
            };
            if self.sequential {
                border
                    .chunks(self.num_seed_nodes)
                    .enumerate()
                    .for_each(run_search);
            } else {
                let chunks: Vec<(usize, &[NodeId])> =
                    border.chunks(self.num_seed_nodes).enumerate().collect();
                chunks.into_par_iter().for_each(run_search);
            }

            let delta = round_delta.load(Ordering::Relaxed);
            total_delta += delta;
            if delta >= 0 {
                break;
            }
        }

        if self.unconstrained {
            if !crate::metrics::is_balanced(phg, self.max_part_weight) {
                total_delta += rebalance::rebalance(
                    phg,
                    self.objective,
                    self.max_part_weight,
                    self.seed,
                    gain_cache,
                );
            }
            let worse = crate::metrics::objective(phg, self.objective) > objective_before;
            if worse || !crate::metrics::is_balanced(phg, self.max_part_weight) {
                // The overshoot did not pay off: restore the snapshot.
                let snapshot = snapshot.expect("snapshot taken for unconstrained run");
                for (v, &p) in snapshot.iter().enumerate() {
                    if p != INVALID_BLOCK {
                        phg.set_only_node_part(v as NodeId, p);
                    }
                }
                phg.initialize_partition();
                if let Some(cache) = gain_cache {
                    if cache.is_initialized() {
                        cache.recompute(phg);
                    }
                }
                return 0;
            }
        }
        total_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::StaticHypergraph;
    use crate::metrics;

    fn overlay(parts: &[BlockId]) -> PartitionedHypergraph<StaticHypergraph> {
        let hg = StaticHypergraph::build(
            vec![1; 8],
            &[
                vec![0, 1, 2],
                vec![1, 2, 3],
                vec![4, 5, 6],
                vec![5, 6, 7],
                vec![3, 4],
            ],
            vec![2, 2, 2, 2, 1],
        );
        let phg = PartitionedHypergraph::new(2, hg);
        for (v, &p) in parts.iter().enumerate() {
            phg.set_only_node_part(v as NodeId, p);
        }
        phg.initialize_partition();
        phg
    }

    #[test]
    fn improves_a_scrambled_partition() {
        // Optimal split is {0..3} | {4..7}; start scrambled. The cap of 5
        // leaves room to shuttle vertices between the blocks.
        let phg = overlay(&[0, 1, 0, 1, 1, 0, 1, 0]);
        let mut cache = GainCache::new();
        cache.initialize(&phg);
        let before = metrics::km1(&phg);
        let mut fm = FmRefiner::new(Objective::Km1, 5, 4, 50, 3, false, 42, true);
        let delta = fm.refine(&phg, &[], Some(&cache), &TimeBudget::unlimited());
        let after = metrics::km1(&phg);
        assert_eq!(after - before, delta);
        assert!(after < before, "no improvement found: {before} -> {after}");
        assert!(metrics::is_balanced(&phg, 5));
        phg.validate_derived_state().unwrap();
        cache.validate(&phg).unwrap();
    }

    #[test]
    fn respects_the_balance_cap() {
        let phg = overlay(&[0, 0, 0, 0, 1, 1, 1, 1]);
        let mut cache = GainCache::new();
        cache.initialize(&phg);
        let mut fm = FmRefiner::new(Objective::Km1, 4, 4, 50, 2, false, 1, true);
        fm.refine(&phg, &[], Some(&cache), &TimeBudget::unlimited());
        assert!(phg.part_weight(0) <= 4);
        assert!(phg.part_weight(1) <= 4);
    }

    #[test]
    fn works_without_a_cache_for_the_cut_objective() {
        let phg = overlay(&[0, 1, 0, 1, 1, 0, 1, 0]);
        let before = metrics::hyperedge_cut(&phg);
        let mut fm = FmRefiner::new(Objective::Cut, 5, 4, 50, 3, false, 42, true);
        let delta = fm.refine(&phg, &[], None, &TimeBudget::unlimited());
        let after = metrics::hyperedge_cut(&phg);
        assert_eq!(after - before, delta);
        assert!(after < before, "no improvement found: {before} -> {after}");
        assert!(metrics::is_balanced(&phg, 5));
    }

    #[test]
    fn rollback_restores_when_nothing_improves() {
        // Already optimal: any move worsens, the search must undo itself.
        let phg = overlay(&[0, 0, 0, 0, 1, 1, 1, 1]);
        let before_vec = phg.partition_vec();
        let before = metrics::km1(&phg);
        let mut cache = GainCache::new();
        cache.initialize(&phg);
        let mut fm = FmRefiner::new(Objective::Km1, 4, 8, 50, 1, false, 3, true);
        fm.refine(&phg, &[], Some(&cache), &TimeBudget::unlimited());
        assert_eq!(metrics::km1(&phg), before);
        assert_eq!(phg.partition_vec(), before_vec);
        cache.validate(&phg).unwrap();
    }

    #[test]
    fn unconstrained_run_ends_balanced() {
        let phg = overlay(&[0, 1, 0, 1, 1, 0, 1, 0]);
        let mut cache = GainCache::new();
        cache.initialize(&phg);
        let before = metrics::km1(&phg);
        let mut fm = FmRefiner::new(Objective::Km1, 4, 4, 50, 2, true, 9, true);
        fm.refine(&phg, &[], Some(&cache), &TimeBudget::unlimited());
        assert!(metrics::is_balanced(&phg, 4));
        assert!(metrics::km1(&phg) <= before);
        phg.validate_derived_state().unwrap();
    }
}
