//! Louvain-style community detection on the clique expansion.
//!
//! ## Objective (Newman modularity)
//!
//! The hypergraph is read as a weighted graph: every hyperedge `e`
//! contributes an edge of weight `ω(e)/(|e|−1)` between each of its pin
//! pairs, so a pin's weighted degree is `d(v) = Σ_{e∋v} ω(e)`. With
//! `m = Σ_v d(v) / 2` the gain of moving `v` into community `c` is
//!
//!     ΔQ(v→c) = w(v,c)/m − d(v)·vol(c)/(2m²)
//!
//! where `w(v,c)` is the connection weight from `v` into `c` and `vol(c)`
//! the sum of member degrees. A move is taken when the best target beats
//! staying in the current community.
//!
//! Two scheduler modes: the nondeterministic one shuffles and moves in a
//! parallel-for with atomically updated volumes; the synchronous one
//! computes all moves of a sub-round against the sub-round snapshot and
//! then applies them, which makes the result a pure function of
//! (input, seed).

use hashbrown::HashMap;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::hypergraph::{CommunityId, NodeId, StaticHypergraph};
use crate::parallel::round_rng;

const SYNC_SUB_ROUNDS: usize = 16;
/// Stop when a round moves fewer than this fraction of the nodes.
const MIN_MOVED_FRACTION: f64 = 0.01;

/// Atomic f64 built on `AtomicU64` bit patterns; volumes are accumulated
/// concurrently in the nondeterministic scheduler.
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(x: f64) -> Self {
        AtomicF64(AtomicU64::new(x.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn fetch_add(&self, x: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + x).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Detect communities; returns one dense id per node.
pub fn detect_communities(
    hg: &StaticHypergraph,
    max_rounds: usize,
    seed: u64,
    deterministic: bool,
) -> Vec<CommunityId> {
    let n = hg.num_nodes();
    if n == 0 {
        return Vec::new();
    }

    // Clique-expansion degrees; volume bookkeeping in f64.
    let degrees: Vec<f64> = (0..n as NodeId)
        .into_par_iter()
        .map(|v| {
            hg.incident_nets(v)
                .iter()
                .filter(|&&e| hg.edge_size(e) > 1)
                .map(|&e| hg.edge_weight(e) as f64)
                .sum()
        })
        .collect();
    let two_m: f64 = degrees.iter().sum();
    if two_m == 0.0 {
        return (0..n as CommunityId).collect();
    }
    let m = two_m / 2.0;

    let communities: Vec<AtomicUsize> = (0..n).map(AtomicUsize::new).collect();
    let volumes: Vec<AtomicF64> = degrees.iter().map(|&d| AtomicF64::new(d)).collect();

    let mut order: Vec<NodeId> = (0..n as NodeId).collect();
    for round in 0..max_rounds {
        let mut rng = round_rng(seed, "louvain", round as u64);
        order.shuffle(&mut rng);

        let moved = if deterministic {
            synchronous_round(hg, &order, &communities, &volumes, &degrees, m)
        } else {
            parallel_round(hg, &order, &communities, &volumes, &degrees, m)
        };
        if (moved as f64) < MIN_MOVED_FRACTION * n as f64 {
            break;
        }
    }

    compact_ids(&communities)
}

/// Best target community for `v` given the current assignment snapshot
/// reachable through `community_of`. Returns `None` when staying wins.
fn best_move<C>(
    hg: &StaticHypergraph,
    v: NodeId,
    community_of: C,
    volumes: &[AtomicF64],
    degrees: &[f64],
    m: f64,
) -> Option<usize>
where
    C: Fn(NodeId) -> usize,
{
    let own = community_of(v);
    let mut weight_to: HashMap<usize, f64> = HashMap::new();
    for &e in hg.incident_nets(v) {
        let size = hg.edge_size(e);
        if size < 2 {
            continue;
        }
        let w = hg.edge_weight(e) as f64 / (size - 1) as f64;
        for &u in hg.pins(e) {
            if u != v {
                *weight_to.entry(community_of(u)).or_insert(0.0) += w;
            }
        }
    }
    let d_v = degrees[v as usize];
    let vol_own_without_v = volumes[own].load() - d_v;
    let stay_gain = weight_to.get(&own).copied().unwrap_or(0.0) / m
        - d_v * vol_own_without_v / (2.0 * m * m);

    let mut best: Option<(usize, f64)> = None;
    for (&c, &w) in weight_to.iter() {
        if c == own {
            continue;
        }
        let gain = w / m - d_v * volumes[c].load() / (2.0 * m * m);
        if gain > stay_gain {
            match best {
                // Deterministic tie-break on the community id.
                Some((bc, bg)) if gain < bg || (gain == bg && c >= bc) => {}
                _ => best = Some((c, gain)),
            }
        }
    }
    best.map(|(c, _)| c)
}

fn apply_move(
    v: NodeId,
    target: usize,
    communities: &[AtomicUsize],
    volumes: &[AtomicF64],
    degrees: &[f64],
) {
    let d_v = degrees[v as usize];
    let own = communities[v as usize].swap(target, Ordering::AcqRel);
    volumes[own].fetch_add(-d_v);
    volumes[target].fetch_add(d_v);
}

fn parallel_round(
    hg: &StaticHypergraph,
    order: &[NodeId],
    communities: &[AtomicUsize],
    volumes: &[AtomicF64],
    degrees: &[f64],
    m: f64,
) -> usize {
    let moved = AtomicUsize::new(0);
    order.par_iter().for_each(|&v| {
        let community_of = |u: NodeId| communities[u as usize].load(Ordering::Acquire);
        if let Some(target) = best_move(hg, v, community_of, volumes, degrees, m) {
            apply_move(v, target, communities, volumes, degrees);
            moved.fetch_add(1, Ordering::Relaxed);
        }
    });
    moved.load(Ordering::Relaxed)
}

/// Bucketed sub-rounds: moves inside one sub-round are computed against
/// the assignment at sub-round start, then applied in node order.
fn synchronous_round(
    hg: &StaticHypergraph,
    order: &[NodeId],
    communities: &[AtomicUsize],
    volumes: &[AtomicF64],
    degrees: &[f64],
    m: f64,
) -> usize {
    let mut moved = 0;
    let bucket_len = order.len().div_ceil(SYNC_SUB_ROUNDS);
    for bucket in order.chunks(bucket_len.max(1)) {
        let snapshot: Vec<usize> = communities
            .iter()
            .map(|c| c.load(Ordering::Acquire))
            .collect();
        let decisions: Vec<(NodeId, usize)> = bucket
            .par_iter()
            .filter_map(|&v| {
                best_move(hg, v, |u| snapshot[u as usize], volumes, degrees, m)
                    .map(|target| (v, target))
            })
            .collect();
        let mut ordered = decisions;
        ordered.sort_unstable_by_key(|&(v, _)| v);
        for (v, target) in ordered {
            apply_move(v, target, communities, volumes, degrees);
            moved += 1;
        }
    }
    moved
}

fn compact_ids(communities: &[AtomicUsize]) -> Vec<CommunityId> {
    let mut remap: HashMap<usize, CommunityId> = HashMap::new();
    let mut out = Vec::with_capacity(communities.len());
    for c in communities {
        let raw = c.load(Ordering::Acquire);
        let next = remap.len() as CommunityId;
        out.push(*remap.entry(raw).or_insert(next));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::StaticHypergraph;

    /// Two dense groups of four nodes bridged by one light edge.
    fn two_cluster_fixture() -> StaticHypergraph {
        StaticHypergraph::build(
            vec![1; 8],
            &[
                vec![0, 1],
                vec![1, 2],
                vec![2, 3],
                vec![0, 3],
                vec![0, 2],
                vec![4, 5],
                vec![5, 6],
                vec![6, 7],
                vec![4, 7],
                vec![5, 7],
                vec![3, 4],
            ],
            vec![4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 1],
        )
    }

    #[test]
    fn separates_two_clusters() {
        let hg = two_cluster_fixture();
        let comms = detect_communities(&hg, 10, 42, true);
        assert_eq!(comms.len(), 8);
        assert_eq!(comms[0], comms[1]);
        assert_eq!(comms[1], comms[2]);
        assert_eq!(comms[2], comms[3]);
        assert_eq!(comms[4], comms[5]);
        assert_eq!(comms[5], comms[6]);
        assert_eq!(comms[6], comms[7]);
        assert_ne!(comms[0], comms[4]);
    }

    #[test]
    fn deterministic_mode_is_repeatable() {
        let hg = two_cluster_fixture();
        let a = detect_communities(&hg, 10, 7, true);
        let b = detect_communities(&hg, 10, 7, true);
        assert_eq!(a, b);
    }

    #[test]
    fn edgeless_hypergraph_keeps_singletons() {
        let hg = StaticHypergraph::build(vec![1; 4], &[], vec![]);
        let comms = detect_communities(&hg, 5, 0, false);
        assert_eq!(comms, vec![0, 1, 2, 3]);
    }

    #[test]
    fn ids_are_dense_in_both_scheduler_modes() {
        let hg = two_cluster_fixture();
        for deterministic in [true, false] {
            let comms = detect_communities(&hg, 10, 3, deterministic);
            let max = *comms.iter().max().unwrap() as usize;
            let mut seen = vec![false; max + 1];
            for &c in &comms {
                seen[c as usize] = true;
            }
            assert!(seen.iter().all(|&s| s), "deterministic = {deterministic}");
        }
    }
}
