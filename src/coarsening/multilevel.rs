//! Multilevel coarsener: per level, a parallel rating pass proposes a
//! partner for every node, a deterministic sequential sweep resolves the
//! proposals into disjoint matched pairs, and the matched pairs are
//! contracted into the next-coarser hypergraph.
//!
//! The node order is a seeded permutation per level; with the same seed
//! the whole hierarchy is reproducible. Coarsening stops at the
//! contraction limit or when a level shrinks too little.

use rand::seq::SliceRandom;
use rayon::prelude::*;

use super::rating::Rater;
use super::{contraction_limit, max_allowed_node_weight, Level};
use crate::context::Context;
use crate::hypergraph::{NodeId, StaticHypergraph, INVALID_NODE};
use crate::parallel::{derive_salt, round_rng};

/// Build the contraction hierarchy for `finest`. The returned levels are
/// ordered finest-to-coarsest; `levels.last()` holds the coarsest
/// hypergraph.
pub fn coarsen_multilevel(finest: &StaticHypergraph, ctx: &Context) -> Vec<Level> {
    let limit = contraction_limit(ctx);
    let max_cluster_weight = max_allowed_node_weight(finest.total_weight(), ctx);
    let mut levels: Vec<Level> = Vec::new();

    let mut round = 0u64;
    while current(&levels, finest).num_nodes() > limit {
        let hg = current(&levels, finest);
        let before = hg.num_nodes();
        let clustering = match_level(hg, max_cluster_weight, ctx.partition.seed, round);
        let num_clusters = (clustering.iter().copied().max().unwrap_or(0) + 1) as usize;
        if num_clusters == before {
            break; // nothing matched, give up
        }
        let coarse = hg.contract(&clustering, num_clusters);
        let shrink = before as f64 / coarse.num_nodes() as f64;
        levels.push(Level {
            fine_to_coarse: clustering,
            hg: coarse,
        });
        if shrink < ctx.coarsening.minimum_shrink_factor {
            break;
        }
        round += 1;
    }
    log::debug!(
        "coarsened {} nodes to {} over {} levels",
        finest.num_nodes(),
        current(&levels, finest).num_nodes(),
        levels.len()
    );
    levels
}

fn current<'a>(levels: &'a [Level], finest: &'a StaticHypergraph) -> &'a StaticHypergraph {
    levels.last().map(|l| &l.hg).unwrap_or(finest)
}

/// One matching pass. Returns a dense clustering: matched pairs share a
/// cluster id, everything else stays a singleton.
fn match_level(
    hg: &StaticHypergraph,
    max_cluster_weight: crate::hypergraph::NodeWeight,
    seed: u64,
    round: u64,
) -> Vec<NodeId> {
    let n = hg.num_nodes();
    let salt = derive_salt(seed, "matching", round);

    let mut order: Vec<NodeId> = (0..n as NodeId).collect();
    order.shuffle(&mut round_rng(seed, "coarsen-order", round));

    // Parallel proposal phase: a pure function of the level and the seed.
    let proposals: Vec<NodeId> = (0..n as NodeId)
        .into_par_iter()
        .map_init(Rater::new, |rater, u| {
            rater.rate(
                hg,
                u,
                |v| hg.node_weight(v),
                |v| v,
                max_cluster_weight,
                salt,
            )
        })
        .collect();

    // Sequential resolution in permutation order keeps pairs disjoint and
    // the outcome independent of scheduling.
    let mut partner = vec![INVALID_NODE; n];
    for &u in &order {
        if partner[u as usize] != INVALID_NODE {
            continue;
        }
        let v = proposals[u as usize];
        if v != INVALID_NODE && partner[v as usize] == INVALID_NODE {
            partner[u as usize] = v;
            partner[v as usize] = u;
        }
    }

    // Dense cluster ids in node order: the smaller endpoint names the pair.
    let mut clustering = vec![0 as NodeId; n];
    let mut next = 0 as NodeId;
    for v in 0..n as NodeId {
        let p = partner[v as usize];
        if p != INVALID_NODE && p < v {
            clustering[v as usize] = clustering[p as usize];
        } else {
            clustering[v as usize] = next;
            next += 1;
        }
    }
    clustering
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn chain(n: usize) -> StaticHypergraph {
        let edges: Vec<Vec<NodeId>> = (0..n - 1).map(|i| vec![i as NodeId, i as NodeId + 1]).collect();
        StaticHypergraph::build(vec![1; n], &edges, vec![1; n - 1])
    }

    fn test_ctx() -> Context {
        let mut ctx = Context::new();
        ctx.partition.k = 2;
        ctx.partition.epsilon = 0.5;
        ctx.coarsening.contraction_limit_multiplier = 2;
        ctx
    }

    #[test]
    fn coarsens_below_the_contraction_limit() {
        let hg = chain(64);
        let ctx = test_ctx();
        let levels = coarsen_multilevel(&hg, &ctx);
        assert!(!levels.is_empty());
        let coarsest = &levels.last().unwrap().hg;
        assert!(coarsest.num_nodes() <= 8, "still {} nodes", coarsest.num_nodes());
        // Total weight is preserved through every level.
        for level in &levels {
            assert_eq!(level.hg.total_weight(), hg.total_weight());
        }
    }

    #[test]
    fn mappings_compose() {
        let hg = chain(32);
        let ctx = test_ctx();
        let levels = coarsen_multilevel(&hg, &ctx);
        // Project every finest node through the hierarchy; ids must be
        // in range at each step.
        for v in 0..hg.num_nodes() {
            let mut id = v;
            for level in &levels {
                id = level.fine_to_coarse[id] as usize;
                assert!(id < level.hg.num_nodes());
            }
        }
    }

    #[test]
    fn same_seed_same_hierarchy() {
        let hg = chain(48);
        let ctx = test_ctx();
        let a = coarsen_multilevel(&hg, &ctx);
        let b = coarsen_multilevel(&hg, &ctx);
        assert_eq!(a.len(), b.len());
        for (la, lb) in a.iter().zip(b.iter()) {
            assert_eq!(la.fine_to_coarse, lb.fine_to_coarse);
        }
    }

    #[test]
    fn weight_cap_blocks_matching() {
        let hg = StaticHypergraph::build(
            vec![100; 4],
            &[vec![0, 1], vec![1, 2], vec![2, 3]],
            vec![1; 3],
        );
        // Any pair would weigh 200; a cap of 120 forbids every match.
        let clustering = match_level(&hg, 120, 11, 0);
        assert_eq!(clustering, vec![0, 1, 2, 3]);
        // A cap of 200 admits pairs, and cluster weights stay within it.
        let clustering = match_level(&hg, 200, 11, 0);
        let num_clusters = (clustering.iter().copied().max().unwrap() + 1) as usize;
        let coarse = hg.contract(&clustering, num_clusters);
        for v in 0..coarse.num_nodes() {
            assert!(coarse.node_weight(v as NodeId) <= 200);
        }
        assert!(coarse.num_nodes() < 4);
    }
}
