//! N-level coarsener: single contractions in a globally chosen order,
//! each recorded for exact reversal during uncoarsening.
//!
//! Nodes are visited in a seeded permutation; each visit contracts the
//! best-rated partner into the visited node if both are still enabled and
//! the pair respects the cluster weight cap. A pass over all nodes is
//! repeated until the contraction limit is reached or no contraction is
//! possible.

use rand::seq::SliceRandom;

use super::{contraction_limit, max_allowed_node_weight};
use crate::context::Context;
use crate::hypergraph::{
    ContractionMemento, DynamicHypergraph, NodeId, StaticHypergraph, INVALID_NODE,
};
use crate::parallel::{derive_salt, round_rng};
use ahash::AHasher;
use hashbrown::HashMap;
use std::hash::Hasher;

/// Contract `finest` down to the contraction limit. Returns the dynamic
/// hypergraph in its coarsest state together with the contraction
/// sequence (in application order).
pub fn coarsen_nlevel(
    finest: &StaticHypergraph,
    ctx: &Context,
) -> (DynamicHypergraph, Vec<ContractionMemento>) {
    let mut hg = DynamicHypergraph::from_static(finest);
    let limit = contraction_limit(ctx);
    let max_cluster_weight = max_allowed_node_weight(finest.total_weight(), ctx);
    let communities: Vec<u32> = (0..finest.num_nodes() as NodeId)
        .map(|v| finest.community(v))
        .collect();

    let mut mementos = Vec::new();
    let mut pass = 0u64;
    'outer: loop {
        let mut order: Vec<NodeId> = hg.enabled_nodes().collect();
        order.shuffle(&mut round_rng(ctx.partition.seed, "nlevel-order", pass));
        let salt = derive_salt(ctx.partition.seed, "nlevel", pass);
        let mut contracted_this_pass = false;

        for u in order {
            if hg.num_enabled_nodes() <= limit {
                break 'outer;
            }
            if !hg.is_enabled(u) {
                continue;
            }
            let v = best_partner(&hg, &communities, u, max_cluster_weight, salt);
            if v == INVALID_NODE {
                continue;
            }
            let memento = hg
                .contract(u, v)
                .expect("partner was checked to be enabled");
            mementos.push(memento);
            contracted_this_pass = true;
        }
        if !contracted_this_pass {
            break;
        }
        pass += 1;
    }
    log::debug!(
        "n-level coarsening: {} contractions down to {} nodes",
        mementos.len(),
        hg.num_enabled_nodes()
    );
    (hg, mementos)
}

/// Heavy-edge rating against the live dynamic hypergraph; same score and
/// tie-break scheme as the multilevel rater.
fn best_partner(
    hg: &DynamicHypergraph,
    communities: &[u32],
    u: NodeId,
    max_cluster_weight: crate::hypergraph::NodeWeight,
    salt: u64,
) -> NodeId {
    let mut scores: HashMap<NodeId, f64> = HashMap::new();
    for &e in hg.incident_nets(u) {
        let size = hg.edge_size(e);
        if size < 2 {
            continue;
        }
        let score = hg.edge_weight(e) as f64 / (size - 1) as f64;
        for &pin in hg.pins(e) {
            if pin != u {
                *scores.entry(pin).or_insert(0.0) += score;
            }
        }
    }
    let own_weight = hg.node_weight(u);
    let mut best = INVALID_NODE;
    let mut best_score = 0.0f64;
    let mut best_hash = u64::MAX;
    for (&v, &score) in scores.iter() {
        if communities[v as usize] != communities[u as usize] {
            continue;
        }
        if own_weight + hg.node_weight(v) > max_cluster_weight {
            continue;
        }
        let mut h = AHasher::default();
        h.write_u64(salt);
        h.write_u32(u.min(v));
        h.write_u32(u.max(v));
        let hash = h.finish();
        if score > best_score || (score == best_score && hash < best_hash) {
            best = v;
            best_score = score;
            best_hash = hash;
        }
    }
    best
}
