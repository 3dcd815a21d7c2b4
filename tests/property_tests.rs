//! Property tests: incremental derived state always equals a from-scratch
//! recomputation, and the gain cache always matches its definition.

use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use hypercut::hypergraph::{BlockId, NodeId, NodeWeight, StaticHypergraph};
use hypercut::partition::{GainCache, Objective, PartitionedHypergraph};

/// Random connected-ish hypergraph from a seed.
fn random_hypergraph(n: usize, m: usize, seed: u64) -> StaticHypergraph {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut pin_lists = Vec::with_capacity(m);
    let mut weights = Vec::with_capacity(m);
    for _ in 0..m {
        let size = rng.gen_range(2..=4.min(n));
        let mut pins: Vec<NodeId> = Vec::with_capacity(size);
        while pins.len() < size {
            let v = rng.gen_range(0..n) as NodeId;
            if !pins.contains(&v) {
                pins.push(v);
            }
        }
        pin_lists.push(pins);
        weights.push(rng.gen_range(1..=5));
    }
    let node_weights: Vec<NodeWeight> = (0..n).map(|_| rng.gen_range(1..=3)).collect();
    StaticHypergraph::build(node_weights, &pin_lists, weights)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn derived_state_survives_random_move_sequences(
        n in 4usize..16,
        m in 2usize..12,
        k in 2usize..5,
        seed in 0u64..1_000,
    ) {
        let hg = random_hypergraph(n, m, seed);
        let phg = PartitionedHypergraph::new(k, hg);
        let mut rng = SmallRng::seed_from_u64(seed ^ 0xABCD);
        for v in 0..n as NodeId {
            phg.set_only_node_part(v, rng.gen_range(0..k) as BlockId);
        }
        phg.initialize_partition();
        phg.validate_derived_state().unwrap();

        // A batch of random attempted moves with a tight cap: some are
        // rejected, none may leave a trace beyond the accepted subset.
        let cap = phg.hypergraph().total_weight() / k as NodeWeight + 2;
        for _ in 0..3 * n {
            let v = rng.gen_range(0..n) as NodeId;
            let from = phg.part_id(v);
            let to = rng.gen_range(0..k) as BlockId;
            if from != to {
                let _ = phg.change_node_part(v, from, to, cap);
            }
        }
        phg.validate_derived_state().unwrap();

        let total: NodeWeight = (0..k as BlockId).map(|p| phg.part_weight(p)).sum();
        prop_assert_eq!(total, phg.hypergraph().total_weight());
    }

    #[test]
    fn gain_cache_matches_recomputation_after_moves(
        n in 4usize..14,
        m in 2usize..10,
        k in 2usize..4,
        seed in 0u64..1_000,
    ) {
        let hg = random_hypergraph(n, m, seed);
        let phg = PartitionedHypergraph::new(k, hg);
        let mut rng = SmallRng::seed_from_u64(seed ^ 0x1234);
        for v in 0..n as NodeId {
            phg.set_only_node_part(v, rng.gen_range(0..k) as BlockId);
        }
        phg.initialize_partition();
        let mut cache = GainCache::new();
        cache.initialize(&phg);
        cache.validate(&phg).unwrap();

        for _ in 0..2 * n {
            let v = rng.gen_range(0..n) as NodeId;
            let from = phg.part_id(v);
            let to = rng.gen_range(0..k) as BlockId;
            if from == to {
                continue;
            }
            let moved = phg.change_node_part_with(
                v,
                from,
                to,
                NodeWeight::MAX,
                |e, we, _, pf, pt| cache.delta_update(&phg, v, from, to, e, we, pf, pt),
            );
            prop_assert!(moved);
            cache.recompute_penalty(&phg, v);
        }
        cache.validate(&phg).unwrap();
    }

    #[test]
    fn predicted_gain_equals_observed_delta(
        n in 4usize..14,
        m in 2usize..10,
        seed in 0u64..1_000,
    ) {
        let k = 3;
        let hg = random_hypergraph(n, m, seed);
        let phg = PartitionedHypergraph::new(k, hg);
        let mut rng = SmallRng::seed_from_u64(seed ^ 0x77);
        for v in 0..n as NodeId {
            phg.set_only_node_part(v, rng.gen_range(0..k) as BlockId);
        }
        phg.initialize_partition();
        let mut cache = GainCache::new();
        cache.initialize(&phg);

        for _ in 0..n {
            let v = rng.gen_range(0..n) as NodeId;
            let from = phg.part_id(v);
            let to = rng.gen_range(0..k) as BlockId;
            if from == to {
                continue;
            }
            let predicted = cache.gain(v, to);
            let mut delta = 0;
            let moved = phg.change_node_part_with(
                v,
                from,
                to,
                NodeWeight::MAX,
                |e, we, size, pf, pt| {
                    cache.delta_update(&phg, v, from, to, e, we, pf, pt);
                    delta += Objective::Km1.delta(we, size, pf, pt);
                },
            );
            prop_assert!(moved);
            cache.recompute_penalty(&phg, v);
            prop_assert_eq!(-predicted, delta);
        }
    }
}
