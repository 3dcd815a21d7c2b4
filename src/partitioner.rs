//! The multilevel pipeline: preprocess → coarsen → initial partition →
//! uncoarsen with refinement, plus optional v-cycles that re-run the
//! pipeline with the current partition as a contraction constraint.

use std::time::{Duration, Instant};

use crate::coarsening::{coarsen_multilevel, coarsen_nlevel, Level};
use crate::community::detect_communities;
use crate::context::Context;
use crate::error::HypercutError;
use crate::hypergraph::{
    BlockId, CommunityId, NodeId, NodeWeight, StaticHypergraph, Topology, INVALID_NODE,
};
use crate::initial::pool::flat_objective;
use crate::initial::pool_initial_partition;
use crate::metrics;
use crate::partition::{GainCache, Objective, PartitionedHypergraph};
use crate::refinement::{
    FlowRefiner, FmRefiner, LabelPropagationRefiner, Refiner, TimeBudget,
};

/// Partition `hg` according to `ctx`. Returns the partitioned overlay of
/// the input hypergraph; the balance postcondition
/// `partWeight[p] ≤ ⌈(1+ε)·W/k⌉` holds for every block.
pub fn partition(
    mut hg: StaticHypergraph,
    ctx: &Context,
) -> Result<PartitionedHypergraph<StaticHypergraph>, HypercutError> {
    ctx.validate()?;
    let k = ctx.partition.k as usize;

    if ctx.preprocessing.use_community_detection {
        let communities = detect_communities(
            &hg,
            ctx.preprocessing.max_louvain_rounds,
            ctx.partition.seed,
            ctx.shared.deterministic,
        );
        hg.set_communities(communities);
    }

    let mut flat = if ctx.coarsening.nlevel {
        nlevel_pass(&hg, ctx)?
    } else {
        multilevel_pass(&hg, ctx, false)?
    };

    for cycle in 0..ctx.partition.num_vcycles {
        let before = flat_objective(&hg, &flat, ctx.partition.objective);
        hg.set_communities(flat.iter().map(|&p| p as CommunityId).collect());
        let candidate = multilevel_pass(&hg, ctx, true)?;
        let after = flat_objective(&hg, &candidate, ctx.partition.objective);
        log::debug!("v-cycle {}: objective {} -> {}", cycle, before, after);
        if after <= before {
            flat = candidate;
        }
    }
    hg.clear_communities();

    let phg = PartitionedHypergraph::new(k, hg);
    for (v, &p) in flat.iter().enumerate() {
        phg.set_only_node_part(v as NodeId, p);
    }
    phg.initialize_partition();
    debug_assert!(phg.validate_derived_state().is_ok());

    let max_weight = metrics::max_part_weight(
        phg.hypergraph().total_weight(),
        k,
        ctx.partition.epsilon,
    );
    if !metrics::is_balanced(&phg, max_weight) {
        // Refiners guarantee feasibility; reaching this means an invariant
        // broke upstream.
        return Err(HypercutError::Internal(
            "final partition violates the balance constraint".into(),
        ));
    }
    Ok(phg)
}

/// One full multilevel pass over `finest`, returning its flat partition.
/// In a v-cycle, matching is already restricted by the community ids and
/// the coarsest partition is read off them instead of the pool.
fn multilevel_pass(
    finest: &StaticHypergraph,
    ctx: &Context,
    vcycle: bool,
) -> Result<Vec<BlockId>, HypercutError> {
    let k = ctx.partition.k as usize;
    let coarsen_start = Instant::now();
    let mut levels: Vec<Level> = coarsen_multilevel(finest, ctx);
    let level_time_limit = refinement_time_limit(ctx, coarsen_start.elapsed());

    let coarsest = levels.last().map(|l| &l.hg).unwrap_or(finest);
    let mut flat: Vec<BlockId> = if vcycle {
        (0..coarsest.num_nodes() as NodeId)
            .map(|v| coarsest.community(v) as BlockId)
            .collect()
    } else {
        pool_initial_partition(coarsest, ctx)?
    };

    let max_weight =
        metrics::max_part_weight(finest.total_weight(), k, ctx.partition.epsilon);
    let mut gain_cache = (ctx.partition.objective == Objective::Km1).then(GainCache::new);

    // Uncoarsen: refine each level, then project to the next-finer one.
    while let Some(level) = levels.pop() {
        let phg = PartitionedHypergraph::new(k, level.hg);
        apply_flat(&phg, &flat);
        refine_level(&phg, ctx, gain_cache.as_mut(), max_weight, level_time_limit);
        let finer_nodes = levels
            .last()
            .map(|l| l.hg.num_nodes())
            .unwrap_or(finest.num_nodes());
        flat = (0..finer_nodes)
            .map(|v| phg.part_id(level.fine_to_coarse[v]))
            .collect();
    }

    // Final refinement on the input hypergraph itself.
    let phg = PartitionedHypergraph::new(k, finest.clone());
    apply_flat(&phg, &flat);
    refine_level(&phg, ctx, gain_cache.as_mut(), max_weight, level_time_limit);
    Ok(phg.partition_vec())
}

/// N-level pass: reversible single contractions, batched uncontraction
/// with localized label propagation, full refinement at the end.
fn nlevel_pass(finest: &StaticHypergraph, ctx: &Context) -> Result<Vec<BlockId>, HypercutError> {
    let k = ctx.partition.k as usize;
    let coarsen_start = Instant::now();
    let (dyn_hg, mementos) = coarsen_nlevel(finest, ctx);
    let time_limit = refinement_time_limit(ctx, coarsen_start.elapsed());

    let (snapshot, mapping) = dyn_hg.snapshot();
    let coarse_flat = pool_initial_partition(&snapshot, ctx)?;

    let mut phg = PartitionedHypergraph::new(k, dyn_hg);
    for v in 0..finest.num_nodes() as NodeId {
        if mapping[v as usize] != INVALID_NODE {
            phg.set_only_node_part(v, coarse_flat[mapping[v as usize] as usize]);
        }
    }
    phg.initialize_partition();

    let max_weight =
        metrics::max_part_weight(finest.total_weight(), k, ctx.partition.epsilon);
    let batch_size = (mementos.len() / 16).max(16);
    let budget = TimeBudget::with_limit(time_limit);
    for batch in mementos.rchunks(batch_size) {
        let mut touched: Vec<NodeId> = Vec::with_capacity(2 * batch.len());
        for memento in batch.iter().rev() {
            phg.uncontract(memento);
            touched.push(memento.u);
            touched.push(memento.v);
        }
        if ctx.label_propagation.enabled {
            let mut lp = LabelPropagationRefiner::new(
                ctx.partition.objective,
                max_weight,
                ctx.label_propagation.maximum_iterations,
                ctx.partition.seed,
                ctx.shared.deterministic,
            );
            lp.refine(&phg, &touched, None, &budget);
        }
    }

    let mut gain_cache = (ctx.partition.objective == Objective::Km1).then(GainCache::new);
    refine_level(&phg, ctx, gain_cache.as_mut(), max_weight, time_limit);
    debug_assert!(phg.validate_derived_state().is_ok());
    Ok(phg.partition_vec())
}

fn apply_flat<H: Topology>(phg: &PartitionedHypergraph<H>, flat: &[BlockId]) {
    for (v, &p) in flat.iter().enumerate() {
        phg.set_only_node_part(v as NodeId, p);
    }
    phg.initialize_partition();
}

/// Per-level deadline: `time_limit_factor · k · coarsening time`, at
/// least five seconds.
fn refinement_time_limit(ctx: &Context, coarsen_time: Duration) -> Duration {
    let scaled = coarsen_time.as_secs_f64() * ctx.shared.time_limit_factor * ctx.partition.k as f64;
    Duration::from_secs_f64(scaled.max(5.0))
}

/// Run the configured refiners in order {LP, FM, flows}.
fn refine_level<H: Topology>(
    phg: &PartitionedHypergraph<H>,
    ctx: &Context,
    gain_cache: Option<&mut GainCache>,
    max_weight: NodeWeight,
    time_limit: Duration,
) {
    let budget = TimeBudget::with_limit(time_limit);
    let cache: Option<&GainCache> = match gain_cache {
        Some(cache) => {
            cache.initialize(phg);
            Some(cache)
        }
        None => None,
    };

    if ctx.label_propagation.enabled {
        let mut lp = LabelPropagationRefiner::new(
            ctx.partition.objective,
            max_weight,
            ctx.label_propagation.maximum_iterations,
            ctx.partition.seed,
            ctx.shared.deterministic,
        );
        lp.refine(phg, &[], cache, &budget);
    }
    if ctx.fm.enabled {
        let mut fm = FmRefiner::new(
            ctx.partition.objective,
            max_weight,
            ctx.fm.num_seed_nodes,
            ctx.fm.max_moves_per_search,
            ctx.fm.num_rounds,
            ctx.fm.unconstrained,
            ctx.partition.seed,
            ctx.shared.deterministic,
        );
        fm.refine(phg, &[], cache, &budget);
    }
    if ctx.flow.enabled {
        let mut flow = FlowRefiner::new(
            ctx.partition.objective,
            max_weight,
            ctx.partition.epsilon,
            ctx.flow.region_scaling,
            ctx.flow.most_balanced_cut,
        );
        flow.refine(phg, &[], cache, &budget);
    }
    #[cfg(feature = "strict-invariants")]
    {
        phg.validate_derived_state()
            .expect("derived state drifted during refinement");
        if let Some(cache) = cache {
            cache.validate(phg).expect("gain cache drifted");
        }
    }
}

/// Array-based convenience mirroring the C-style interface: CSR hyperedge
/// buffers in, `(objective, partition)` out.
#[allow(clippy::too_many_arguments)]
pub fn partition_from_arrays(
    num_nodes: usize,
    num_edges: usize,
    epsilon: f64,
    k: u32,
    seed: u64,
    node_weights: &[NodeWeight],
    edge_weights: &[crate::hypergraph::EdgeWeight],
    edge_offsets: &[usize],
    edge_pins: &[NodeId],
    ctx: &Context,
) -> Result<(crate::hypergraph::Gain, Vec<BlockId>), HypercutError> {
    let mut ctx = ctx.clone();
    ctx.partition.k = k;
    ctx.partition.epsilon = epsilon;
    ctx.partition.seed = seed;
    ctx.validate()?;

    let (hg, _removed) = crate::hypergraph::HypergraphFactory::construct_from_arrays(
        num_nodes,
        num_edges,
        edge_offsets,
        edge_pins,
        edge_weights,
        node_weights,
    )?;
    let phg = partition(hg, &ctx)?;
    let objective = metrics::objective(&phg, ctx.partition.objective);
    Ok((objective, phg.partition_vec()))
}
