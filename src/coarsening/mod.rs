//! Coarsening: rating-driven matching producing a contraction hierarchy.

pub mod multilevel;
pub mod nlevel;
pub mod rating;

pub use multilevel::coarsen_multilevel;
pub use nlevel::coarsen_nlevel;

use crate::context::Context;
use crate::hypergraph::{NodeId, NodeWeight, StaticHypergraph};

/// One level of the multilevel hierarchy: the coarse hypergraph plus the
/// mapping from the next-finer level's node ids into it.
#[derive(Debug)]
pub struct Level {
    pub fine_to_coarse: Vec<NodeId>,
    pub hg: StaticHypergraph,
}

/// Number of nodes below which coarsening stops.
pub fn contraction_limit(ctx: &Context) -> usize {
    (ctx.coarsening.contraction_limit_multiplier * ctx.partition.k as usize).max(2)
}

/// Per-level cluster weight cap derived from ε, k and the coarsest-size
/// target. No cluster may outgrow a feasible block.
pub fn max_allowed_node_weight(total_weight: NodeWeight, ctx: &Context) -> NodeWeight {
    let limit = contraction_limit(ctx) as f64;
    let from_limit =
        (ctx.coarsening.max_allowed_weight_multiplier * total_weight as f64 / limit).ceil()
            as NodeWeight;
    let block_bound = crate::metrics::max_part_weight(
        total_weight,
        ctx.partition.k as usize,
        ctx.partition.epsilon,
    );
    from_limit.clamp(1, block_bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn weight_cap_respects_block_bound() {
        let mut ctx = Context::new();
        ctx.partition.k = 2;
        ctx.partition.epsilon = 0.1;
        ctx.coarsening.contraction_limit_multiplier = 1;
        // The cap from the contraction limit alone would be W, but a
        // cluster may never exceed L_max.
        let cap = max_allowed_node_weight(100, &ctx);
        assert_eq!(cap, 55);
    }

    #[test]
    fn contraction_limit_scales_with_k() {
        let mut ctx = Context::new();
        ctx.partition.k = 4;
        ctx.coarsening.contraction_limit_multiplier = 160;
        assert_eq!(contraction_limit(&ctx), 640);
    }
}
