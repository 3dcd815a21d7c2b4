//! # hypercut
//!
//! hypercut is a shared-memory parallel multilevel hypergraph partitioner.
//! It computes a balanced k-way partition of a hypergraph (every block's
//! vertex weight stays within `⌈(1+ε)·W/k⌉`) while minimizing either the
//! hyperedge cut or the connectivity metric `Σ_e ω(e)·(λ(e)−1)`.
//!
//! ## Pipeline
//! - **Preprocessing**: Louvain-style community detection biases coarsening.
//! - **Coarsening**: rating-driven matching contracts the hypergraph level
//!   by level (or one reversible contraction at a time in n-level mode).
//! - **Initial partitioning**: a portfolio of seed algorithms runs on the
//!   coarsest hypergraph; the best balanced candidate wins.
//! - **Uncoarsening**: the partition is projected back level by level and
//!   improved by label propagation, localized FM with a gain cache, and
//!   optionally flow-based refinement on block pairs.
//!
//! ## Usage
//! ```no_run
//! use hypercut::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), HypercutError> {
//! let raw = read_hypergraph_from_file(Path::new("input.hgr"), FileFormat::Hmetis)?;
//! let (hg, _removed) = raw.into_hypergraph()?;
//!
//! let mut ctx = Context::new();
//! ctx.load_preset(Preset::Speed);
//! ctx.set_parameter("NUM_BLOCKS", "8").unwrap();
//! ctx.set_parameter("EPSILON", "0.03").unwrap();
//!
//! let phg = partition(hg, &ctx)?;
//! println!("km1 = {}", metrics::km1(&phg));
//! # Ok(())
//! # }
//! ```
//!
//! Determinism: with the `Deterministic` preset the partition is a pure
//! function of (input, seed, thread count). Runs with different thread
//! counts may produce different, equally valid partitions.

pub mod coarsening;
pub mod community;
pub mod context;
pub mod error;
pub mod hypergraph;
pub mod initial;
pub mod metrics;
pub mod parallel;
pub mod partition;
pub mod partitioner;
pub mod refinement;

pub use context::{Context, Preset};
pub use error::HypercutError;
pub use hypergraph::io::{read_hypergraph_from_file, write_partition_file, FileFormat};
pub use partitioner::{partition, partition_from_arrays};

use rayon::ThreadPool;

/// Build the worker pool for the partitioner, clamping to the available
/// CPUs with a warning. Use [`rayon::ThreadPool::install`] around
/// [`partition`] to run inside it; `num_threads == 0` selects all CPUs.
pub fn initialize_thread_pool(num_threads: usize, seed: u64) -> Result<ThreadPool, HypercutError> {
    parallel::build_seeded_thread_pool(seed, num_threads)
}

/// The most-used types and entry points.
pub mod prelude {
    pub use crate::context::{Context, Preset};
    pub use crate::error::HypercutError;
    pub use crate::hypergraph::io::{
        read_hypergraph_from_file, write_partition_file, FileFormat,
    };
    pub use crate::hypergraph::{
        BlockId, DynamicHypergraph, EdgeId, HypergraphFactory, NodeId, StaticHypergraph, Topology,
    };
    pub use crate::metrics;
    pub use crate::partition::{GainCache, Objective, PartitionedHypergraph};
    pub use crate::partitioner::{partition, partition_from_arrays};
}
