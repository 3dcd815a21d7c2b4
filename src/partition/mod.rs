//! Concurrent partition state: the partitioned-hypergraph overlay, the
//! connectivity bitsets behind it, objective deltas, and the gain cache.

pub mod bitset;
pub mod gain;
pub mod gain_cache;
pub mod partitioned_hypergraph;

pub use bitset::ConnectivitySets;
pub use gain::Objective;
pub use gain_cache::GainCache;
pub use partitioned_hypergraph::PartitionedHypergraph;
