//! Initial partitioning: a portfolio of seed algorithms runs on the
//! coarsest hypergraph, the best feasible candidate wins.

pub mod algorithms;
pub mod pool;

pub use pool::pool_initial_partition;
