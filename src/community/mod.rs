//! Preprocessing: community detection used to bias coarsening.

pub mod louvain;

pub use louvain::detect_communities;
