//! Objective functions and their per-edge move deltas.
//!
//! The delta of a move is accumulated edge-by-edge through the hook that
//! [`super::PartitionedHypergraph::change_node_part_with`] invokes with the
//! pin counts *after* the move. Negative delta = the objective improved.

use crate::hypergraph::{EdgeWeight, Gain};

/// The optimization objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Objective {
    /// Connectivity metric: Σ_e ω(e)·(λ(e)−1).
    #[default]
    Km1,
    /// Hyperedge cut: Σ_{e : λ(e)≥2} ω(e).
    Cut,
}

impl Objective {
    /// Objective change contributed by one edge when a single pin moved
    /// from `from` to `to`, given the counts in both blocks after the
    /// move. `pin_count_in_from_after == |e|−1` can only arise when the
    /// edge was entirely inside `from`; `pin_count_in_to_after == |e|`
    /// only when the move made it entirely inside `to`.
    #[inline]
    pub fn delta(
        self,
        edge_weight: EdgeWeight,
        edge_size: usize,
        pin_count_in_from_after: u32,
        pin_count_in_to_after: u32,
    ) -> Gain {
        match self {
            Objective::Km1 => {
                let mut delta = 0;
                if pin_count_in_to_after == 1 {
                    delta += edge_weight;
                }
                if pin_count_in_from_after == 0 {
                    delta -= edge_weight;
                }
                delta
            }
            Objective::Cut => {
                if edge_size < 2 {
                    return 0;
                }
                let mut delta = 0;
                if pin_count_in_from_after as usize == edge_size - 1 {
                    delta += edge_weight;
                }
                if pin_count_in_to_after as usize == edge_size {
                    delta -= edge_weight;
                }
                delta
            }
        }
    }
}

impl std::str::FromStr for Objective {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "km1" => Ok(Objective::Km1),
            "cut" => Ok(Objective::Cut),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Objective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Objective::Km1 => write!(f, "km1"),
            Objective::Cut => write!(f, "cut"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn km1_delta_counts_connectivity_changes() {
        // `to` gains its first pin: λ grows.
        assert_eq!(Objective::Km1.delta(3, 4, 2, 1), 3);
        // `from` loses its last pin: λ shrinks.
        assert_eq!(Objective::Km1.delta(3, 4, 0, 2), -3);
        // Both at once: pure relabeling of the only pin's block.
        assert_eq!(Objective::Km1.delta(3, 4, 0, 1), 0);
        // Neither threshold crossed.
        assert_eq!(Objective::Km1.delta(3, 4, 2, 3), 0);
    }

    #[test]
    fn cut_delta_counts_cut_transitions() {
        // Edge of size 3 fully in `from` loses a pin: becomes cut.
        assert_eq!(Objective::Cut.delta(5, 3, 2, 1), 5);
        // Edge of size 3 becomes entirely contained in `to`.
        assert_eq!(Objective::Cut.delta(5, 3, 0, 3), -5);
        // Interior move of a cut edge.
        assert_eq!(Objective::Cut.delta(5, 3, 1, 2), 0);
        // Size-1 edges never contribute.
        assert_eq!(Objective::Cut.delta(5, 1, 0, 1), 0);
    }

    #[test]
    fn parses_and_prints() {
        assert_eq!("km1".parse::<Objective>().unwrap(), Objective::Km1);
        assert_eq!("cut".parse::<Objective>().unwrap(), Objective::Cut);
        assert!("modularity".parse::<Objective>().is_err());
        assert_eq!(Objective::Cut.to_string(), "cut");
    }
}
