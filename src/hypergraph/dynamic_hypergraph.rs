//! Contractible hypergraph for the n-level coarsener.
//!
//! Pins are stored per edge as a vector with an active prefix; incident
//! nets per vertex as growable lists. `contract(u, v)` runs in
//! O(|incident nets of v|) and returns a memento; mementos applied in
//! reverse order restore pin order and incident-net lists bit-identically
//! (uncontraction swaps back the exact positions the contraction touched).

use super::{EdgeId, EdgeWeight, NodeId, NodeWeight, StaticHypergraph};
use crate::error::HypercutError;

/// One edge-level effect of a contraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOp {
    /// `u` and `v` were both pins of the edge: `v` was swapped to the end
    /// of the active prefix (from `pos`) and the prefix shrank by one.
    Shrink { e: EdgeId, pos: usize },
    /// Only `v` was a pin: the pin at `pos` was rewritten to `u`, and `e`
    /// was appended to `u`'s incident-net list.
    Replace { e: EdgeId, pos: usize },
}

/// Reversal record for a single contraction.
#[derive(Debug, Clone)]
pub struct ContractionMemento {
    pub u: NodeId,
    pub v: NodeId,
    v_weight: NodeWeight,
    ops: Vec<EdgeOp>,
}

impl ContractionMemento {
    /// Edge-level effects recorded by the contraction, in the order they
    /// were applied.
    pub fn ops(&self) -> &[EdgeOp] {
        &self.ops
    }
}

#[derive(Debug, Clone)]
pub struct DynamicHypergraph {
    node_weights: Vec<NodeWeight>,
    node_enabled: Vec<bool>,
    incident_nets: Vec<Vec<EdgeId>>,
    pins: Vec<Vec<NodeId>>,
    edge_sizes: Vec<usize>,
    edge_weights: Vec<EdgeWeight>,
    num_enabled_nodes: usize,
    total_weight: NodeWeight,
}

impl DynamicHypergraph {
    pub fn from_static(hg: &StaticHypergraph) -> Self {
        let n = hg.num_nodes();
        let m = hg.num_edges();
        DynamicHypergraph {
            node_weights: (0..n).map(|v| hg.node_weight(v as NodeId)).collect(),
            node_enabled: vec![true; n],
            incident_nets: (0..n)
                .map(|v| hg.incident_nets(v as NodeId).to_vec())
                .collect(),
            pins: (0..m).map(|e| hg.pins(e as EdgeId).to_vec()).collect(),
            edge_sizes: (0..m).map(|e| hg.edge_size(e as EdgeId)).collect(),
            edge_weights: (0..m).map(|e| hg.edge_weight(e as EdgeId)).collect(),
            num_enabled_nodes: n,
            total_weight: hg.total_weight(),
        }
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.node_weights.len()
    }

    #[inline]
    pub fn num_enabled_nodes(&self) -> usize {
        self.num_enabled_nodes
    }

    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edge_weights.len()
    }

    #[inline]
    pub fn total_weight(&self) -> NodeWeight {
        self.total_weight
    }

    #[inline]
    pub fn is_enabled(&self, v: NodeId) -> bool {
        self.node_enabled[v as usize]
    }

    #[inline]
    pub fn node_weight(&self, v: NodeId) -> NodeWeight {
        self.node_weights[v as usize]
    }

    #[inline]
    pub fn edge_weight(&self, e: EdgeId) -> EdgeWeight {
        self.edge_weights[e as usize]
    }

    #[inline]
    pub fn edge_size(&self, e: EdgeId) -> usize {
        self.edge_sizes[e as usize]
    }

    /// Active pins of `e`.
    #[inline]
    pub fn pins(&self, e: EdgeId) -> &[NodeId] {
        &self.pins[e as usize][..self.edge_sizes[e as usize]]
    }

    #[inline]
    pub fn incident_nets(&self, v: NodeId) -> &[EdgeId] {
        &self.incident_nets[v as usize]
    }

    pub fn enabled_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.num_nodes() as NodeId).filter(|&v| self.node_enabled[v as usize])
    }

    /// Contract `v` into `u`. Both must be enabled and distinct.
    pub fn contract(&mut self, u: NodeId, v: NodeId) -> Result<ContractionMemento, HypercutError> {
        if u == v || !self.is_enabled(u) || !self.is_enabled(v) {
            return Err(HypercutError::Internal(format!(
                "contract({u}, {v}) on disabled or identical nodes"
            )));
        }
        let v_weight = self.node_weights[v as usize];
        self.node_weights[u as usize] += v_weight;
        self.node_enabled[v as usize] = false;
        self.num_enabled_nodes -= 1;

        let nets_of_v = self.incident_nets[v as usize].clone();
        let mut ops = Vec::with_capacity(nets_of_v.len());
        for e in nets_of_v {
            let size = self.edge_sizes[e as usize];
            let edge_pins = &mut self.pins[e as usize];
            let pos = edge_pins[..size]
                .iter()
                .position(|&p| p == v)
                .expect("incident-net list inconsistent with pin list");
            let contains_u = edge_pins[..size].contains(&u);
            if contains_u {
                edge_pins.swap(pos, size - 1);
                self.edge_sizes[e as usize] = size - 1;
                ops.push(EdgeOp::Shrink { e, pos });
            } else {
                edge_pins[pos] = u;
                self.incident_nets[u as usize].push(e);
                ops.push(EdgeOp::Replace { e, pos });
            }
        }
        Ok(ContractionMemento {
            u,
            v,
            v_weight,
            ops,
        })
    }

    /// Reverse a contraction. Mementos must be applied strictly in the
    /// reverse order of the contractions they record. `on_pin_restored`
    /// fires for every Shrink edge (the edge regains pin `v`), letting a
    /// partition overlay adjust its pin counts incrementally.
    pub fn uncontract<F>(&mut self, memento: &ContractionMemento, mut on_pin_restored: F)
    where
        F: FnMut(EdgeId, NodeId),
    {
        let ContractionMemento { u, v, v_weight, ops } = memento;
        let (u, v) = (*u, *v);
        for op in ops.iter().rev() {
            match *op {
                EdgeOp::Shrink { e, pos } => {
                    let size = self.edge_sizes[e as usize];
                    self.edge_sizes[e as usize] = size + 1;
                    self.pins[e as usize].swap(pos, size);
                    on_pin_restored(e, v);
                }
                EdgeOp::Replace { e, pos } => {
                    debug_assert_eq!(self.pins[e as usize][pos], u);
                    self.pins[e as usize][pos] = v;
                    let popped = self.incident_nets[u as usize].pop();
                    debug_assert_eq!(popped, Some(e));
                }
            }
        }
        self.node_weights[u as usize] -= v_weight;
        self.node_enabled[v as usize] = true;
        self.num_enabled_nodes += 1;
    }

    /// Uncontract without a partition overlay.
    pub fn uncontract_plain(&mut self, memento: &ContractionMemento) {
        self.uncontract(memento, |_, _| {});
    }

    /// Snapshot the enabled part of the hypergraph as a static one,
    /// returning the mapping from dynamic node ids to compact ids.
    pub fn snapshot(&self) -> (StaticHypergraph, Vec<NodeId>) {
        let mut mapping = vec![super::INVALID_NODE; self.num_nodes()];
        let mut weights = Vec::with_capacity(self.num_enabled_nodes);
        for v in self.enabled_nodes() {
            mapping[v as usize] = weights.len() as NodeId;
            weights.push(self.node_weights[v as usize]);
        }
        let mut pin_lists = Vec::new();
        let mut edge_weights = Vec::new();
        for e in 0..self.num_edges() as EdgeId {
            if self.edge_size(e) >= 2 {
                pin_lists.push(
                    self.pins(e)
                        .iter()
                        .map(|&p| mapping[p as usize])
                        .collect::<Vec<_>>(),
                );
                edge_weights.push(self.edge_weight(e));
            }
        }
        (
            StaticHypergraph::build(weights, &pin_lists, edge_weights),
            mapping,
        )
    }
}
