//! Flow-based refinement on block pairs.
//!
//! For a pair of adjacent blocks a region around their shared boundary is
//! grown by BFS until a weight bound proportional to ε·W/k per side.
//! The region induces a flow network in Lawler expansion (per hyperedge an
//! in/out node pair joined by an arc of capacity ω(e), pins attached with
//! infinite arcs; pins outside the region collapse into the terminals).
//! Parallel hyperedges are merged by hashing their network pin sets.
//! A Dinic max-flow yields the minimum cut; free vertices (on neither
//! terminal's residual side) are assigned to the lighter block when the
//! most-balanced post-processing is on. The move sequence commits only if
//! it keeps balance and does not worsen the objective, and rolls back
//! otherwise.

use hashbrown::{HashMap, HashSet};
use std::collections::VecDeque;

use super::{Refiner, TimeBudget};
use crate::hypergraph::{BlockId, EdgeId, Gain, NodeId, NodeWeight, Topology};
use crate::partition::{GainCache, Objective, PartitionedHypergraph};

const INF: i64 = i64::MAX / 4;

// --- Dinic ----------------------------------------------------------------

#[derive(Debug, Clone)]
struct FlowEdge {
    to: usize,
    cap: i64,
}

#[derive(Debug, Default)]
struct FlowNetwork {
    edges: Vec<FlowEdge>,
    adj: Vec<Vec<usize>>,
}

impl FlowNetwork {
    fn new(num_nodes: usize) -> Self {
        FlowNetwork {
            edges: Vec::new(),
            adj: vec![Vec::new(); num_nodes],
        }
    }

    fn add_node(&mut self) -> usize {
        self.adj.push(Vec::new());
        self.adj.len() - 1
    }

    fn add_edge(&mut self, from: usize, to: usize, cap: i64) -> usize {
        let id = self.edges.len();
        self.edges.push(FlowEdge { to, cap });
        self.edges.push(FlowEdge { to: from, cap: 0 });
        self.adj[from].push(id);
        self.adj[to].push(id + 1);
        id
    }

    fn bfs_levels(&self, s: usize, t: usize) -> Option<Vec<i32>> {
        let mut level = vec![-1; self.adj.len()];
        let mut queue = VecDeque::new();
        level[s] = 0;
        queue.push_back(s);
        while let Some(u) = queue.pop_front() {
            for &id in &self.adj[u] {
                let e = &self.edges[id];
                if e.cap > 0 && level[e.to] < 0 {
                    level[e.to] = level[u] + 1;
                    queue.push_back(e.to);
                }
            }
        }
        (level[t] >= 0).then_some(level)
    }

    fn dfs_augment(
        &mut self,
        u: usize,
        t: usize,
        pushed: i64,
        level: &[i32],
        iter: &mut [usize],
    ) -> i64 {
        if u == t {
            return pushed;
        }
        while iter[u] < self.adj[u].len() {
            let id = self.adj[u][iter[u]];
            let (to, cap) = {
                let e = &self.edges[id];
                (e.to, e.cap)
            };
            if cap > 0 && level[to] == level[u] + 1 {
                let d = self.dfs_augment(to, t, pushed.min(cap), level, iter);
                if d > 0 {
                    self.edges[id].cap -= d;
                    self.edges[id ^ 1].cap += d;
                    return d;
                }
            }
            iter[u] += 1;
        }
        0
    }

    /// Layered max-flow from `s` to `t`.
    fn max_flow(&mut self, s: usize, t: usize) -> i64 {
        let mut flow = 0;
        while let Some(level) = self.bfs_levels(s, t) {
            let mut iter = vec![0usize; self.adj.len()];
            loop {
                let pushed = self.dfs_augment(s, t, INF, &level, &mut iter);
                if pushed == 0 {
                    break;
                }
                flow += pushed;
            }
        }
        flow
    }

    /// Nodes reachable from `s` through positive residual arcs.
    fn residual_reachable(&self, s: usize) -> Vec<bool> {
        let mut seen = vec![false; self.adj.len()];
        let mut queue = VecDeque::new();
        seen[s] = true;
        queue.push_back(s);
        while let Some(u) = queue.pop_front() {
            for &id in &self.adj[u] {
                let e = &self.edges[id];
                if e.cap > 0 && !seen[e.to] {
                    seen[e.to] = true;
                    queue.push_back(e.to);
                }
            }
        }
        seen
    }

    /// Nodes that can still reach `t` through positive residual arcs.
    fn residual_coreachable(&self, t: usize) -> Vec<bool> {
        let mut seen = vec![false; self.adj.len()];
        let mut queue = VecDeque::new();
        seen[t] = true;
        queue.push_back(t);
        while let Some(u) = queue.pop_front() {
            // An arc x→u with residual capacity lets x reach t via u;
            // for every incident arc u→x, its mate id^1 is the arc x→u.
            for &id in &self.adj[u] {
                let x = self.edges[id].to;
                if self.edges[id ^ 1].cap > 0 && !seen[x] {
                    seen[x] = true;
                    queue.push_back(x);
                }
            }
        }
        seen
    }
}

// --- Flow refiner ---------------------------------------------------------

pub struct FlowRefiner {
    objective: Objective,
    max_part_weight: NodeWeight,
    region_scaling: f64,
    most_balanced_cut: bool,
    epsilon: f64,
}

struct FlowProblem {
    network: FlowNetwork,
    /// Region vertex behind each network node ≥ 2.
    region: Vec<NodeId>,
}

const SOURCE: usize = 0;
const SINK: usize = 1;

impl FlowRefiner {
    pub fn new(
        objective: Objective,
        max_part_weight: NodeWeight,
        epsilon: f64,
        region_scaling: f64,
        most_balanced_cut: bool,
    ) -> Self {
        FlowRefiner {
            objective,
            max_part_weight,
            region_scaling,
            most_balanced_cut,
            epsilon,
        }
    }

    fn max_region_weight<H: Topology>(&self, phg: &PartitionedHypergraph<H>) -> NodeWeight {
        let w = self.region_scaling * self.epsilon * phg.hypergraph().total_weight() as f64
            / phg.k() as f64;
        (w.ceil() as NodeWeight).max(1)
    }

    /// Grow the refinement region for the pair `(a, b)`: boundary nodes
    /// first, then BFS along shared hyperedges, each side bounded by the
    /// region weight.
    fn grow_region<H: Topology>(
        &self,
        phg: &PartitionedHypergraph<H>,
        a: BlockId,
        b: BlockId,
    ) -> Vec<NodeId> {
        let hg = phg.hypergraph();
        // Each side keeps at least one vertex outside the region so the
        // terminals of the flow problem stay anchored.
        let bound = self.max_region_weight(phg);
        let bounds = [
            bound.min(phg.part_weight(a) - 1),
            bound.min(phg.part_weight(b) - 1),
        ];
        let mut in_region: HashSet<NodeId> = HashSet::new();
        let mut side_weight = [0 as NodeWeight; 2];
        let mut queue: VecDeque<NodeId> = VecDeque::new();

        let mut try_add = |v: NodeId,
                           in_region: &mut HashSet<NodeId>,
                           side_weight: &mut [NodeWeight; 2],
                           queue: &mut VecDeque<NodeId>| {
            let p = phg.part_id(v);
            if (p == a || p == b) && !in_region.contains(&v) {
                let side = (p == b) as usize;
                if side_weight[side] + hg.node_weight(v) <= bounds[side] {
                    in_region.insert(v);
                    side_weight[side] += hg.node_weight(v);
                    queue.push_back(v);
                }
            }
        };

        for e in 0..hg.num_edges() as EdgeId {
            if phg.pin_count_in_part(e, a) > 0 && phg.pin_count_in_part(e, b) > 0 {
                for &v in hg.pins(e) {
                    try_add(v, &mut in_region, &mut side_weight, &mut queue);
                }
            }
        }
        while let Some(v) = queue.pop_front() {
            for &e in hg.incident_nets(v) {
                for &u in hg.pins(e) {
                    try_add(u, &mut in_region, &mut side_weight, &mut queue);
                }
            }
        }
        let mut region: Vec<NodeId> = in_region.into_iter().collect();
        region.sort_unstable();
        region
    }

    /// Lawler expansion over the region. Hyperedges with pins outside
    /// `a ∪ b` stay cut whatever the pair decides and are skipped;
    /// identical nets are merged through their hashed pin sets.
    fn build_flow_problem<H: Topology>(
        &self,
        phg: &PartitionedHypergraph<H>,
        a: BlockId,
        b: BlockId,
        region: &[NodeId],
    ) -> FlowProblem {
        let hg = phg.hypergraph();
        let mut node_of: HashMap<NodeId, usize> = HashMap::with_capacity(region.len());
        let mut network = FlowNetwork::new(2 + region.len());
        for (i, &v) in region.iter().enumerate() {
            node_of.insert(v, 2 + i);
        }

        let mut seen_edges: HashSet<EdgeId> = HashSet::new();
        let mut identical: HashMap<Vec<usize>, usize> = HashMap::new();
        for &v in region {
            for &e in hg.incident_nets(v) {
                if !seen_edges.insert(e) {
                    continue;
                }
                let mut droppable = false;
                let mut net_pins: Vec<usize> = Vec::with_capacity(hg.edge_size(e));
                for &u in hg.pins(e) {
                    let node = match node_of.get(&u) {
                        Some(&n) => n,
                        None => {
                            let p = phg.part_id(u);
                            if p == a {
                                SOURCE
                            } else if p == b {
                                SINK
                            } else {
                                droppable = true;
                                break;
                            }
                        }
                    };
                    net_pins.push(node);
                }
                if droppable {
                    continue;
                }
                net_pins.sort_unstable();
                net_pins.dedup();
                if net_pins.len() < 2 {
                    continue;
                }
                let we = hg.edge_weight(e);
                match identical.entry(net_pins) {
                    hashbrown::hash_map::Entry::Occupied(slot) => {
                        network.edges[*slot.get()].cap += we;
                    }
                    hashbrown::hash_map::Entry::Vacant(slot) => {
                        let e_in = network.add_node();
                        let e_out = network.add_node();
                        let bridge = network.add_edge(e_in, e_out, we);
                        for &pin in slot.key() {
                            network.add_edge(pin, e_in, INF);
                            network.add_edge(e_out, pin, INF);
                        }
                        slot.insert(bridge);
                    }
                }
            }
        }
        FlowProblem {
            network,
            region: region.to_vec(),
        }
    }

    /// Solve the pair problem and commit the resulting moves if they help.
    /// Returns the committed objective delta.
    fn refine_pair<H: Topology>(
        &self,
        phg: &PartitionedHypergraph<H>,
        gain_cache: Option<&GainCache>,
        a: BlockId,
        b: BlockId,
    ) -> Gain {
        let region = self.grow_region(phg, a, b);
        if region.is_empty() {
            return 0;
        }
        let mut problem = self.build_flow_problem(phg, a, b, &region);
        problem.network.max_flow(SOURCE, SINK);

        let source_side = problem.network.residual_reachable(SOURCE);
        let sink_side = problem.network.residual_coreachable(SINK);

        // Desired block per region vertex; free vertices go to the
        // lighter side when balance post-processing is on.
        let mut weight = [phg.part_weight(a), phg.part_weight(b)];
        let mut desired: Vec<(NodeId, BlockId)> = Vec::new();
        let mut free: Vec<NodeId> = Vec::new();
        for (i, &v) in problem.region.iter().enumerate() {
            let node = 2 + i;
            if source_side[node] {
                desired.push((v, a));
            } else if sink_side[node] {
                desired.push((v, b));
            } else if self.most_balanced_cut {
                free.push(v);
            } else {
                desired.push((v, b));
            }
        }
        for (v, p) in &desired {
            let own = phg.part_id(*v);
            if own != *p {
                let w = phg.hypergraph().node_weight(*v);
                let (from_i, to_i) = if *p == a { (1, 0) } else { (0, 1) };
                weight[from_i] -= w;
                weight[to_i] += w;
            }
        }
        let mut free_sorted = free;
        free_sorted.sort_unstable_by_key(|&v| std::cmp::Reverse(phg.hypergraph().node_weight(v)));
        for v in free_sorted {
            let own = phg.part_id(v);
            let w = phg.hypergraph().node_weight(v);
            let target = if weight[0] + if own == a { 0 } else { w }
                <= weight[1] + if own == b { 0 } else { w }
            {
                a
            } else {
                b
            };
            if target != own {
                let (from_i, to_i) = if target == a { (1, 0) } else { (0, 1) };
                weight[from_i] -= w;
                weight[to_i] += w;
            }
            desired.push((v, target));
        }

        self.commit_moves(phg, gain_cache, desired)
    }

    /// Apply the proposed assignment; roll everything back if a move is
    /// rejected by the balance gate or the total delta worsens the
    /// objective.
    fn commit_moves<H: Topology>(
        &self,
        phg: &PartitionedHypergraph<H>,
        gain_cache: Option<&GainCache>,
        desired: Vec<(NodeId, BlockId)>,
    ) -> Gain {
        let mut applied: Vec<(NodeId, BlockId, BlockId)> = Vec::new();
        let mut total_delta = 0;
        let mut aborted = false;
        for (v, target) in desired {
            let own = phg.part_id(v);
            if own == target {
                continue;
            }
            let mut delta = 0;
            let committed = phg.change_node_part_with(
                v,
                own,
                target,
                self.max_part_weight,
                |e, we, size, pf, pt| {
                    if let Some(cache) = gain_cache {
                        cache.delta_update(phg, v, own, target, e, we, pf, pt);
                    }
                    delta += self.objective.delta(we, size, pf, pt);
                },
            );
            if !committed {
                aborted = true;
                break;
            }
            if let Some(cache) = gain_cache {
                cache.recompute_penalty(phg, v);
            }
            applied.push((v, own, target));
            total_delta += delta;
        }

        if aborted || total_delta > 0 {
            for (v, own, target) in applied.into_iter().rev() {
                let undone = phg.change_node_part_with(
                    v,
                    target,
                    own,
                    NodeWeight::MAX,
                    |e, we, _, pf, pt| {
                        if let Some(cache) = gain_cache {
                            cache.delta_update(phg, v, target, own, e, we, pf, pt);
                        }
                    },
                );
                debug_assert!(undone);
                if let Some(cache) = gain_cache {
                    cache.recompute_penalty(phg, v);
                }
            }
            return 0;
        }
        total_delta
    }
}

impl<H: Topology> Refiner<H> for FlowRefiner {
    fn refine(
        &mut self,
        phg: &PartitionedHypergraph<H>,
        _refinement_nodes: &[NodeId],
        gain_cache: Option<&GainCache>,
        budget: &TimeBudget,
    ) -> Gain {
        // Active block pairs: those sharing at least one cut hyperedge.
        let mut adjacent: HashSet<(BlockId, BlockId)> = HashSet::new();
        for e in 0..phg.hypergraph().num_edges() as EdgeId {
            if phg.connectivity(e) >= 2 {
                let blocks: Vec<BlockId> = phg.connectivity_set(e).collect();
                for (x, &i) in blocks.iter().enumerate() {
                    for &j in &blocks[x + 1..] {
                        adjacent.insert((i.min(j), i.max(j)));
                    }
                }
            }
        }
        let mut pairs: Vec<(BlockId, BlockId)> = adjacent.into_iter().collect();
        pairs.sort_unstable();

        let mut total_delta = 0;
        for (a, b) in pairs {
            if budget.expired() {
                break;
            }
            total_delta += self.refine_pair(phg, gain_cache, a, b);
        }
        total_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::StaticHypergraph;
    use crate::metrics;

    #[test]
    fn dinic_on_a_diamond() {
        // s → 2 → t and s → 3 → t, unit capacities.
        let mut net = FlowNetwork::new(4);
        net.add_edge(0, 2, 1);
        net.add_edge(0, 3, 1);
        net.add_edge(2, 1, 1);
        net.add_edge(3, 1, 1);
        assert_eq!(net.max_flow(0, 1), 2);
    }

    #[test]
    fn dinic_bottleneck() {
        // s → 2 (cap 5) → t (cap 3): flow limited by the bottleneck.
        let mut net = FlowNetwork::new(3);
        net.add_edge(0, 2, 5);
        net.add_edge(2, 1, 3);
        assert_eq!(net.max_flow(0, 1), 3);
        let reach = net.residual_reachable(0);
        assert!(reach[2]);
        assert!(!reach[1]);
    }

    fn swapped_barbell() -> PartitionedHypergraph<StaticHypergraph> {
        // Two 5-node groups joined by one bridge; the endpoints of the
        // bridge start on the wrong sides.
        let hg = StaticHypergraph::build(
            vec![1; 10],
            &[
                vec![4, 5],
                vec![0, 1, 2, 3, 4],
                vec![5, 6, 7, 8, 9],
            ],
            vec![1, 3, 3],
        );
        let phg = PartitionedHypergraph::new(2, hg);
        for (v, p) in [
            (0, 0),
            (1, 0),
            (2, 0),
            (3, 0),
            (4, 1),
            (5, 0),
            (6, 1),
            (7, 1),
            (8, 1),
            (9, 1),
        ] {
            phg.set_only_node_part(v, p);
        }
        phg.initialize_partition();
        phg
    }

    #[test]
    fn flow_refiner_swaps_the_bridge_endpoints_back() {
        let phg = swapped_barbell();
        let before = metrics::km1(&phg);
        assert_eq!(before, 7);
        let mut flow = FlowRefiner::new(Objective::Km1, 6, 0.2, 16.0, true);
        let delta = flow.refine(&phg, &[], None, &TimeBudget::unlimited());
        let after = metrics::km1(&phg);
        assert_eq!(after - before, delta);
        assert_eq!(phg.part_id(4), 0);
        assert_eq!(phg.part_id(5), 1);
        assert_eq!(after, 1);
        assert!(metrics::is_balanced(&phg, 6));
        phg.validate_derived_state().unwrap();
    }

    #[test]
    fn refiner_never_worsens() {
        // Already optimal barbell partition: refiner must return 0 delta.
        let hg = StaticHypergraph::build(
            vec![1; 8],
            &[
                vec![0, 1, 2, 3],
                vec![4, 5, 6, 7],
                vec![3, 4],
            ],
            vec![3, 3, 1],
        );
        let phg = PartitionedHypergraph::new(2, hg);
        for (v, p) in [(0, 0), (1, 0), (2, 0), (3, 0), (4, 1), (5, 1), (6, 1), (7, 1)] {
            phg.set_only_node_part(v, p);
        }
        phg.initialize_partition();
        let before = metrics::km1(&phg);
        let mut flow = FlowRefiner::new(Objective::Km1, 5, 0.25, 16.0, true);
        let delta = flow.refine(&phg, &[], None, &TimeBudget::unlimited());
        assert_eq!(metrics::km1(&phg), before);
        assert_eq!(delta, 0);
    }
}
