//! Contract/uncontract cycles on the contractible hypergraph, including
//! partition-aware uncontraction.

use hypercut::hypergraph::{
    DynamicHypergraph, EdgeId, NodeId, StaticHypergraph,
};
use hypercut::partition::PartitionedHypergraph;

fn fixture() -> DynamicHypergraph {
    let hg = StaticHypergraph::build(
        vec![1; 7],
        &[vec![0, 2], vec![0, 1, 3, 4], vec![3, 4, 6], vec![2, 5, 6]],
        vec![1; 4],
    );
    DynamicHypergraph::from_static(&hg)
}

#[test]
fn contract_uncontract_cycle_restores_incident_nets_exactly() {
    let mut hg = fixture();
    let before_nets: Vec<Vec<EdgeId>> = (0..7).map(|v| hg.incident_nets(v).to_vec()).collect();
    let before_pins: Vec<Vec<NodeId>> = (0..4).map(|e| hg.pins(e).to_vec()).collect();

    let m1 = hg.contract(0, 2).unwrap();
    let m2 = hg.contract(3, 4).unwrap();
    let m3 = hg.contract(5, 6).unwrap();

    hg.uncontract_plain(&m3);
    hg.uncontract_plain(&m2);
    hg.uncontract_plain(&m1);

    for v in 0..7 {
        assert_eq!(
            hg.incident_nets(v),
            before_nets[v as usize].as_slice(),
            "incident nets of node {v}"
        );
        assert!(hg.is_enabled(v));
        assert_eq!(hg.node_weight(v), 1);
    }
    for e in 0..4 {
        assert_eq!(hg.pins(e), before_pins[e as usize].as_slice(), "pins of edge {e}");
    }
}

#[test]
fn contraction_is_o_of_incident_nets_and_reversible_in_lifo_order() {
    let mut hg = fixture();
    // A deeper chain: 2 into 0, 0 into 1, 4 into 3, 6 into 5, 5 into 1.
    let mementos = vec![
        hg.contract(0, 2).unwrap(),
        hg.contract(1, 0).unwrap(),
        hg.contract(3, 4).unwrap(),
        hg.contract(5, 6).unwrap(),
        hg.contract(1, 5).unwrap(),
    ];
    assert_eq!(hg.num_enabled_nodes(), 2);
    assert_eq!(hg.node_weight(1), 5);

    for m in mementos.iter().rev() {
        hg.uncontract_plain(m);
    }
    let fresh = fixture();
    for v in 0..7 {
        assert_eq!(hg.incident_nets(v), fresh.incident_nets(v));
        assert_eq!(hg.node_weight(v), fresh.node_weight(v));
    }
    for e in 0..4 {
        assert_eq!(hg.pins(e), fresh.pins(e));
    }
}

#[test]
fn partitioned_uncontraction_keeps_derived_state_exact() {
    let mut hg = fixture();
    let m1 = hg.contract(0, 2).unwrap();
    let m2 = hg.contract(3, 4).unwrap();

    let mut phg = PartitionedHypergraph::new(3, hg);
    // Enabled nodes: 0 (weight 2), 1, 3 (weight 2), 5, 6.
    phg.set_only_node_part(0, 0);
    phg.set_only_node_part(1, 0);
    phg.set_only_node_part(3, 1);
    phg.set_only_node_part(5, 2);
    phg.set_only_node_part(6, 2);
    phg.initialize_partition();
    phg.validate_derived_state().unwrap();

    phg.uncontract(&m2);
    assert_eq!(phg.part_id(4), 1);
    phg.validate_derived_state().unwrap();

    phg.uncontract(&m1);
    assert_eq!(phg.part_id(2), 0);
    phg.validate_derived_state().unwrap();

    assert_eq!(phg.part_weight(0), 3);
    assert_eq!(phg.part_weight(1), 2);
    assert_eq!(phg.part_weight(2), 2);
    // Restored fixture state: border data matches the static overlay.
    let cut_counts: Vec<u32> = (0..7).map(|v| phg.num_incident_cut_edges(v)).collect();
    assert_eq!(cut_counts, vec![1, 1, 1, 2, 2, 1, 2]);
}
