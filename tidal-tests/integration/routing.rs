//! Topology templates and path selection

use tidal_core::network::{Attachment, LinkCost, LinkOverride, TopologyBuilder, TopologyKind};
use tidal_core::{Algorithm, FlowId, FlowSpec, LinkKey, NodeId, PathRouter};

fn keys(path: &[&str]) -> Vec<LinkKey> {
    path.iter().map(|key| LinkKey::from(*key)).collect()
}

fn router() -> PathRouter {
    PathRouter::new(LinkCost::default())
}

#[test]
fn test_series_shortest_path() {
    let topology = TopologyBuilder::new("series")
        .sender(Attachment::new("S", "R1"))
        .receiver(Attachment::new("D", "R2"))
        .build();
    assert!(topology.warnings.is_empty());

    let path = router()
        .shortest_path(&topology, &NodeId::from("S"), &NodeId::from("D"))
        .unwrap();
    assert_eq!(path, keys(&["S-R1", "R1-R2", "R2-D"]));
}

#[test]
fn test_triangle_avoids_slow_link() {
    let topology = TopologyBuilder::new("triangle")
        .sender(Attachment::new("S", "R1"))
        .receiver(Attachment::new("D", "R2"))
        .link_override(
            "R1-R2",
            LinkOverride {
                delay: Some(100.0),
                ..Default::default()
            },
        )
        .build();

    let path = router()
        .shortest_path(&topology, &NodeId::from("S"), &NodeId::from("D"))
        .unwrap();
    assert_eq!(path, keys(&["S-R1", "R3-R1", "R2-R3", "R2-D"]));
}

#[test]
fn test_ring_routing_is_deterministic() {
    let topology = TopologyBuilder::new("Four")
        .sender(Attachment::new("S1", "R1"))
        .receiver(Attachment::new("D1", "R3"))
        .build();
    assert_eq!(topology.kind, TopologyKind::Four);

    let flows = [FlowSpec::new("f1", "S1", "D1", Algorithm::Reno)];
    let first = router().route(&topology, &flows);
    let second = router().route(&topology, &flows);
    assert_eq!(first, second);

    let path = &first[&FlowId::from("f1")];
    assert_eq!(path.len(), 4);
    assert_eq!(path.first(), Some(&LinkKey::from("S1-R1")));
    assert_eq!(path.last(), Some(&LinkKey::from("R3-D1")));
}

#[test]
fn test_parallel_round_robin_alternates_paths() {
    let topology = TopologyBuilder::new("parallel")
        .senders([Attachment::new("S", "R1"), Attachment::new("S", "R2")])
        .receivers([Attachment::new("D", "R1"), Attachment::new("D", "R2")])
        .build();

    let flows: Vec<FlowSpec> = ["a", "b", "c"]
        .iter()
        .map(|id| FlowSpec::new(*id, "S", "D", Algorithm::Cubic))
        .collect();
    let table = router().route(&topology, &flows);

    let a = &table[&FlowId::from("a")];
    let b = &table[&FlowId::from("b")];
    let c = &table[&FlowId::from("c")];
    assert_ne!(a, b);
    assert_eq!(a, c);
    assert_eq!(a, &keys(&["S-R1", "R1-D"]));
    assert_eq!(b, &keys(&["S-R2", "R2-D"]));
}

#[test]
fn test_unknown_template_falls_back_with_warning() {
    let topology = TopologyBuilder::new("mesh")
        .sender(Attachment::new("S", "R1"))
        .receiver(Attachment::new("D", "R1"))
        .build();
    assert_eq!(topology.kind, TopologyKind::FALLBACK);
    assert!(topology.warnings.iter().any(|w| w.contains("mesh")));
}

#[test]
fn test_bad_attachment_leaves_flow_unroutable() {
    let topology = TopologyBuilder::new("single")
        .sender(Attachment::new("S", "R"))
        .receiver(Attachment::new("D", "R7"))
        .build();
    assert_eq!(topology.warnings.len(), 1);

    let flows = [FlowSpec::new("lost", "S", "D", Algorithm::Bbr)];
    let table = router().route(&topology, &flows);
    assert!(table[&FlowId::from("lost")].is_empty());
}
