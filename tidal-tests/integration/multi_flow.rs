//! Multi-flow scenarios end to end

use tempfile::TempDir;
use tidal_core::network::{Attachment, LinkOverride, TopologyBuilder};
use tidal_core::{Algorithm, FlowId, FlowSpec, LinkKey, LinkParams, TidalConfig};
use tidal_sim::{Scenario, Timing, run_multi_flow};

const SHARED_BOTTLENECK: &str = r#"{
    "topology": "series",
    "linkParams": {"bandwidth": 20, "delay": 5, "buffer": 30, "duration": 10, "dt": 0.05},
    "linkOverrides": {"R1-R2": {"bandwidth": 6, "buffer": 15}},
    "flows": [
        {"id": "reno", "src": "S1", "dst": "D1", "algorithm": "Reno"},
        {"id": "cubic", "src": "S2", "dst": "D2", "algorithm": "Cubic"},
        {"src": "S1", "dst": "D2", "algorithm": "BBR"}
    ],
    "senders": [{"id": "S1", "attach": "R1"}, {"id": "S2", "attach": "R1"}],
    "receivers": [{"id": "D1", "attach": "R2"}, {"id": "D2", "attach": "R2"}]
}"#;

#[test]
fn test_scenario_file_runs_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bottleneck.json");
    std::fs::write(&path, SHARED_BOTTLENECK).unwrap();

    let body = std::fs::read_to_string(&path).unwrap();
    let scenario = Scenario::from_json(&body).unwrap();
    let report = scenario.run(&TidalConfig::default()).unwrap();

    let ids: Vec<&str> = report.traces.keys().map(FlowId::as_str).collect();
    assert_eq!(ids, vec!["S1-D2", "cubic", "reno"]);
    assert!(report.violations.is_empty(), "{:?}", report.violations);
    assert!(report.warnings.is_empty());

    let bottleneck = LinkKey::from("R1-R2");
    for path in report.debug.paths.values() {
        assert!(path.contains(&bottleneck));
    }
    assert_eq!(report.debug.links[&bottleneck].params.bandwidth, 6.0);
}

#[test]
fn test_shared_bottleneck_caps_aggregate_throughput() {
    let scenario = Scenario::from_json(SHARED_BOTTLENECK).unwrap();
    let report = scenario.run(&TidalConfig::default()).unwrap();

    let aggregate: f64 = report
        .traces
        .keys()
        .map(|flow| report.mean_throughput(flow))
        .sum();
    assert!(aggregate > 0.0);
    assert!(aggregate <= 6.0 + 1e-6, "aggregate {aggregate}");
}

#[test]
fn test_bottleneck_queue_builds() {
    let scenario = Scenario::from_json(SHARED_BOTTLENECK).unwrap();
    let report = scenario.run(&TidalConfig::default()).unwrap();

    let history = &report.debug.links[&LinkKey::from("R1-R2")].queue_history;
    let samples = report.trace(&FlowId::from("reno")).map_or(0, Vec::len);
    assert_eq!(history.len(), samples);
    assert_eq!(samples, 101);
    assert!(history.iter().any(|depth| *depth > 0.0));
    assert!(report.traces.values().flatten().any(|s| s.buffer > 0.0));
}

#[test]
fn test_identical_requests_give_identical_reports() {
    let topology = TopologyBuilder::new("triangle")
        .default_link(LinkParams::new(8.0, 10.0, 25, 1500))
        .senders([Attachment::new("S1", "R1"), Attachment::new("S2", "R2")])
        .receivers([Attachment::new("D1", "R3"), Attachment::new("D2", "R1")])
        .link_override(
            "R2-R3",
            LinkOverride {
                bandwidth: Some(2.0),
                ..Default::default()
            },
        )
        .build();
    let flows = [
        FlowSpec::new("f1", "S1", "D1", Algorithm::Cubic),
        FlowSpec::new("f2", "S2", "D2", Algorithm::Bbr),
    ];
    let config = TidalConfig::default();

    let first = run_multi_flow(&topology, &flows, Timing::new(5.0, 0.05), &config).unwrap();
    let second = run_multi_flow(&topology, &flows, Timing::new(5.0, 0.05), &config).unwrap();
    assert_eq!(first.traces, second.traces);
    assert_eq!(first.debug.paths, second.debug.paths);
}

#[test]
fn test_report_serializes_debug_section() {
    let scenario = Scenario::from_json(SHARED_BOTTLENECK).unwrap();
    let report = scenario.run(&TidalConfig::default()).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    let link = &json["debug"]["links"]["R1-R2"];
    assert_eq!(link["bandwidth"], 6.0);
    assert!(link["queue_history"].is_array());
    assert!(json["debug"]["graph_nodes"].is_array());
}
