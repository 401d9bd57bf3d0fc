//! Single bottleneck runs across controllers

use tidal_core::{Algorithm, Phase, TidalConfig};
use tidal_sim::{Ns3Request, SingleFlowParams, run_single_flow};

const ALGORITHMS: [Algorithm; 3] = [Algorithm::Reno, Algorithm::Cubic, Algorithm::Bbr];

fn params(algorithm: Algorithm) -> SingleFlowParams {
    SingleFlowParams {
        algorithm,
        ..Default::default()
    }
}

#[test]
fn test_every_controller_produces_full_trace() {
    let config = TidalConfig::default();
    for algorithm in ALGORITHMS {
        let report = run_single_flow(params(algorithm), &config).unwrap();
        assert_eq!(report.trace.len(), 100, "{algorithm}");
        assert!(report.mean_throughput() > 0.0, "{algorithm}");
        assert!(
            report.trace.iter().all(|s| s.phase != Phase::External),
            "{algorithm}"
        );
    }
}

#[test]
fn test_totals_are_conserved() {
    let config = TidalConfig::default();
    for algorithm in ALGORITHMS {
        let totals = run_single_flow(params(algorithm), &config).unwrap().totals;
        assert_eq!(totals.delivered, totals.acked + totals.pending_acks);
        assert!(totals.sent >= totals.delivered + totals.dropped);
    }
}

#[test]
fn test_small_buffer_forces_loss_recovery() {
    let report = run_single_flow(
        SingleFlowParams {
            algorithm: Algorithm::Reno,
            buffer: 3,
            duration: 5.0,
            ..Default::default()
        },
        &TidalConfig::default(),
    )
    .unwrap();

    assert!(report.totals.dropped > 0);
    assert!(report.trace.iter().any(|s| s.phase != Phase::SlowStart));
}

#[test]
fn test_report_serializes_for_front_end() {
    let report = run_single_flow(params(Algorithm::Cubic), &TidalConfig::default()).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    let first = &json["trace"][0];
    for field in ["time", "cwnd", "throughput", "buffer", "inflight", "phase"] {
        assert!(first.get(field).is_some(), "missing {field}");
    }
}

#[test]
fn test_ns3_request_mirrors_fluid_run() {
    let params = SingleFlowParams {
        algorithm: Algorithm::Bbr,
        bandwidth: 12.0,
        ..Default::default()
    };
    let request = Ns3Request::single(&params);
    assert_eq!(request.flows, vec![Algorithm::Bbr]);
    assert_eq!(request.link.bandwidth, 12.0);
    assert_eq!(request.duration, params.duration);
    assert!(request.validate().is_ok());
}
