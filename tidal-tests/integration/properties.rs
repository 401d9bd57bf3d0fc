//! Property checks over randomized link parameters

use proptest::prelude::*;
use tidal_core::network::{Attachment, TopologyBuilder};
use tidal_core::{Algorithm, FlowId, FlowSpec, LinkParams, TidalConfig};
use tidal_sim::link::FlowBytes;
use tidal_sim::{
    SingleFlowParams, Timing, distribute_proportionally, run_multi_flow, run_single_flow,
};

fn algorithm() -> impl Strategy<Value = Algorithm> {
    prop_oneof![
        Just(Algorithm::Reno),
        Just(Algorithm::Cubic),
        Just(Algorithm::Bbr)
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_single_flow_bounds(
        algorithm in algorithm(),
        bandwidth in 0.5f64..40.0,
        delay in 1.0f64..80.0,
        buffer in 1u32..120,
    ) {
        let params = SingleFlowParams {
            algorithm,
            bandwidth,
            delay,
            buffer,
            duration: 3.0,
            mss: 1500,
        };
        let report = run_single_flow(params, &TidalConfig::default()).unwrap();

        prop_assert_eq!(report.trace.len(), 30);
        for sample in &report.trace {
            prop_assert!(sample.cwnd >= 1.0);
            prop_assert!(sample.inflight >= 0.0);
            prop_assert!(sample.buffer <= f64::from(buffer));
            prop_assert!(sample.throughput <= bandwidth + 1e-9);
        }
        prop_assert_eq!(
            report.totals.delivered,
            report.totals.acked + report.totals.pending_acks
        );
    }

    #[test]
    fn test_multi_flow_never_violates_invariants(
        first in algorithm(),
        second in algorithm(),
        bandwidth in 1.0f64..30.0,
        buffer in 2u32..60,
    ) {
        let topology = TopologyBuilder::new("series")
            .default_link(LinkParams::new(bandwidth, 10.0, buffer, 1500))
            .senders([Attachment::new("S1", "R1"), Attachment::new("S2", "R1")])
            .receivers([Attachment::new("D1", "R2"), Attachment::new("D2", "R2")])
            .build();
        let flows = [
            FlowSpec::new("a", "S1", "D1", first),
            FlowSpec::new("b", "S2", "D2", second),
        ];
        let report = run_multi_flow(
            &topology,
            &flows,
            Timing::new(3.0, 0.05),
            &TidalConfig::default(),
        )
        .unwrap();

        prop_assert!(report.violations.is_empty(), "{:?}", report.violations);
        for trace in report.traces.values() {
            prop_assert!(trace.iter().all(|s| s.cwnd >= 1.0 && s.inflight >= 0.0));
        }
    }

    #[test]
    fn test_proportional_split_conserves_amount(
        queued in proptest::collection::vec(0.0f64..1e6, 1..6),
        amount in 0.0f64..2e6,
    ) {
        let backlog: FlowBytes = queued
            .iter()
            .enumerate()
            .map(|(i, bytes)| (FlowId::new(i.to_string()), *bytes))
            .collect();
        let total: f64 = queued.iter().sum();
        let shares = distribute_proportionally(&backlog, amount);

        let assigned: f64 = shares.values().sum();
        let expected = if total > 0.0 { amount.min(total) } else { 0.0 };
        prop_assert!((assigned - expected).abs() <= 1e-6 * expected.max(1.0));
        for (flow, share) in &shares {
            prop_assert!(*share <= backlog[flow] + 1e-6);
        }
    }
}
