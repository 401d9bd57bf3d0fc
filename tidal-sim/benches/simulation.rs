use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use tidal_core::network::{Attachment, TopologyBuilder};
use tidal_core::{Algorithm, FlowSpec, TidalConfig};
use tidal_sim::{SingleFlowParams, Timing, run_multi_flow, run_single_flow};

fn bench_single_flow(c: &mut Criterion) {
    let config = TidalConfig::default();
    for algorithm in [Algorithm::Reno, Algorithm::Cubic, Algorithm::Bbr] {
        let params = SingleFlowParams {
            algorithm,
            ..Default::default()
        };
        c.bench_function(&format!("single_flow_{}", algorithm.as_str()), |b| {
            b.iter(|| run_single_flow(black_box(params), &config))
        });
    }
}

fn bench_multi_flow(c: &mut Criterion) {
    let config = TidalConfig::default();
    let topology = TopologyBuilder::new("four")
        .senders([Attachment::new("S1", "R1"), Attachment::new("S2", "R2")])
        .receivers([Attachment::new("D1", "R3"), Attachment::new("D2", "R4")])
        .build();
    let flows = [
        FlowSpec::new("f1", "S1", "D1", Algorithm::Reno),
        FlowSpec::new("f2", "S2", "D2", Algorithm::Cubic),
        FlowSpec::new("f3", "S1", "D2", Algorithm::Bbr),
    ];

    c.bench_function("multi_flow_ring_20s", |b| {
        b.iter(|| {
            run_multi_flow(
                black_box(&topology),
                &flows,
                Timing::new(20.0, 0.05),
                &config,
            )
        })
    });
}

criterion_group!(benches, bench_single_flow, bench_multi_flow);
criterion_main!(benches);
