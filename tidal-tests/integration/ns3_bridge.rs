//! ns-3 bridge against fake launcher scripts
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tidal_core::config::ExternalEngineConfig;
use tidal_core::{Algorithm, FlowId, LinkParams, Phase};
use tidal_sim::{EngineError, Ns3Bridge, Ns3Request};

fn install_launcher(dir: &Path, body: &str) {
    let path = dir.join("ns3");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn bridge(dir: &Path, timeout: Duration) -> Ns3Bridge {
    Ns3Bridge::new(&ExternalEngineConfig {
        ns3_dir: dir.to_path_buf(),
        timeout,
        program: "scratch/tcp_multi".to_string(),
    })
}

fn request(flows: Vec<Algorithm>) -> Ns3Request {
    Ns3Request {
        flows,
        link: LinkParams::new(10.0, 20.0, 40, 1448),
        duration: 2.0,
        sample_dt: Some(0.5),
        qdisc: Some("fq_codel".to_string()),
    }
}

const TRACE: &str = "time,cwnd_pkts,throughput_mbps,buffer_pkts,inflight_pkts
0.5,10,4.2,3,12
1.0,14,6.8,5,18
";

#[tokio::test]
async fn test_successful_run_parses_every_trace() {
    let dir = TempDir::new().unwrap();
    install_launcher(
        dir.path(),
        &format!(
            "echo \"$@\" > args.txt\n\
             printf '{trace}' > trace_flow0.csv\n\
             printf '{trace}' > trace_flow1.csv",
            trace = TRACE.replace('\n', "\\n")
        ),
    );

    let report = bridge(dir.path(), Duration::from_secs(10))
        .run(&request(vec![Algorithm::Reno, Algorithm::Bbr]))
        .await
        .unwrap();

    assert_eq!(report.traces.len(), 2);
    let trace = &report.traces[&FlowId::from("1")];
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[1].cwnd, 14.0);
    assert_eq!(trace[1].throughput, 6.8);
    assert!(trace.iter().all(|s| s.phase == Phase::External));

    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    assert!(args.starts_with("run scratch/tcp_multi --flows=Reno,BBR"));
    assert!(args.contains("--rate=10Mbps"));
    assert!(args.contains("--qdisc=fq_codel"));
}

#[tokio::test]
async fn test_stale_trace_is_not_reused() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("trace_flow0.csv"), TRACE).unwrap();
    install_launcher(dir.path(), "exit 0");

    let result = bridge(dir.path(), Duration::from_secs(10))
        .run(&request(vec![Algorithm::Cubic]))
        .await;
    assert!(matches!(result, Err(EngineError::OutputMissing { .. })));
}

#[tokio::test]
async fn test_non_zero_exit_keeps_stderr() {
    let dir = TempDir::new().unwrap();
    install_launcher(dir.path(), "echo 'build failed' >&2\nexit 3");

    let result = bridge(dir.path(), Duration::from_secs(10))
        .run(&request(vec![Algorithm::Reno]))
        .await;
    match result {
        Err(EngineError::NonZeroExit { status, stderr, .. }) => {
            assert_eq!(status.code(), Some(3));
            assert!(stderr.contains("build failed"));
        }
        other => panic!("expected non-zero exit, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_run_times_out() {
    let dir = TempDir::new().unwrap();
    install_launcher(dir.path(), "sleep 5");

    let result = bridge(dir.path(), Duration::from_millis(200))
        .run(&request(vec![Algorithm::Reno]))
        .await;
    assert!(matches!(result, Err(EngineError::TimedOut { .. })));
}

#[tokio::test]
async fn test_malformed_trace_reports_line() {
    let dir = TempDir::new().unwrap();
    install_launcher(
        dir.path(),
        "printf 'time,cwnd_pkts,throughput_mbps,buffer_pkts,inflight_pkts\\n0.5,x,1,1,1\\n' \
         > trace_flow0.csv",
    );

    let result = bridge(dir.path(), Duration::from_secs(10))
        .run(&request(vec![Algorithm::Reno]))
        .await;
    match result {
        Err(EngineError::MalformedOutput { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected malformed output, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_checkout_is_reported() {
    let dir = TempDir::new().unwrap();
    let result = bridge(&dir.path().join("absent"), Duration::from_secs(1))
        .run(&request(vec![Algorithm::Reno]))
        .await;
    assert!(matches!(result, Err(EngineError::ExecutableNotFound { .. })));
}
