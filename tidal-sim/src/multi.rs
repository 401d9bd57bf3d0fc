//! Many flows sharing the links of a topology.
//!
//! Every step each routed flow offers paced whole packets onto every link of
//! its path, every link serves and sheds its backlog proportionally, and each
//! flow is credited with the least it got through any link on its path.
//! Acknowledgements return through a per-flow [`DelayLine`] after the path's
//! current round trip.

use std::collections::{BTreeMap, BTreeSet};

use tidal_core::config::sample_every;
use tidal_core::congestion::PathEstimate;
use tidal_core::network::{LinkCost, RoutingTable};
use tidal_core::{
    Congestion, EPSILON, FlowId, FlowSpec, LinkKey, LossSignal, PathRouter, Result, StepSignal,
    TidalConfig, TidalError, Topology, WindowState, ensure_positive,
};
use tracing::{debug, info, trace, warn};

use crate::delay_line::DelayLine;
use crate::invariants::{FlowView, InvariantChecker, StepView};
use crate::link::LinkState;
use crate::trace::{DebugInfo, MultiFlowReport, Snapshot, Trace};

/// Floor of the propagation round trip of a path, seconds.
const MIN_BASE_RTT: f64 = 0.001;

/// Longest run accepted, in integration steps.
pub const MAX_STEPS: usize = 10_000_000;

/// Simulated duration and integration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// Seconds of simulated time
    pub duration: f64,
    /// Integration step in seconds
    pub dt: f64,
}

impl Timing {
    /// Creates timing.
    pub fn new(duration: f64, dt: f64) -> Self {
        Self { duration, dt }
    }

    /// Number of integration steps, including the one at time zero.
    pub fn steps(&self) -> usize {
        ((self.duration / self.dt).round() as usize).saturating_add(1)
    }

    /// Checks both values are usable.
    ///
    /// # Errors
    /// - `TidalError::InvalidParameter` - Duration or step not positive, or
    ///   more than [`MAX_STEPS`] steps
    pub fn validate(&self) -> Result<()> {
        ensure_positive("duration", self.duration)?;
        ensure_positive("dt", self.dt)?;
        let steps = self.steps();
        if steps > MAX_STEPS {
            return Err(TidalError::invalid(
                "dt",
                format!("{steps} steps exceed the limit of {MAX_STEPS}"),
            ));
        }
        Ok(())
    }
}

/// Runtime state of one flow.
#[derive(Debug)]
struct FlowState {
    id: FlowId,
    path: Vec<LinkKey>,
    mss: f64,
    base_rtt: f64,
    congestion: Congestion,
    acks: DelayLine<f64>,
    inflight: f64,
    pacing_credit: f64,
    full_timer: f64,
    sent: f64,
    delivered: f64,
    dropped: f64,
    acked: f64,
    sent_step: f64,
    throughput: f64,
}

impl FlowState {
    fn is_routed(&self) -> bool {
        !self.path.is_empty()
    }

    /// Whole packets released this step by pacing credit and window.
    fn pace(&mut self, dt: f64) -> f64 {
        let cwnd = self.congestion.cwnd();
        self.pacing_credit += cwnd / self.base_rtt.max(EPSILON) * dt;
        let window_left = (cwnd.floor() - self.inflight).floor().max(0.0);
        let to_send = self.pacing_credit.floor().min(window_left).max(0.0);

        self.pacing_credit -= to_send;
        self.sent += to_send;
        self.sent_step = to_send;
        to_send
    }

    /// Schedules delivery, releases acknowledgements and updates the window.
    fn settle(&mut self, delivered: f64, dropped: f64, queue_delay: f64, now: f64, dt: f64) {
        let rtt = self.base_rtt + queue_delay;
        let rtt_steps = ((rtt / dt).round() as usize).max(1);

        self.acks.schedule(rtt_steps, delivered);
        self.delivered += delivered;
        self.throughput = delivered * self.mss * 8.0 / (dt * 1e6);

        let acked = self.acks.advance();
        self.acked += acked;
        self.dropped += dropped;
        self.inflight = (self.inflight + self.sent_step - acked - dropped).max(0.0);

        if dropped > 0.0 {
            self.full_timer += dt;
        } else {
            self.full_timer = (self.full_timer - dt).max(0.0);
        }
        let loss = LossSignal::classify(dropped, self.full_timer, rtt);

        self.congestion.on_step(&StepSignal {
            acked,
            loss,
            now,
            rtt,
        });
    }

    fn snapshot(&self, now: f64, links: &BTreeMap<LinkKey, LinkState>) -> Snapshot {
        if !self.is_routed() {
            return Snapshot::idle(now, self.congestion.cwnd(), self.congestion.phase());
        }

        let queued: f64 = self
            .path
            .iter()
            .filter_map(|key| links.get(key))
            .map(LinkState::occupancy)
            .sum();

        Snapshot {
            time: now,
            cwnd: self.congestion.cwnd(),
            throughput: self.throughput,
            buffer: queued / self.mss,
            inflight: self.inflight,
            phase: self.congestion.phase(),
            sent: self.sent,
            delivered: self.delivered,
            dropped: self.dropped,
        }
    }

    fn view(&self) -> FlowView<'_> {
        FlowView {
            id: &self.id,
            cwnd: self.congestion.cwnd(),
            inflight: self.inflight,
            delivered: self.delivered,
            acked: self.acked,
            pending_acks: self.acks.pending(),
        }
    }
}

/// Fixed-step simulation of flows over a routed topology.
#[derive(Debug)]
pub struct MultiFlowSimulation {
    flows: Vec<FlowState>,
    links: BTreeMap<LinkKey, LinkState>,
    timing: Timing,
    sample_every: usize,
    cwnd_floor: f64,
    checker: InvariantChecker,
    debug: DebugInfo,
    warnings: Vec<String>,
}

impl MultiFlowSimulation {
    /// Prepares a run of `flows` over `topology` using precomputed `routes`.
    ///
    /// Flows missing from `routes`, or routed over links the topology does not
    /// have, are left unroutable.
    ///
    /// # Errors
    /// - `TidalError::DuplicateFlow` - Two flows share an id
    /// - `TidalError::InvalidParameter` - Bad timing or link parameters
    /// - `TidalError::Configuration` - Unusable configuration
    pub fn new(
        topology: &Topology,
        flows: &[FlowSpec],
        routes: &RoutingTable,
        timing: Timing,
        config: &TidalConfig,
    ) -> Result<Self> {
        config.validate()?;
        timing.validate()?;
        ensure_unique_ids(flows)?;
        for (key, params) in &topology.links {
            params.validate().map_err(|error| match error {
                TidalError::InvalidParameter { parameter, reason } => {
                    TidalError::invalid(format!("link {key} {parameter}"), reason)
                }
                other => other,
            })?;
        }

        let mut warnings = topology.warnings.clone();
        let mut paths = RoutingTable::new();
        let mut states = Vec::with_capacity(flows.len());
        for flow in flows {
            let id = flow.flow_id();
            let mut path = routes.get(&id).cloned().unwrap_or_default();
            let missing = path
                .iter()
                .find(|key| !topology.links.contains_key(*key))
                .cloned();
            if let Some(missing) = missing {
                let message = format!("Flow {id} routed over unknown link {missing}, ignoring");
                warn!("{message}");
                warnings.push(message);
                path.clear();
            }
            if path.is_empty() {
                debug!(flow = %id, "Flow is unroutable and will not send");
            }

            states.push(flow_state(id.clone(), flow, path.clone(), topology, timing, config));
            paths.insert(id, path);
        }

        let links = topology
            .links
            .iter()
            .map(|(key, params)| (key.clone(), LinkState::new(*params)))
            .collect();

        let debug = DebugInfo {
            links: BTreeMap::new(),
            paths,
            graph_nodes: topology.graph.nodes(),
        };

        Ok(Self {
            flows: states,
            links,
            timing,
            sample_every: sample_every(config.multi.sample_interval_secs, timing.dt),
            cwnd_floor: config.congestion.cwnd_floor,
            checker: InvariantChecker::default(),
            debug,
            warnings,
        })
    }

    /// Replaces the default invariant checker.
    pub fn with_checker(mut self, checker: InvariantChecker) -> Self {
        self.checker = checker;
        self
    }

    /// Runs every step and returns traces, debug state and violations.
    pub fn run(mut self) -> MultiFlowReport {
        let steps = self.timing.steps();
        info!(
            flows = self.flows.len(),
            links = self.links.len(),
            steps,
            dt = self.timing.dt,
            "Starting multi-flow simulation"
        );

        let mut traces: BTreeMap<FlowId, Trace> = self
            .flows
            .iter()
            .map(|flow| {
                (
                    flow.id.clone(),
                    Trace::with_capacity(steps / self.sample_every + 1),
                )
            })
            .collect();

        for step in 0..steps {
            let now = step as f64 * self.timing.dt;
            self.step(step, now);

            if step % self.sample_every == 0 {
                for flow in &self.flows {
                    if let Some(trace) = traces.get_mut(&flow.id) {
                        trace.push(flow.snapshot(now, &self.links));
                    }
                }
                for link in self.links.values_mut() {
                    link.record_depth();
                }
            }

            let view = StepView {
                step,
                time: now,
                cwnd_floor: self.cwnd_floor,
                flows: self.flows.iter().map(FlowState::view).collect(),
                links: &self.links,
            };
            self.checker.check(&view);
        }

        for flow in &self.flows {
            info!(
                flow = %flow.id,
                algorithm = %flow.congestion.algorithm(),
                sent = flow.sent,
                delivered = flow.delivered,
                dropped = flow.dropped,
                "Flow finished"
            );
        }

        let mut debug = self.debug;
        debug.links = self
            .links
            .into_iter()
            .map(|(key, link)| (key, link.into_debug()))
            .collect();

        MultiFlowReport {
            traces,
            debug,
            warnings: self.warnings,
            violations: self.checker.into_violations(),
        }
    }

    fn step(&mut self, step: usize, now: f64) {
        let dt = self.timing.dt;

        for flow in self.flows.iter_mut().filter(|flow| flow.is_routed()) {
            let packets = flow.pace(dt);
            if packets > 0.0 {
                for key in &flow.path {
                    if let Some(link) = self.links.get_mut(key) {
                        link.enqueue(&flow.id, packets * flow.mss);
                    }
                }
            }
        }

        for link in self.links.values_mut() {
            link.serve(dt);
        }

        for flow in self.flows.iter_mut().filter(|flow| flow.is_routed()) {
            let mut delivered = f64::INFINITY;
            let mut dropped: f64 = 0.0;
            let mut queue_delay = 0.0;
            for key in &flow.path {
                match self.links.get(key) {
                    Some(link) => {
                        delivered = delivered.min(link.drained_for(&flow.id));
                        dropped = dropped.max(link.dropped_for(&flow.id));
                        queue_delay += link.queue_delay();
                    }
                    None => delivered = 0.0,
                }
            }

            flow.settle(
                delivered / flow.mss,
                dropped / flow.mss,
                queue_delay,
                now,
                dt,
            );

            trace!(
                step,
                flow = %flow.id,
                sent = flow.sent_step,
                cwnd = flow.congestion.cwnd(),
                inflight = flow.inflight,
                "Multi-flow step"
            );
        }
    }
}

fn ensure_unique_ids(flows: &[FlowSpec]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for flow in flows {
        let id = flow.flow_id();
        if !seen.insert(id.clone()) {
            return Err(TidalError::DuplicateFlow {
                flow_id: id.to_string(),
            });
        }
    }
    Ok(())
}

fn flow_state(
    id: FlowId,
    flow: &FlowSpec,
    path: Vec<LinkKey>,
    topology: &Topology,
    timing: Timing,
    config: &TidalConfig,
) -> FlowState {
    let links: Vec<_> = path.iter().filter_map(|key| topology.link(key)).collect();

    let mss = links
        .first()
        .map_or(config.multi.default_link.mss, |link| link.mss)
        .max(1);
    let delay_ms: f64 = links.iter().map(|link| link.delay).sum();
    let base_rtt = (2.0 * delay_ms / 1000.0).max(MIN_BASE_RTT);
    let bottleneck_pps = links
        .iter()
        .map(|link| link.packets_per_sec())
        .fold(f64::INFINITY, f64::min);
    let bottleneck_pps = if bottleneck_pps.is_finite() {
        bottleneck_pps
    } else {
        EPSILON
    };

    // Longest round trip happens with every buffer on the path full
    let worst_queueing: f64 = links
        .iter()
        .map(|link| link.buffer_bytes() / link.bytes_per_sec().max(EPSILON))
        .sum();
    let horizon = ((base_rtt + worst_queueing) / timing.dt).ceil() as usize + 1;

    let congestion = Congestion::new(
        flow.algorithm,
        &config.congestion,
        PathEstimate {
            bottleneck_pps,
            base_rtt,
        },
        WindowState::new(config.multi.initial_cwnd, config.multi.initial_ssthresh),
    );

    FlowState {
        id,
        path,
        mss: f64::from(mss),
        base_rtt,
        congestion,
        acks: DelayLine::with_horizon(horizon),
        inflight: 0.0,
        pacing_credit: 0.0,
        full_timer: 0.0,
        sent: 0.0,
        delivered: 0.0,
        dropped: 0.0,
        acked: 0.0,
        sent_step: 0.0,
        throughput: 0.0,
    }
}

/// Routes `flows` over `topology` and runs the multi-flow simulation.
///
/// # Errors
/// - `TidalError::DuplicateFlow` - Two flows share an id
/// - `TidalError::InvalidParameter` - Bad timing or link parameters
/// - `TidalError::Configuration` - Unusable configuration
pub fn run_multi_flow(
    topology: &Topology,
    flows: &[FlowSpec],
    timing: Timing,
    config: &TidalConfig,
) -> Result<MultiFlowReport> {
    let router = PathRouter::new(LinkCost::from(config.routing));
    let routes = router.route(topology, flows);
    Ok(MultiFlowSimulation::new(topology, flows, &routes, timing, config)?.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_core::network::{Attachment, TopologyBuilder};
    use tidal_core::{Algorithm, LinkParams, Phase};

    fn dumbbell(kind: &str) -> Topology {
        TopologyBuilder::new(kind)
            .sender(Attachment::new("S", "R1"))
            .receiver(Attachment::new("D", "R2"))
            .build()
    }

    fn parallel() -> Topology {
        TopologyBuilder::new("parallel")
            .senders([Attachment::new("S", "R1"), Attachment::new("S", "R2")])
            .receivers([Attachment::new("D", "R1"), Attachment::new("D", "R2")])
            .build()
    }

    fn flow(id: &str, algorithm: Algorithm) -> FlowSpec {
        FlowSpec::new(id, "S", "D", algorithm)
    }

    fn run(topology: &Topology, flows: &[FlowSpec]) -> MultiFlowReport {
        run_multi_flow(
            topology,
            flows,
            Timing::new(5.0, 0.05),
            &TidalConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_step_count_includes_time_zero() {
        assert_eq!(Timing::new(20.0, 0.05).steps(), 401);
        assert_eq!(Timing::new(0.01, 0.05).steps(), 1);
    }

    #[test]
    fn test_huge_step_ratio_saturates_and_is_rejected() {
        let timing = Timing::new(1e300, 1e-300);
        assert_eq!(timing.steps(), usize::MAX);
        assert!(matches!(
            timing.validate(),
            Err(TidalError::InvalidParameter { .. })
        ));
        assert!(Timing::new(20.0, 0.05).validate().is_ok());
    }

    #[test]
    fn test_sampling_times() {
        let topology = dumbbell("series");
        let report = run(&topology, &[flow("f1", Algorithm::Reno)]);
        let trace = report.trace(&FlowId::from("f1")).unwrap();
        // 101 steps sampled every 2
        assert_eq!(trace.len(), 51);
        assert_eq!(trace[0].time, 0.0);
        assert!((trace[1].time - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_series_flow_delivers_without_violations() {
        let topology = dumbbell("series");
        let report = run(&topology, &[flow("f1", Algorithm::Cubic)]);
        assert!(report.mean_throughput(&FlowId::from("f1")) > 0.0);
        assert!(report.violations.is_empty(), "{:?}", report.violations);
        assert_eq!(
            report.debug.paths[&FlowId::from("f1")],
            vec![
                LinkKey::from("S-R1"),
                LinkKey::from("R1-R2"),
                LinkKey::from("R2-D")
            ]
        );
    }

    #[test]
    fn test_unroutable_flow_emits_zero_snapshots() {
        // R9 is not a router of the template, so D stays disconnected
        let topology = TopologyBuilder::new("series")
            .sender(Attachment::new("S", "R1"))
            .receiver(Attachment::new("D", "R9"))
            .build();
        let report = run(&topology, &[flow("lost", Algorithm::Reno)]);

        let trace = report.trace(&FlowId::from("lost")).unwrap();
        assert!(!trace.is_empty());
        assert!(trace.iter().all(|s| s.throughput == 0.0 && s.sent == 0.0));
        assert!(report.debug.paths[&FlowId::from("lost")].is_empty());
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_duplicate_flow_ids_rejected() {
        let topology = dumbbell("series");
        let result = run_multi_flow(
            &topology,
            &[flow("f1", Algorithm::Reno), flow("f1", Algorithm::Bbr)],
            Timing::new(1.0, 0.05),
            &TidalConfig::default(),
        );
        assert!(matches!(result, Err(TidalError::DuplicateFlow { .. })));
    }

    #[test]
    fn test_invalid_timing_rejected() {
        let topology = dumbbell("series");
        let result = run_multi_flow(
            &topology,
            &[flow("f1", Algorithm::Reno)],
            Timing::new(1.0, 0.0),
            &TidalConfig::default(),
        );
        assert!(matches!(result, Err(TidalError::InvalidParameter { .. })));
    }

    #[test]
    fn test_invalid_link_rejected_with_key() {
        let topology = TopologyBuilder::new("single")
            .default_link(LinkParams::new(0.0, 15.0, 20, 1500))
            .sender(Attachment::new("S", "R"))
            .receiver(Attachment::new("D", "R"))
            .build();
        let error = run_multi_flow(
            &topology,
            &[flow("f1", Algorithm::Reno)],
            Timing::new(1.0, 0.05),
            &TidalConfig::default(),
        )
        .unwrap_err();
        assert!(error.to_string().contains("R-D"));
    }

    #[test]
    fn test_competing_flows_share_bottleneck() {
        let topology = dumbbell("series");
        let flows = [
            flow("a", Algorithm::Reno),
            flow("b", Algorithm::Cubic),
            flow("c", Algorithm::Bbr),
        ];
        let report = run(&topology, &flows);

        assert!(report.violations.is_empty(), "{:?}", report.violations);
        let total: f64 = flows
            .iter()
            .map(|f| report.mean_throughput(&f.flow_id()))
            .sum();
        // Shared 5 Mbps link, allowing for sampling noise
        assert!(total > 0.0);
        assert!(total <= 5.0 + 1e-6);
        for f in &flows {
            let trace = report.trace(&f.flow_id()).unwrap();
            assert!(trace.iter().all(|s| s.cwnd >= 1.0 && s.inflight >= 0.0));
        }
    }

    #[test]
    fn test_queue_history_recorded_per_sample() {
        let topology = dumbbell("series");
        let report = run(&topology, &[flow("f1", Algorithm::Reno)]);
        for link in report.debug.links.values() {
            assert_eq!(link.queue_history.len(), 51);
            assert!(
                link.queue_history
                    .iter()
                    .all(|depth| *depth <= f64::from(link.params.buffer) + 1e-6)
            );
        }
    }

    #[test]
    fn test_unbounded_threshold_stays_in_slow_start_until_loss() {
        let topology = dumbbell("series");
        let report = run_multi_flow(
            &topology,
            &[flow("f1", Algorithm::Reno)],
            Timing::new(0.2, 0.05),
            &TidalConfig::default(),
        )
        .unwrap();
        let trace = report.trace(&FlowId::from("f1")).unwrap();
        assert_eq!(trace[0].phase, Phase::SlowStart);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let topology = parallel();
        let flows = [flow("a", Algorithm::Reno), flow("b", Algorithm::Cubic)];
        let first = run(&topology, &flows);
        assert_ne!(
            first.debug.paths[&FlowId::from("a")],
            first.debug.paths[&FlowId::from("b")]
        );
        let second = run(&topology, &flows);
        assert_eq!(first.traces, second.traces);
        assert_eq!(first.debug, second.debug);
    }
}
