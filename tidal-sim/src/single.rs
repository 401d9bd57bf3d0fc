//! One flow over one bottleneck link.
//!
//! Packets are whole units here: the sender releases integer packets from a
//! pacing credit, the link serves at most `floor(pps * dt)` whole packets per step, and
//! acknowledgements come back through a [`DelayLine`] one round trip later.

use serde::{Deserialize, Serialize};
use tidal_core::config::{SingleFlowConfig, sample_every};
use tidal_core::congestion::PathEstimate;
use tidal_core::{
    Algorithm, Congestion, EPSILON, LinkParams, LossSignal, Result, StepSignal, TidalConfig,
    WindowState, ensure_positive,
};
use tracing::{debug, info, trace};

use crate::delay_line::DelayLine;
use crate::trace::{FlowTotals, SingleFlowReport, Snapshot, Trace};

/// Inputs of a single bottleneck run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleFlowParams {
    pub algorithm: Algorithm,
    /// Bottleneck rate in Mbps
    pub bandwidth: f64,
    /// One-way propagation delay in ms
    pub delay: f64,
    /// Bottleneck buffer in packets
    pub buffer: u32,
    /// Simulated time in seconds
    pub duration: f64,
    /// Segment size in bytes
    pub mss: u32,
}

impl Default for SingleFlowParams {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Reno,
            bandwidth: 7.0,
            delay: 10.0,
            buffer: 50,
            duration: 10.0,
            mss: 1500,
        }
    }
}

impl SingleFlowParams {
    /// Bottleneck link described by these parameters.
    pub fn link(&self) -> LinkParams {
        LinkParams::new(self.bandwidth, self.delay, self.buffer, self.mss)
    }

    /// Propagation round trip in seconds.
    pub fn base_rtt(&self) -> f64 {
        2.0 * self.delay / 1000.0
    }

    /// Checks every input is in range.
    ///
    /// # Errors
    /// - `TidalError::InvalidParameter` - Bandwidth, duration or segment size not
    ///   positive, negative delay, or buffer below one packet
    pub fn validate(&self) -> Result<()> {
        self.link().validate()?;
        ensure_positive("duration", self.duration)
    }
}

/// Fixed-step simulation of one flow through one bottleneck.
#[derive(Debug)]
pub struct SingleFlowSimulation {
    params: SingleFlowParams,
    dt: f64,
    steps: usize,
    sample_every: usize,
    base_rtt: f64,
    link_pps: f64,
    buffer_capacity: u64,
    congestion: Congestion,
    acks: DelayLine<u64>,
    buffer: u64,
    inflight: u64,
    pacing_credit: f64,
    full_timer: f64,
    totals: FlowTotals,
}

impl SingleFlowSimulation {
    /// Validates `params` and prepares the run.
    ///
    /// # Errors
    /// - `TidalError::InvalidParameter` - Input out of range
    /// - `TidalError::Configuration` - Unusable configuration
    pub fn new(params: SingleFlowParams, config: &TidalConfig) -> Result<Self> {
        params.validate()?;
        config.validate()?;

        let SingleFlowConfig {
            step_secs: dt,
            sample_interval_secs,
            initial_cwnd,
            initial_ssthresh,
        } = config.single;

        let link = params.link();
        let base_rtt = params.base_rtt();
        let link_pps = link.packets_per_sec();
        let steps = ((params.duration / dt).floor() as usize).max(1);

        // Longest round trip happens with a full buffer
        let worst_rtt = base_rtt + f64::from(params.buffer) / link_pps;
        let horizon = (worst_rtt / dt).ceil() as usize + 1;

        let congestion = Congestion::new(
            params.algorithm,
            &config.congestion,
            PathEstimate {
                bottleneck_pps: link_pps,
                base_rtt,
            },
            WindowState::new(initial_cwnd, initial_ssthresh),
        );

        Ok(Self {
            params,
            dt,
            steps,
            sample_every: sample_every(sample_interval_secs, dt),
            base_rtt,
            link_pps,
            buffer_capacity: u64::from(params.buffer),
            congestion,
            acks: DelayLine::with_horizon(horizon),
            buffer: 0,
            inflight: 0,
            pacing_credit: 0.0,
            full_timer: 0.0,
            totals: FlowTotals::default(),
        })
    }

    /// Runs every step and returns the sampled trace with final totals.
    pub fn run(mut self) -> SingleFlowReport {
        info!(
            algorithm = %self.params.algorithm,
            bandwidth = self.params.bandwidth,
            delay = self.params.delay,
            buffer = self.params.buffer,
            steps = self.steps,
            "Starting single-flow simulation"
        );

        let mut trace = Trace::with_capacity(self.steps / self.sample_every + 1);
        for step in 0..self.steps {
            let snapshot = self.step(step);
            if step % self.sample_every == 0 {
                trace.push(snapshot);
            }
        }

        self.totals.pending_acks = self.acks.pending();
        info!(
            sent = self.totals.sent,
            delivered = self.totals.delivered,
            dropped = self.totals.dropped,
            samples = trace.len(),
            "Single-flow simulation finished"
        );

        SingleFlowReport {
            trace,
            totals: self.totals,
        }
    }

    fn step(&mut self, step: usize) -> Snapshot {
        let dt = self.dt;
        let now = (step + 1) as f64 * dt;

        let queue_delay = self.buffer as f64 / self.link_pps;
        let rtt_sample = self.base_rtt + queue_delay;
        let rtt_steps = ((rtt_sample / dt).round() as usize).max(1);

        // Pace whole packets, limited by the window
        let cwnd = self.congestion.cwnd();
        self.pacing_credit += cwnd / self.base_rtt.max(EPSILON) * dt;
        let window_left = (cwnd.floor() - self.inflight as f64).max(0.0);
        let to_send = self.pacing_credit.floor().min(window_left).max(0.0) as u64;
        if to_send > 0 {
            self.pacing_credit -= to_send as f64;
            self.buffer += to_send;
            self.inflight += to_send;
            self.totals.sent += to_send;
        }

        let dropped = self.buffer.saturating_sub(self.buffer_capacity);
        if dropped > 0 {
            self.buffer = self.buffer_capacity;
            self.inflight = self.inflight.saturating_sub(dropped);
            self.totals.dropped += dropped;
        }

        // Whole packets only, never above the link rate within a step
        let drained = self.buffer.min((self.link_pps * dt).floor() as u64);
        self.buffer -= drained;
        self.totals.delivered += drained;

        self.acks.schedule(rtt_steps, drained);
        let acked = self.acks.advance();
        self.inflight = self.inflight.saturating_sub(acked);
        self.totals.acked += acked;

        let throughput = drained as f64 * f64::from(self.params.mss) * 8.0 / (dt * 1e6);

        if dropped > 0 {
            self.full_timer += dt;
        } else {
            self.full_timer = (self.full_timer - dt).max(0.0);
        }
        let loss = LossSignal::classify(dropped as f64, self.full_timer, rtt_sample);
        if loss == LossSignal::TimeoutLike {
            debug!(time = now, full_timer = self.full_timer, "Timeout-like loss");
        }

        self.congestion.on_step(&StepSignal {
            acked: acked as f64,
            loss,
            now,
            rtt: rtt_sample,
        });

        trace!(
            step,
            sent = to_send,
            dropped,
            drained,
            acked,
            buffer = self.buffer,
            inflight = self.inflight,
            "Single-flow step"
        );

        Snapshot {
            time: now,
            cwnd: self.congestion.cwnd(),
            throughput,
            buffer: self.buffer as f64,
            inflight: self.inflight as f64,
            phase: self.congestion.phase(),
            sent: self.totals.sent as f64,
            delivered: self.totals.delivered as f64,
            dropped: self.totals.dropped as f64,
        }
    }
}

/// Validates `params` and runs a single bottleneck simulation.
///
/// # Errors
/// - `TidalError::InvalidParameter` - Input out of range
/// - `TidalError::Configuration` - Unusable configuration
pub fn run_single_flow(params: SingleFlowParams, config: &TidalConfig) -> Result<SingleFlowReport> {
    Ok(SingleFlowSimulation::new(params, config)?.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_core::{Phase, TidalError};

    fn run(params: SingleFlowParams) -> SingleFlowReport {
        run_single_flow(params, &TidalConfig::default()).unwrap()
    }

    #[test]
    fn test_default_run_sampling() {
        let report = run(SingleFlowParams::default());
        // 1000 steps sampled every 10
        assert_eq!(report.trace.len(), 100);
        assert!((report.trace[0].time - 0.01).abs() < 1e-12);
        assert!((report.trace[1].time - 0.11).abs() < 1e-12);
        assert!(
            report
                .trace
                .windows(2)
                .all(|pair| pair[0].time < pair[1].time)
        );
    }

    #[test]
    fn test_identical_runs_identical_traces() {
        for algorithm in [Algorithm::Reno, Algorithm::Cubic, Algorithm::Bbr] {
            let params = SingleFlowParams {
                algorithm,
                ..Default::default()
            };
            assert_eq!(run(params), run(params));
        }
    }

    #[test]
    fn test_delivered_equals_acked_plus_pending() {
        for algorithm in [Algorithm::Reno, Algorithm::Cubic, Algorithm::Bbr] {
            let report = run(SingleFlowParams {
                algorithm,
                buffer: 5,
                ..Default::default()
            });
            let totals = report.totals;
            assert_eq!(totals.delivered, totals.acked + totals.pending_acks);
            assert!(totals.sent >= totals.delivered + totals.dropped);
        }
    }

    #[test]
    fn test_window_never_below_floor() {
        let report = run(SingleFlowParams {
            buffer: 1,
            ..Default::default()
        });
        assert!(report.trace.iter().all(|s| s.cwnd >= 1.0));
        assert!(report.trace.iter().all(|s| s.inflight >= 0.0));
    }

    #[test]
    fn test_small_buffer_causes_drops() {
        let report = run(SingleFlowParams {
            buffer: 2,
            ..Default::default()
        });
        assert!(report.totals.dropped > 0);
        assert!(
            report
                .trace
                .iter()
                .any(|s| s.phase == Phase::CongestionAvoidance)
        );
    }

    #[test]
    fn test_throughput_bounded_by_bandwidth() {
        let report = run(SingleFlowParams::default());
        assert!(report.trace.iter().all(|s| s.throughput <= 7.0 + 1e-9));
        // 5.83 packets per step serve 5 whole packets
        assert!(report.trace.iter().any(|s| (s.throughput - 6.0).abs() < 1e-9));
    }

    #[test]
    fn test_sub_packet_link_delivers_nothing() {
        // 0.1 Mbps serves 0.083 packets per step
        let report = run(SingleFlowParams {
            bandwidth: 0.1,
            ..Default::default()
        });
        assert_eq!(report.totals.delivered, 0);
        assert!(report.trace.iter().all(|s| s.throughput == 0.0));
        assert!(report.trace.iter().all(|s| s.buffer <= 50.0));
    }

    #[test]
    fn test_timeout_like_loss_resets_reno_to_slow_start() {
        // Zero propagation delay: one step of sustained loss already spans the RTT
        let params = SingleFlowParams {
            algorithm: Algorithm::Reno,
            bandwidth: 2.4,
            delay: 0.0,
            buffer: 1,
            duration: 1.0,
            mss: 1500,
        };
        let mut sim = SingleFlowSimulation::new(params, &TidalConfig::default()).unwrap();
        let mut resets_from_avoidance = 0;
        let mut loss_steps = 0;
        for step in 0..sim.steps {
            let dropped_before = sim.totals.dropped;
            let phase_before = sim.congestion.phase();
            let snapshot = sim.step(step);
            if sim.totals.dropped > dropped_before {
                loss_steps += 1;
                assert!(sim.full_timer >= 0.01 - 1e-12);
                assert_eq!(snapshot.cwnd, 1.0);
                assert_eq!(snapshot.phase, Phase::SlowStart);
                assert_eq!(sim.congestion.window().ssthresh, 2.0);
                assert!(!sim.congestion.window().in_fast_recovery);
                if phase_before == Phase::CongestionAvoidance {
                    resets_from_avoidance += 1;
                }
            }
        }
        assert!(loss_steps > 0);
        assert!(resets_from_avoidance > 0);
    }

    #[test]
    fn test_isolated_loss_enters_fast_recovery() {
        let params = SingleFlowParams {
            algorithm: Algorithm::Reno,
            bandwidth: 2.4,
            delay: 50.0,
            buffer: 5,
            duration: 2.0,
            mss: 1500,
        };
        let mut sim = SingleFlowSimulation::new(params, &TidalConfig::default()).unwrap();
        for step in 0..sim.steps {
            let dropped_before = sim.totals.dropped;
            let cwnd_before = sim.congestion.cwnd();
            let snapshot = sim.step(step);
            if sim.totals.dropped > dropped_before {
                // One lossy step is far shorter than the 100 ms RTT
                assert!(sim.full_timer < params.base_rtt());
                let window = sim.congestion.window();
                assert!(window.in_fast_recovery);
                assert_eq!(snapshot.phase, Phase::CongestionAvoidance);
                assert_eq!(window.ssthresh, (cwnd_before / 2.0).max(2.0));
                assert!(snapshot.cwnd >= window.ssthresh);
                assert!(snapshot.cwnd > 1.0);
                return;
            }
        }
        panic!("expected a drop with a five packet buffer");
    }

    #[test]
    fn test_short_duration_runs_one_step() {
        let report = run(SingleFlowParams {
            duration: 0.001,
            ..Default::default()
        });
        assert_eq!(report.trace.len(), 1);
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        let config = TidalConfig::default();
        let cases = [
            SingleFlowParams {
                bandwidth: 0.0,
                ..Default::default()
            },
            SingleFlowParams {
                delay: -1.0,
                ..Default::default()
            },
            SingleFlowParams {
                buffer: 0,
                ..Default::default()
            },
            SingleFlowParams {
                duration: 0.0,
                ..Default::default()
            },
            SingleFlowParams {
                mss: 0,
                ..Default::default()
            },
        ];
        for params in cases {
            assert!(matches!(
                run_single_flow(params, &config),
                Err(TidalError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_bbr_settles_near_bdp() {
        let params = SingleFlowParams {
            algorithm: Algorithm::Bbr,
            buffer: 200,
            ..Default::default()
        };
        let report = run(params);
        let bdp = params.link().packets_per_sec() * params.base_rtt();
        let last = report.trace.last().unwrap();
        assert!((last.cwnd - bdp.max(4.0)).abs() < 1.0);
    }
}
