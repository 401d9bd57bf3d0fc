//! Per-flow congestion controllers.
//!
//! Each simulation step a flow reports how many packets were acknowledged and
//! whether a drop happened; the controller for the flow's algorithm turns that
//! into the next congestion window and phase. [`Congestion`] owns the window
//! state, dispatches to the algorithm and enforces the configured window floor.

mod bbr;
mod cubic;
mod reno;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::trace;

pub use bbr::Bbr;
pub use cubic::Cubic;
pub use reno::Reno;

use crate::TidalError;
use crate::config::CongestionConfig;

/// Congestion control algorithm selected for a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Algorithm {
    #[default]
    Reno,
    Cubic,
    /// Bandwidth-delay-product tracker, not full BBR
    Bbr,
}

impl Algorithm {
    /// Canonical display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Reno => "Reno",
            Algorithm::Cubic => "Cubic",
            Algorithm::Bbr => "BBR",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = TidalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reno" => Ok(Algorithm::Reno),
            "cubic" => Ok(Algorithm::Cubic),
            "bbr" => Ok(Algorithm::Bbr),
            _ => Err(TidalError::UnknownAlgorithm {
                name: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Algorithm {
    type Error = TidalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Algorithm> for String {
    fn from(algorithm: Algorithm) -> Self {
        algorithm.as_str().to_string()
    }
}

/// Growth phase reported in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    SlowStart,
    CongestionAvoidance,
    /// Sample produced by the external packet-level engine
    #[serde(rename = "ns3")]
    External,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::SlowStart => write!(f, "slow_start"),
            Phase::CongestionAvoidance => write!(f, "congestion_avoidance"),
            Phase::External => write!(f, "ns3"),
        }
    }
}

/// Loss observed by a flow during one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LossSignal {
    #[default]
    None,
    /// Transient drop, treated like duplicate ACKs
    Isolated,
    /// Drops persisting for a full round trip, treated like a retransmission timeout
    TimeoutLike,
}

impl LossSignal {
    /// Classifies a step from the drop count and the queue-full timer.
    ///
    /// A drop is timeout-like once drops have persisted for at least one
    /// round-trip sample; any other drop is isolated.
    pub fn classify(dropped: f64, full_timer_secs: f64, rtt_sample_secs: f64) -> Self {
        if dropped <= 0.0 {
            LossSignal::None
        } else if full_timer_secs >= rtt_sample_secs {
            LossSignal::TimeoutLike
        } else {
            LossSignal::Isolated
        }
    }

    /// Returns true for either kind of loss.
    pub fn is_loss(self) -> bool {
        self != LossSignal::None
    }
}

/// Delivery and loss feedback for one step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepSignal {
    /// Packets acknowledged during the step
    pub acked: f64,
    /// Loss classification for the step
    pub loss: LossSignal,
    /// Simulation time at the end of the step, seconds
    pub now: f64,
    /// Current round-trip sample including queueing, seconds
    pub rtt: f64,
}

/// Window variables shared by every algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowState {
    /// Congestion window in packets
    pub cwnd: f64,
    /// Slow start threshold in packets
    pub ssthresh: f64,
    /// Current growth phase
    pub phase: Phase,
    /// Reno fast recovery flag
    pub in_fast_recovery: bool,
}

impl WindowState {
    /// Creates window state in slow start.
    pub fn new(cwnd: f64, ssthresh: f64) -> Self {
        Self {
            cwnd,
            ssthresh,
            phase: Phase::SlowStart,
            in_fast_recovery: false,
        }
    }

    /// Slow start growth shared by Reno and Cubic.
    ///
    /// Grows the window by the acknowledged packets and leaves slow start once
    /// the threshold is reached.
    pub(crate) fn slow_start(&mut self, acked: f64) {
        self.cwnd += acked;
        if self.cwnd >= self.ssthresh {
            self.phase = Phase::CongestionAvoidance;
        }
    }
}

/// Window restored by Reno after a timeout-like loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutReset {
    /// Restart slow start from one packet
    #[default]
    ToOne,
    /// Restart from the halved threshold
    ToThreshold,
}

/// Algorithm-specific window update.
pub trait CongestionController: fmt::Debug + Send {
    /// Algorithm implemented by this controller.
    fn algorithm(&self) -> Algorithm;

    /// Applies one step of feedback to `window`.
    ///
    /// The caller clamps the window to the configured floor afterwards.
    fn on_step(&mut self, window: &mut WindowState, signal: &StepSignal);
}

/// Path properties a controller may need at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathEstimate {
    /// Bottleneck service rate in packets per second
    pub bottleneck_pps: f64,
    /// Propagation round trip in seconds
    pub base_rtt: f64,
}

impl PathEstimate {
    /// Bandwidth-delay product in packets.
    pub fn bdp_packets(&self) -> f64 {
        self.bottleneck_pps * self.base_rtt
    }
}

/// Window state plus the controller driving it.
#[derive(Debug)]
pub struct Congestion {
    window: WindowState,
    controller: Box<dyn CongestionController>,
    cwnd_floor: f64,
}

impl Congestion {
    /// Creates congestion state for `algorithm`.
    pub fn new(
        algorithm: Algorithm,
        config: &CongestionConfig,
        path: PathEstimate,
        initial: WindowState,
    ) -> Self {
        let controller: Box<dyn CongestionController> = match algorithm {
            Algorithm::Reno => Box::new(Reno::new(config.reno_timeout_reset)),
            Algorithm::Cubic => {
                Box::new(Cubic::new(config.cubic_c, config.cubic_beta, initial.cwnd))
            }
            Algorithm::Bbr => Box::new(Bbr::new(
                path.bdp_packets(),
                config.bbr_gain,
                config.bbr_loss_backoff,
                config.bbr_min_cwnd,
            )),
        };

        let cwnd_floor = config.cwnd_floor.max(1.0);
        let mut window = initial;
        window.cwnd = window.cwnd.max(cwnd_floor);

        Self {
            window,
            controller,
            cwnd_floor,
        }
    }

    /// Applies one step of feedback and clamps the window to the floor.
    pub fn on_step(&mut self, signal: &StepSignal) {
        self.controller.on_step(&mut self.window, signal);
        if !self.window.cwnd.is_finite() {
            self.window.cwnd = self.cwnd_floor;
        }
        self.window.cwnd = self.window.cwnd.max(self.cwnd_floor);

        trace!(
            algorithm = %self.controller.algorithm(),
            cwnd = self.window.cwnd,
            ssthresh = self.window.ssthresh,
            phase = %self.window.phase,
            acked = signal.acked,
            loss = ?signal.loss,
            "Congestion step"
        );
    }

    /// Current window state.
    pub fn window(&self) -> &WindowState {
        &self.window
    }

    /// Congestion window in packets.
    pub fn cwnd(&self) -> f64 {
        self.window.cwnd
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.window.phase
    }

    /// Algorithm of the underlying controller.
    pub fn algorithm(&self) -> Algorithm {
        self.controller.algorithm()
    }

    /// Lowest window this state will report.
    pub fn cwnd_floor(&self) -> f64 {
        self.cwnd_floor
    }
}
