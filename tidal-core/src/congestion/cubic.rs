//! Cubic congestion control.
//!
//! After a loss the window follows W(t) = C(t - K)^3 + W_max, concave while
//! approaching the previous maximum and convex beyond it. A Reno-friendly
//! estimate runs alongside and takes over whenever it is larger.

use super::{Algorithm, CongestionController, Phase, StepSignal, WindowState};

/// Window never drops below this many packets after a loss.
const MIN_LOSS_CWND: f64 = 2.0;

/// Cubic window update and its epoch state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cubic {
    c: f64,
    beta: f64,
    /// Window when the last loss happened
    w_max: f64,
    /// Time of the last loss, seconds
    epoch_start: f64,
    /// Time offset to reach `w_max` again, seconds
    k: f64,
    /// Reno-friendly window estimate
    w_tcp: f64,
}

impl Cubic {
    /// Creates controller with scaling constant `c` and backoff `beta`.
    pub fn new(c: f64, beta: f64, initial_cwnd: f64) -> Self {
        Self {
            c,
            beta,
            w_max: initial_cwnd,
            epoch_start: 0.0,
            k: 0.0,
            w_tcp: initial_cwnd,
        }
    }

    /// Window of the cubic curve `t` seconds after the epoch start.
    pub fn w_cubic(&self, t: f64) -> f64 {
        self.c * (t - self.k).powi(3) + self.w_max
    }

    /// Time offset K of the current epoch.
    pub fn k(&self) -> f64 {
        self.k
    }

    /// Window recorded at the last loss.
    pub fn w_max(&self) -> f64 {
        self.w_max
    }

    fn on_loss(&mut self, window: &mut WindowState, now: f64) {
        self.w_max = window.cwnd;
        self.epoch_start = now;
        window.cwnd = (window.cwnd * self.beta).max(MIN_LOSS_CWND);
        window.ssthresh = window.cwnd;
        self.k = if self.w_max > 0.0 && self.c > 0.0 {
            (self.w_max * (1.0 - self.beta) / self.c).cbrt()
        } else {
            0.0
        };
        self.w_tcp = window.cwnd;
        window.phase = Phase::CongestionAvoidance;
    }
}

impl CongestionController for Cubic {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Cubic
    }

    fn on_step(&mut self, window: &mut WindowState, signal: &StepSignal) {
        if signal.loss.is_loss() {
            self.on_loss(window, signal.now);
        }

        if window.phase == Phase::SlowStart {
            window.slow_start(signal.acked);
            return;
        }

        // Target one round trip ahead
        let t = signal.now + signal.rtt - self.epoch_start;
        let target = self.w_cubic(t);
        self.w_tcp += signal.acked / self.w_tcp.max(1.0);

        if target < self.w_tcp {
            window.cwnd = self.w_tcp;
        } else {
            window.cwnd += (target - window.cwnd) / window.cwnd.max(1.0) * signal.acked;
        }
    }
}
