//! Simplified BBR: track the bandwidth-delay product.
//!
//! The window moves a fixed fraction of the gap toward the path BDP every
//! step and backs off multiplicatively on loss. There is no pacing gain
//! cycling, no ProbeRTT and no bandwidth filter; this is a fluid-model
//! approximation of BBR's steady state only.

use super::{Algorithm, CongestionController, StepSignal, WindowState};

/// BDP-tracking window update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbr {
    target_cwnd: f64,
    gain: f64,
    loss_backoff: f64,
    min_cwnd: f64,
}

impl Bbr {
    /// Creates controller converging to `bdp_packets`.
    pub fn new(bdp_packets: f64, gain: f64, loss_backoff: f64, min_cwnd: f64) -> Self {
        let bdp = if bdp_packets.is_finite() { bdp_packets } else { 0.0 };
        Self {
            target_cwnd: bdp.max(min_cwnd),
            gain,
            loss_backoff,
            min_cwnd,
        }
    }

    /// Window this controller converges to without loss.
    pub fn target_cwnd(&self) -> f64 {
        self.target_cwnd
    }
}

impl CongestionController for Bbr {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Bbr
    }

    fn on_step(&mut self, window: &mut WindowState, signal: &StepSignal) {
        if signal.loss.is_loss() {
            window.cwnd = (window.cwnd * self.loss_backoff).max(self.min_cwnd);
        } else {
            window.cwnd += self.gain * (self.target_cwnd - window.cwnd);
        }
    }
}
