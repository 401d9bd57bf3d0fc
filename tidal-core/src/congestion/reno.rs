//! Reno congestion control.
//!
//! Timeout-like loss restarts slow start; an isolated loss halves the window
//! once and holds it in fast recovery until an ACK arrives without new loss.

use super::{
    Algorithm, CongestionController, LossSignal, Phase, StepSignal, TimeoutReset, WindowState,
};

/// Threshold never drops below this many packets after a loss.
const MIN_SSTHRESH: f64 = 2.0;

/// Reno window update.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reno {
    timeout_reset: TimeoutReset,
}

impl Reno {
    /// Creates Reno controller restarting to `timeout_reset` after a timeout.
    pub fn new(timeout_reset: TimeoutReset) -> Self {
        Self { timeout_reset }
    }

    fn halve(window: &mut WindowState) {
        window.ssthresh = (window.cwnd / 2.0).max(MIN_SSTHRESH);
    }
}

impl CongestionController for Reno {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Reno
    }

    fn on_step(&mut self, window: &mut WindowState, signal: &StepSignal) {
        match signal.loss {
            LossSignal::TimeoutLike => {
                Self::halve(window);
                window.cwnd = match self.timeout_reset {
                    TimeoutReset::ToOne => 1.0,
                    TimeoutReset::ToThreshold => window.ssthresh,
                };
                window.phase = Phase::SlowStart;
                window.in_fast_recovery = false;
            }
            LossSignal::Isolated if !window.in_fast_recovery => {
                Self::halve(window);
                window.cwnd = window.ssthresh;
                window.in_fast_recovery = true;
                window.phase = Phase::CongestionAvoidance;
            }
            LossSignal::Isolated | LossSignal::None => {}
        }

        if window.phase == Phase::SlowStart {
            window.slow_start(signal.acked);
        } else {
            window.cwnd += signal.acked / window.cwnd.max(1.0);
        }

        if window.in_fast_recovery && signal.acked > 0.0 && signal.loss != LossSignal::Isolated {
            window.in_fast_recovery = false;
        }
    }
}
