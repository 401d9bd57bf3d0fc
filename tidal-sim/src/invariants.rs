//! Invariant checking framework for simulation validation.
//!
//! Invariants are evaluated against a read-only view of the multi-flow state
//! after every step. Violations are logged and recorded in the report; they
//! never abort a run.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tidal_core::{FlowId, LinkKey};
use tracing::warn;

use crate::link::LinkState;

/// Most violations kept in a single report.
pub const MAX_RECORDED_VIOLATIONS: usize = 100;

/// Absolute slack allowed when comparing accumulated floating point sums.
const TOLERANCE: f64 = 1e-6;

/// Violation of a simulation invariant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: String,
    /// Detailed description of the violation
    pub description: String,
    /// Step index at which the violation occurred
    pub step: usize,
    /// Simulation time of that step, seconds
    pub time: f64,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invariant '{}' violated at step {} (t={:.3}s): {}",
            self.invariant, self.step, self.time, self.description
        )
    }
}

/// Per-flow values visible to invariants.
#[derive(Debug, Clone, Copy)]
pub struct FlowView<'a> {
    pub id: &'a FlowId,
    pub cwnd: f64,
    pub inflight: f64,
    pub delivered: f64,
    pub acked: f64,
    pub pending_acks: f64,
}

/// Simulation state at the end of one step.
#[derive(Debug, Clone)]
pub struct StepView<'a> {
    pub step: usize,
    pub time: f64,
    pub cwnd_floor: f64,
    pub flows: Vec<FlowView<'a>>,
    pub links: &'a BTreeMap<LinkKey, LinkState>,
}

impl StepView<'_> {
    fn violation(&self, invariant: &dyn Invariant, description: String) -> InvariantViolation {
        InvariantViolation {
            invariant: invariant.name().to_string(),
            description,
            step: self.step,
            time: self.time,
        }
    }
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Trait for checking simulation invariants.
pub trait Invariant: Send + Sync {
    /// Checks if invariant holds for the current step.
    ///
    /// # Errors
    /// Returns `InvariantViolation` if the invariant condition is not met.
    fn check(&self, view: &StepView<'_>) -> Result<(), InvariantViolation>;

    /// Returns name of this invariant.
    fn name(&self) -> &str;
}

/// Per-flow backlog sums to link occupancy, which fits the buffer.
pub struct QueueConservationInvariant;

impl Invariant for QueueConservationInvariant {
    fn check(&self, view: &StepView<'_>) -> Result<(), InvariantViolation> {
        for (key, link) in view.links {
            let per_flow: f64 = link.backlog().values().sum();
            if !approx_eq(per_flow, link.occupancy()) {
                return Err(view.violation(
                    self,
                    format!(
                        "Link {key}: per-flow backlog {per_flow} != occupancy {}",
                        link.occupancy()
                    ),
                ));
            }

            let capacity = link.params().buffer_bytes();
            if link.occupancy() > capacity && !approx_eq(link.occupancy(), capacity) {
                return Err(view.violation(
                    self,
                    format!(
                        "Link {key}: occupancy {} exceeds buffer {capacity}",
                        link.occupancy()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "QueueConservation"
    }
}

/// Congestion windows never fall below the configured floor.
pub struct WindowFloorInvariant;

impl Invariant for WindowFloorInvariant {
    fn check(&self, view: &StepView<'_>) -> Result<(), InvariantViolation> {
        for flow in &view.flows {
            if !flow.cwnd.is_finite() || flow.cwnd < view.cwnd_floor {
                return Err(view.violation(
                    self,
                    format!(
                        "Flow {}: cwnd {} below floor {}",
                        flow.id, flow.cwnd, view.cwnd_floor
                    ),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "WindowFloor"
    }
}

/// In-flight packet counts stay non-negative.
pub struct InflightNonNegativeInvariant;

impl Invariant for InflightNonNegativeInvariant {
    fn check(&self, view: &StepView<'_>) -> Result<(), InvariantViolation> {
        for flow in &view.flows {
            if flow.inflight < 0.0 || flow.inflight.is_nan() {
                return Err(view.violation(
                    self,
                    format!("Flow {}: negative in-flight {}", flow.id, flow.inflight),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "InflightNonNegative"
    }
}

/// Every delivered packet is either acknowledged or still scheduled.
pub struct DeliveryConservationInvariant;

impl Invariant for DeliveryConservationInvariant {
    fn check(&self, view: &StepView<'_>) -> Result<(), InvariantViolation> {
        for flow in &view.flows {
            let accounted = flow.acked + flow.pending_acks;
            if !approx_eq(flow.delivered, accounted) {
                return Err(view.violation(
                    self,
                    format!(
                        "Flow {}: delivered {} != acked {} + pending {}",
                        flow.id, flow.delivered, flow.acked, flow.pending_acks
                    ),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "DeliveryConservation"
    }
}

/// Registered invariants plus the violations they have produced.
pub struct InvariantChecker {
    invariants: Vec<Box<dyn Invariant>>,
    violations: Vec<InvariantViolation>,
    suppressed: usize,
}

impl fmt::Debug for InvariantChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.invariants.iter().map(|i| i.name()).collect();
        f.debug_struct("InvariantChecker")
            .field("invariants", &names)
            .field("violations", &self.violations.len())
            .field("suppressed", &self.suppressed)
            .finish()
    }
}

impl Default for InvariantChecker {
    fn default() -> Self {
        let mut checker = Self::empty();
        checker.add(Box::new(QueueConservationInvariant));
        checker.add(Box::new(WindowFloorInvariant));
        checker.add(Box::new(InflightNonNegativeInvariant));
        checker.add(Box::new(DeliveryConservationInvariant));
        checker
    }
}

impl InvariantChecker {
    /// Creates checker with no invariants registered.
    pub fn empty() -> Self {
        Self {
            invariants: Vec::new(),
            violations: Vec::new(),
            suppressed: 0,
        }
    }

    /// Adds invariant to check.
    pub fn add(&mut self, invariant: Box<dyn Invariant>) {
        self.invariants.push(invariant);
    }

    /// Checks every invariant against `view` and records failures.
    pub fn check(&mut self, view: &StepView<'_>) {
        for invariant in &self.invariants {
            if let Err(violation) = invariant.check(view) {
                if self.violations.len() < MAX_RECORDED_VIOLATIONS {
                    warn!("{violation}");
                    self.violations.push(violation);
                } else {
                    self.suppressed += 1;
                }
            }
        }
    }

    /// Violations recorded so far.
    pub fn violations(&self) -> &[InvariantViolation] {
        &self.violations
    }

    /// Violations beyond the recording limit.
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    /// Consumes the checker, returning the recorded violations.
    pub fn into_violations(self) -> Vec<InvariantViolation> {
        if self.suppressed > 0 {
            warn!(
                "{} further invariant violations were not recorded",
                self.suppressed
            );
        }
        self.violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_core::LinkParams;

    fn view<'a>(
        flows: Vec<FlowView<'a>>,
        links: &'a BTreeMap<LinkKey, LinkState>,
    ) -> StepView<'a> {
        StepView {
            step: 7,
            time: 0.35,
            cwnd_floor: 1.0,
            flows,
            links,
        }
    }

    fn flow_view(id: &FlowId) -> FlowView<'_> {
        FlowView {
            id,
            cwnd: 4.0,
            inflight: 2.0,
            delivered: 10.0,
            acked: 6.0,
            pending_acks: 4.0,
        }
    }

    #[test]
    fn test_healthy_state_passes_all() {
        let id = FlowId::from("f1");
        let mut links = BTreeMap::new();
        let mut link = LinkState::new(LinkParams::default());
        link.enqueue(&id, 1500.0);
        links.insert(LinkKey::from("S-R"), link);

        let mut checker = InvariantChecker::default();
        checker.check(&view(vec![flow_view(&id)], &links));
        assert!(checker.violations().is_empty());
    }

    #[test]
    fn test_window_floor_violation() {
        let id = FlowId::from("f1");
        let links = BTreeMap::new();
        let mut flow = flow_view(&id);
        flow.cwnd = 0.5;

        let result = WindowFloorInvariant.check(&view(vec![flow], &links));
        let violation = result.unwrap_err();
        assert_eq!(violation.invariant, "WindowFloor");
        assert_eq!(violation.step, 7);
    }

    #[test]
    fn test_inflight_violation() {
        let id = FlowId::from("f1");
        let links = BTreeMap::new();
        let mut flow = flow_view(&id);
        flow.inflight = -1.0;
        assert!(
            InflightNonNegativeInvariant
                .check(&view(vec![flow], &links))
                .is_err()
        );
    }

    #[test]
    fn test_delivery_conservation_violation() {
        let id = FlowId::from("f1");
        let links = BTreeMap::new();
        let mut flow = flow_view(&id);
        flow.acked = 3.0;
        assert!(
            DeliveryConservationInvariant
                .check(&view(vec![flow], &links))
                .is_err()
        );
    }

    #[test]
    fn test_overfull_link_violation() {
        let id = FlowId::from("f1");
        let mut links = BTreeMap::new();
        let mut link = LinkState::new(LinkParams::new(5.0, 15.0, 1, 1000));
        link.enqueue(&id, 5000.0);
        links.insert(LinkKey::from("S-R"), link);

        let result = QueueConservationInvariant.check(&view(Vec::new(), &links));
        assert!(result.unwrap_err().description.contains("exceeds buffer"));
    }

    #[test]
    fn test_recording_is_capped() {
        let id = FlowId::from("f1");
        let links = BTreeMap::new();
        let mut flow = flow_view(&id);
        flow.cwnd = 0.0;
        let step = view(vec![flow], &links);

        let mut checker = InvariantChecker::empty();
        checker.add(Box::new(WindowFloorInvariant));
        for _ in 0..(MAX_RECORDED_VIOLATIONS + 5) {
            checker.check(&step);
        }
        assert_eq!(checker.violations().len(), MAX_RECORDED_VIOLATIONS);
        assert_eq!(checker.suppressed(), 5);
    }

    #[test]
    fn test_violation_display() {
        let violation = InvariantViolation {
            invariant: "WindowFloor".to_string(),
            description: "Flow f1: cwnd 0 below floor 1".to_string(),
            step: 3,
            time: 0.15,
        };
        assert_eq!(
            violation.to_string(),
            "Invariant 'WindowFloor' violated at step 3 (t=0.150s): Flow f1: cwnd 0 below floor 1"
        );
    }
}
