//! Tidal Simulation - Fixed-step fluid models of TCP congestion control.

//!
//! This crate drives the controllers from `tidal-core` through two link
//! models and collects sampled traces:
//!
//! - **Single flow**: one sender over one bottleneck, integer packets, an
//!   acknowledgement delay line sized from the worst-case round trip
//! - **Multi flow**: flows routed over a topology, per-flow backlog on every
//!   link, proportional service and drop
//! - **Invariants**: conservation and bound checks run after every step
//! - **ns-3 bridge**: the same dumbbell run through a packet-level simulator
//!
//! Runs are deterministic: identical inputs produce identical traces.
//!
//! # Example
//!
//! ```rust,no_run
//! use tidal_core::{Algorithm, TidalConfig};
//! use tidal_sim::{SingleFlowParams, run_single_flow};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let params = SingleFlowParams {
//!     algorithm: Algorithm::Cubic,
//!     bandwidth: 10.0,
//!     ..Default::default()
//! };
//! let report = run_single_flow(params, &TidalConfig::default())?;
//! println!("Mean throughput {:.2} Mbps", report.mean_throughput());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]

pub mod delay_line;
pub mod invariants;
pub mod link;
pub mod multi;
pub mod ns3;
pub mod scenario;
pub mod single;
pub mod trace;

pub use delay_line::DelayLine;
pub use invariants::{
    DeliveryConservationInvariant, FlowView, InflightNonNegativeInvariant, Invariant,
    InvariantChecker, InvariantViolation, QueueConservationInvariant, StepView,
    WindowFloorInvariant,
};
pub use link::{LinkDebug, LinkState, distribute_proportionally};
pub use multi::{MultiFlowSimulation, Timing, run_multi_flow};
pub use ns3::{EngineError, Ns3Bridge, Ns3Report, Ns3Request, parse_trace};
pub use scenario::{Scenario, ScenarioLinkParams};
pub use single::{SingleFlowParams, SingleFlowSimulation, run_single_flow};
pub use trace::{DebugInfo, FlowTotals, MultiFlowReport, SingleFlowReport, Snapshot, Trace};
