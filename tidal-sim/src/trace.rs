//! Sampled traces and run reports.

use std::collections::BTreeMap;

use serde::Serialize;
use tidal_core::{FlowId, LinkKey, NodeId, Phase};

use crate::invariants::InvariantViolation;
use crate::link::LinkDebug;

/// State of one flow at a sampling instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    /// Simulation time in seconds
    pub time: f64,
    /// Congestion window in packets
    pub cwnd: f64,
    /// Throughput during the sampled step in Mbps
    pub throughput: f64,
    /// Queued packets on the flow's path
    pub buffer: f64,
    /// Packets sent and not yet acknowledged or dropped
    pub inflight: f64,
    pub phase: Phase,
    /// Cumulative packets sent
    pub sent: f64,
    /// Cumulative packets delivered
    pub delivered: f64,
    /// Cumulative packets dropped
    pub dropped: f64,
}

impl Snapshot {
    /// Snapshot of a flow that never sent anything.
    pub fn idle(time: f64, cwnd: f64, phase: Phase) -> Self {
        Self {
            time,
            cwnd,
            throughput: 0.0,
            buffer: 0.0,
            inflight: 0.0,
            phase,
            sent: 0.0,
            delivered: 0.0,
            dropped: 0.0,
        }
    }
}

/// Time-ascending samples of one flow.
pub type Trace = Vec<Snapshot>;

/// Cumulative packet counters at the end of a single-flow run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlowTotals {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub acked: u64,
    /// Delivered packets still waiting in the acknowledgement schedule
    pub pending_acks: u64,
}

/// Result of a single bottleneck run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleFlowReport {
    pub trace: Trace,
    pub totals: FlowTotals,
}

impl SingleFlowReport {
    /// Mean throughput over all samples in Mbps.
    pub fn mean_throughput(&self) -> f64 {
        if self.trace.is_empty() {
            return 0.0;
        }
        self.trace.iter().map(|s| s.throughput).sum::<f64>() / self.trace.len() as f64
    }
}

/// Topology and routing state reported alongside multi-flow traces.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DebugInfo {
    pub links: BTreeMap<LinkKey, LinkDebug>,
    pub paths: BTreeMap<FlowId, Vec<LinkKey>>,
    pub graph_nodes: Vec<NodeId>,
}

/// Result of a multi-flow run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MultiFlowReport {
    pub traces: BTreeMap<FlowId, Trace>,
    pub debug: DebugInfo,
    /// Non-fatal problems found while building the topology
    pub warnings: Vec<String>,
    pub violations: Vec<InvariantViolation>,
}

impl MultiFlowReport {
    /// Returns the trace of `flow`.
    pub fn trace(&self, flow: &FlowId) -> Option<&Trace> {
        self.traces.get(flow)
    }

    /// Mean sampled throughput of `flow` in Mbps, or zero if unknown.
    pub fn mean_throughput(&self, flow: &FlowId) -> f64 {
        match self.traces.get(flow) {
            Some(trace) if !trace.is_empty() => {
                trace.iter().map(|s| s.throughput).sum::<f64>() / trace.len() as f64
            }
            _ => 0.0,
        }
    }
}
