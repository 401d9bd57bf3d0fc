//! Shared bottleneck queue used by the multi-flow simulator.
//!
//! A link holds a backlog per flow in bytes. Each step it serves up to one
//! step's worth of its service rate and then sheds whatever exceeds the buffer,
//! both split across flows in proportion to their share of the backlog.

use std::collections::BTreeMap;

use serde::Serialize;
use tidal_core::{FlowId, LinkParams};

/// Backlog below this many bytes is treated as empty.
const RESIDUE_BYTES: f64 = 1e-9;

/// Per-flow amounts moved by one link operation, in bytes.
pub type FlowBytes = BTreeMap<FlowId, f64>;

/// Runtime state of one link.
#[derive(Debug, Clone)]
pub struct LinkState {
    params: LinkParams,
    backlog: FlowBytes,
    occupancy: f64,
    queue_delay: f64,
    drained: FlowBytes,
    dropped: FlowBytes,
    history: Vec<f64>,
}

impl LinkState {
    /// Creates an empty link.
    pub fn new(params: LinkParams) -> Self {
        Self {
            params,
            backlog: FlowBytes::new(),
            occupancy: 0.0,
            queue_delay: 0.0,
            drained: FlowBytes::new(),
            dropped: FlowBytes::new(),
            history: Vec::new(),
        }
    }

    /// Configured parameters.
    pub fn params(&self) -> &LinkParams {
        &self.params
    }

    /// Adds `bytes` offered by `flow` to the backlog.
    pub fn enqueue(&mut self, flow: &FlowId, bytes: f64) {
        if bytes <= 0.0 {
            return;
        }
        *self.backlog.entry(flow.clone()).or_insert(0.0) += bytes;
        self.occupancy += bytes;
    }

    /// Serves up to `dt` seconds of capacity.
    ///
    /// Records the queueing delay seen by traffic this step before serving.
    pub fn drain(&mut self, dt: f64) -> FlowBytes {
        let bytes_per_sec = self.params.bytes_per_sec();
        self.queue_delay = self.occupancy / bytes_per_sec.max(tidal_core::EPSILON);

        let capacity = (bytes_per_sec * dt).max(0.0);
        let served = self.occupancy.min(capacity);
        self.remove(served)
    }

    /// Drops backlog above the buffer capacity.
    pub fn drop_overflow(&mut self) -> FlowBytes {
        let excess = self.occupancy - self.params.buffer_bytes();
        if excess <= 0.0 {
            return FlowBytes::new();
        }
        self.remove(excess)
    }

    /// Drains then drops, keeping both per-flow outcomes for this step.
    pub fn serve(&mut self, dt: f64) {
        self.drained = self.drain(dt);
        self.dropped = self.drop_overflow();
    }

    /// Bytes of `flow` served by the last [`LinkState::serve`].
    pub fn drained_for(&self, flow: &FlowId) -> f64 {
        self.drained.get(flow).copied().unwrap_or(0.0)
    }

    /// Bytes of `flow` dropped by the last [`LinkState::serve`].
    pub fn dropped_for(&self, flow: &FlowId) -> f64 {
        self.dropped.get(flow).copied().unwrap_or(0.0)
    }

    fn remove(&mut self, amount: f64) -> FlowBytes {
        let shares = distribute_proportionally(&self.backlog, amount);
        for (flow, share) in &shares {
            if let Some(queued) = self.backlog.get_mut(flow) {
                *queued = (*queued - share).max(0.0);
            }
        }
        self.backlog.retain(|_, queued| *queued > RESIDUE_BYTES);
        self.occupancy = self.backlog.values().sum();
        shares
    }

    /// Appends the current depth in packets to the history.
    pub fn record_depth(&mut self) {
        self.history.push(self.queue_packets());
    }

    /// Total queued bytes.
    pub fn occupancy(&self) -> f64 {
        self.occupancy
    }

    /// Queued bytes by flow.
    pub fn backlog(&self) -> &FlowBytes {
        &self.backlog
    }

    /// Bytes queued for one flow.
    pub fn flow_backlog(&self, flow: &FlowId) -> f64 {
        self.backlog.get(flow).copied().unwrap_or(0.0)
    }

    /// Total queued data in packets of this link's segment size.
    pub fn queue_packets(&self) -> f64 {
        self.occupancy / f64::from(self.params.mss.max(1))
    }

    /// Queueing delay recorded by the last drain, in seconds.
    pub fn queue_delay(&self) -> f64 {
        self.queue_delay
    }

    /// Sampled queue depths in packets.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// Converts into the serializable debug view.
    pub fn into_debug(self) -> LinkDebug {
        LinkDebug {
            params: self.params,
            queue_history: self.history,
        }
    }
}

/// Link parameters plus sampled queue depth, as reported after a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkDebug {
    #[serde(flatten)]
    pub params: LinkParams,
    pub queue_history: Vec<f64>,
}

/// Splits `amount` across flows in proportion to their backlog.
///
/// Returns an empty map when there is nothing queued.
pub fn distribute_proportionally(backlog: &FlowBytes, amount: f64) -> FlowBytes {
    let total: f64 = backlog.values().sum();
    if total <= 0.0 || amount <= 0.0 {
        return FlowBytes::new();
    }
    let amount = amount.min(total);
    backlog
        .iter()
        .map(|(flow, queued)| (flow.clone(), amount * queued / total))
        .collect()
}
