//! Flow descriptions as they arrive in a simulation request.

use serde::{Deserialize, Serialize};

use super::ids::{FlowId, NodeId};
use crate::congestion::Algorithm;

/// One sender-to-receiver transfer driven by a congestion controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSpec {
    /// Identifier; defaults to `{src}-{dst}` when absent
    #[serde(default)]
    pub id: Option<FlowId>,
    /// Sending node
    pub src: NodeId,
    /// Receiving node
    pub dst: NodeId,
    /// Congestion control algorithm
    #[serde(default)]
    pub algorithm: Algorithm,
}

impl FlowSpec {
    /// Creates flow with an explicit id.
    pub fn new(
        id: impl Into<FlowId>,
        src: impl Into<NodeId>,
        dst: impl Into<NodeId>,
        algorithm: Algorithm,
    ) -> Self {
        Self {
            id: Some(id.into()),
            src: src.into(),
            dst: dst.into(),
            algorithm,
        }
    }

    /// Returns the explicit id or the `{src}-{dst}` fallback.
    pub fn flow_id(&self) -> FlowId {
        self.id
            .clone()
            .unwrap_or_else(|| FlowId::new(format!("{}-{}", self.src, self.dst)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_id_fallback() {
        let flow: FlowSpec = serde_json::from_str(r#"{"src": "S1", "dst": "D1"}"#).unwrap();
        assert_eq!(flow.flow_id().as_str(), "S1-D1");
        assert_eq!(flow.algorithm, Algorithm::Reno);

        let named = FlowSpec::new("f1", "S1", "D1", Algorithm::Cubic);
        assert_eq!(named.flow_id().as_str(), "f1");
    }
}
