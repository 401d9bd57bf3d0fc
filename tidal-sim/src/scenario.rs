//! Multi-flow request description.
//!
//! A [`Scenario`] names a topology template, default link parameters with
//! per-link overrides, endpoint attachments and flows. It deserializes from
//! the JSON body used by the multi-flow front end (camelCase keys).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tidal_core::network::{Attachment, LinkOverride, TopologyBuilder};
use tidal_core::{FlowSpec, LinkKey, LinkParams, Result, TidalConfig, Topology};
use tracing::info;

use crate::multi::{Timing, run_multi_flow};
use crate::trace::MultiFlowReport;

/// Default link parameters plus run timing, all optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioLinkParams {
    #[serde(flatten)]
    pub link: LinkOverride,
    /// Simulated seconds
    pub duration: Option<f64>,
    /// Integration step in seconds
    pub dt: Option<f64>,
}

/// One multi-flow simulation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Scenario {
    pub topology: String,
    pub link_params: ScenarioLinkParams,
    pub link_overrides: BTreeMap<LinkKey, LinkOverride>,
    pub flows: Vec<FlowSpec>,
    pub senders: Vec<Attachment>,
    pub receivers: Vec<Attachment>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            topology: "parallel".to_string(),
            link_params: ScenarioLinkParams::default(),
            link_overrides: BTreeMap::new(),
            flows: Vec::new(),
            senders: Vec::new(),
            receivers: Vec::new(),
        }
    }
}

impl Scenario {
    /// Parses a scenario from JSON.
    ///
    /// # Errors
    /// Returns the `serde_json` error for malformed input or unknown algorithms.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Parameters of links without an override.
    pub fn default_link(&self, config: &TidalConfig) -> LinkParams {
        self.link_params.link.apply(config.multi.default_link)
    }

    /// Duration and step, falling back to configured defaults.
    pub fn timing(&self, config: &TidalConfig) -> Timing {
        Timing::new(
            self.link_params
                .duration
                .unwrap_or(config.multi.default_duration_secs),
            self.link_params
                .dt
                .unwrap_or(config.multi.default_step_secs),
        )
    }

    /// Builds the topology with attachments and overrides applied.
    pub fn build_topology(&self, config: &TidalConfig) -> Topology {
        let builder = TopologyBuilder::new(self.topology.as_str())
            .default_link(self.default_link(config))
            .senders(self.senders.iter().cloned())
            .receivers(self.receivers.iter().cloned());

        self.link_overrides
            .iter()
            .fold(builder, |builder, (key, patch)| {
                builder.link_override(key.clone(), *patch)
            })
            .build()
    }

    /// Checks inputs that can be rejected before building anything.
    ///
    /// # Errors
    /// - `TidalError::InvalidParameter` - Bad default link or timing
    pub fn validate(&self, config: &TidalConfig) -> Result<()> {
        self.default_link(config).validate()?;
        self.timing(config).validate()
    }

    /// Validates, builds, routes and simulates the scenario.
    ///
    /// # Errors
    /// - `TidalError::InvalidParameter` - Bad link parameters or timing
    /// - `TidalError::DuplicateFlow` - Two flows share an id
    /// - `TidalError::Configuration` - Unusable configuration
    pub fn run(&self, config: &TidalConfig) -> Result<MultiFlowReport> {
        self.validate(config)?;
        let topology = self.build_topology(config);
        info!(
            topology = %topology.kind,
            links = topology.links.len(),
            flows = self.flows.len(),
            "Running scenario"
        );
        run_multi_flow(&topology, &self.flows, self.timing(config), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_core::{Algorithm, FlowId, TidalError};

    const BODY: &str = r#"{
        "topology": "parallel",
        "linkParams": {"bandwidth": 10, "delay": 5, "duration": 2, "dt": 0.05},
        "linkOverrides": {"R1-D": {"bandwidth": 4}},
        "flows": [
            {"id": "f1", "src": "S", "dst": "D", "algorithm": "Reno"},
            {"id": "f2", "src": "S", "dst": "D", "algorithm": "cubic"}
        ],
        "senders": [{"id": "S", "attach": "R1"}, {"id": "S", "attach": "R2"}],
        "receivers": [{"id": "D", "attach": "R1"}, {"id": "D", "attach": "R2"}]
    }"#;

    #[test]
    fn test_parse_request_body() {
        let scenario = Scenario::from_json(BODY).unwrap();
        assert_eq!(scenario.flows.len(), 2);
        assert_eq!(scenario.flows[1].algorithm, Algorithm::Cubic);

        let config = TidalConfig::default();
        let link = scenario.default_link(&config);
        assert_eq!(link.bandwidth, 10.0);
        assert_eq!(link.delay, 5.0);
        assert_eq!(link.buffer, 20);
        assert_eq!(scenario.timing(&config), Timing::new(2.0, 0.05));
    }

    #[test]
    fn test_empty_body_uses_defaults() {
        let scenario = Scenario::from_json("{}").unwrap();
        let config = TidalConfig::default();
        assert_eq!(scenario.topology, "parallel");
        assert_eq!(scenario.default_link(&config), LinkParams::default());
        assert_eq!(scenario.timing(&config), Timing::new(20.0, 0.05));
    }

    #[test]
    fn test_unknown_algorithm_rejected_at_parse() {
        let body = r#"{"flows": [{"src": "S", "dst": "D", "algorithm": "Vegas"}]}"#;
        assert!(Scenario::from_json(body).is_err());
    }

    #[test]
    fn test_override_applied() {
        let scenario = Scenario::from_json(BODY).unwrap();
        let topology = scenario.build_topology(&TidalConfig::default());
        let key = LinkKey::from("R1-D");
        assert_eq!(topology.link(&key).unwrap().bandwidth, 4.0);
        assert_eq!(topology.link(&LinkKey::from("R2-D")).unwrap().bandwidth, 10.0);
    }

    #[test]
    fn test_run_round_robins_parallel_paths() {
        let scenario = Scenario::from_json(BODY).unwrap();
        let report = scenario.run(&TidalConfig::default()).unwrap();

        let paths = &report.debug.paths;
        assert_eq!(
            paths[&FlowId::from("f1")],
            vec![LinkKey::from("S-R1"), LinkKey::from("R1-D")]
        );
        assert_eq!(
            paths[&FlowId::from("f2")],
            vec![LinkKey::from("S-R2"), LinkKey::from("R2-D")]
        );
        assert_eq!(report.traces.len(), 2);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_run_rejects_bad_timing() {
        let scenario = Scenario {
            link_params: ScenarioLinkParams {
                dt: Some(-0.1),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            scenario.run(&TidalConfig::default()),
            Err(TidalError::InvalidParameter { .. })
        ));
    }
}
