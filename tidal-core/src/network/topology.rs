//! Topology templates and the builder that attaches endpoints to them.
//!
//! A template only contains routers and the links between them. Senders and
//! receivers are attached to named routers afterwards; attachments that name a
//! router outside the template are reported and skipped, leaving the endpoint
//! disconnected rather than failing the request.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::graph::Graph;
use super::ids::{LinkKey, NodeId};
use super::link::{LinkOverride, LinkParams};

/// Catalog of router layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyKind {
    /// One router `R`
    Single,
    /// `R1 - R2`
    Series,
    /// `R1` and `R2` side by side without a link between them
    Parallel,
    /// `R1 - R2 - R3 - R1`
    Triangle,
    /// `R1` as hub for `R2` and `R3`
    Branched,
    /// Ring `R1 - R2 - R3 - R4 - R1`
    Four,
}

impl TopologyKind {
    /// Template used when a requested name is not recognized.
    pub const FALLBACK: TopologyKind = TopologyKind::Parallel;

    /// Parses a template name case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "single" => Some(TopologyKind::Single),
            "series" => Some(TopologyKind::Series),
            "parallel" => Some(TopologyKind::Parallel),
            "triangle" => Some(TopologyKind::Triangle),
            "branched" => Some(TopologyKind::Branched),
            "four" | "ring" => Some(TopologyKind::Four),
            _ => None,
        }
    }

    /// Router names that endpoints may attach to.
    pub fn routers(self) -> &'static [&'static str] {
        match self {
            TopologyKind::Single => &["R"],
            TopologyKind::Series | TopologyKind::Parallel => &["R1", "R2"],
            TopologyKind::Triangle | TopologyKind::Branched => &["R1", "R2", "R3"],
            TopologyKind::Four => &["R1", "R2", "R3", "R4"],
        }
    }

    /// Router-to-router links of the template.
    pub fn backbone(self) -> &'static [(&'static str, &'static str)] {
        match self {
            TopologyKind::Single | TopologyKind::Parallel => &[],
            TopologyKind::Series => &[("R1", "R2")],
            TopologyKind::Triangle => &[("R1", "R2"), ("R2", "R3"), ("R3", "R1")],
            TopologyKind::Branched => &[("R1", "R2"), ("R1", "R3")],
            TopologyKind::Four => &[("R1", "R2"), ("R2", "R3"), ("R3", "R4"), ("R4", "R1")],
        }
    }
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TopologyKind::Single => "single",
            TopologyKind::Series => "series",
            TopologyKind::Parallel => "parallel",
            TopologyKind::Triangle => "triangle",
            TopologyKind::Branched => "branched",
            TopologyKind::Four => "four",
        };
        f.write_str(name)
    }
}

/// Endpoint attached to a template router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Sender or receiver node
    pub id: NodeId,
    /// Router the endpoint connects to
    pub attach: NodeId,
}

impl Attachment {
    /// Creates attachment of `id` to router `attach`.
    pub fn new(id: impl Into<NodeId>, attach: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            attach: attach.into(),
        }
    }
}

/// Links and adjacency of one simulation request.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Template actually built
    pub kind: TopologyKind,
    /// Link parameters by key
    pub links: BTreeMap<LinkKey, LinkParams>,
    /// Undirected adjacency
    pub graph: Graph,
    /// Routers of the template
    pub routers: Vec<NodeId>,
    /// Non-fatal problems found while building
    pub warnings: Vec<String>,
}

impl Topology {
    /// Returns parameters of the link with `key`.
    pub fn link(&self, key: &LinkKey) -> Option<&LinkParams> {
        self.links.get(key)
    }

    fn add_link(&mut self, a: &NodeId, b: &NodeId, params: LinkParams) {
        let key = LinkKey::between(a, b);
        self.graph.add_link(a, b, key.clone());
        self.links.insert(key, params);
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }
}

/// Builder for a [`Topology`] from a template name and endpoint attachments.
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    name: String,
    default_link: LinkParams,
    senders: Vec<Attachment>,
    receivers: Vec<Attachment>,
    overrides: BTreeMap<LinkKey, LinkOverride>,
}

impl TopologyBuilder {
    /// Starts a builder for the template called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_link: LinkParams::default(),
            senders: Vec::new(),
            receivers: Vec::new(),
            overrides: BTreeMap::new(),
        }
    }

    /// Sets parameters used for every link without an override.
    pub fn default_link(mut self, params: LinkParams) -> Self {
        self.default_link = params;
        self
    }

    /// Attaches a sender; its link is keyed `{sender}-{router}`.
    pub fn sender(mut self, attachment: Attachment) -> Self {
        self.senders.push(attachment);
        self
    }

    /// Attaches a receiver; its link is keyed `{router}-{receiver}`.
    pub fn receiver(mut self, attachment: Attachment) -> Self {
        self.receivers.push(attachment);
        self
    }

    /// Attaches several senders.
    pub fn senders(mut self, attachments: impl IntoIterator<Item = Attachment>) -> Self {
        self.senders.extend(attachments);
        self
    }

    /// Attaches several receivers.
    pub fn receivers(mut self, attachments: impl IntoIterator<Item = Attachment>) -> Self {
        self.receivers.extend(attachments);
        self
    }

    /// Overrides parameters of the link with `key` once it exists.
    pub fn link_override(mut self, key: impl Into<LinkKey>, patch: LinkOverride) -> Self {
        self.overrides.insert(key.into(), patch);
        self
    }

    /// Builds links and adjacency.
    ///
    /// Unknown template names fall back to the parallel template; bad
    /// attachments and overrides for missing links are recorded as warnings.
    pub fn build(self) -> Topology {
        let mut warnings = Vec::new();
        let kind = match TopologyKind::parse(&self.name) {
            Some(kind) => kind,
            None => {
                let message = format!(
                    "Unknown topology '{}', falling back to '{}'",
                    self.name,
                    TopologyKind::FALLBACK
                );
                warn!("{message}");
                warnings.push(message);
                TopologyKind::FALLBACK
            }
        };

        let mut topology = Topology {
            kind,
            links: BTreeMap::new(),
            graph: Graph::new(),
            routers: kind.routers().iter().map(|r| NodeId::from(*r)).collect(),
            warnings,
        };

        for (a, b) in kind.backbone() {
            topology.add_link(&NodeId::from(*a), &NodeId::from(*b), self.default_link);
        }

        for sender in &self.senders {
            if topology.routers.contains(&sender.attach) {
                topology.add_link(&sender.id, &sender.attach, self.default_link);
            } else {
                topology.warn(format!(
                    "Sender {} attachment point {} not in router list {:?}",
                    sender.id,
                    sender.attach,
                    kind.routers()
                ));
            }
        }

        for receiver in &self.receivers {
            if topology.routers.contains(&receiver.attach) {
                topology.add_link(&receiver.attach, &receiver.id, self.default_link);
            } else {
                topology.warn(format!(
                    "Receiver {} attachment point {} not in router list {:?}",
                    receiver.id,
                    receiver.attach,
                    kind.routers()
                ));
            }
        }

        for (key, patch) in &self.overrides {
            match topology.links.get_mut(key) {
                Some(params) => {
                    *params = patch.apply(*params);
                    debug!(link = %key, ?params, "Applied link override");
                }
                None => topology.warn(format!("Override for unknown link {key} ignored")),
            }
        }

        debug!(
            topology = %topology.kind,
            links = topology.links.len(),
            nodes = topology.graph.node_count(),
            "Built topology"
        );

        topology
    }
}
