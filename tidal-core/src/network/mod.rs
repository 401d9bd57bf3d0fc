//! Network model: links, adjacency, topology templates and routing.
//!
//! A simulation request builds a [`Topology`] from a named template, hands it
//! to the [`PathRouter`] to assign every [`FlowSpec`] a sequence of
//! [`LinkKey`]s, and passes both to the multi-flow simulator.

mod flow;
mod graph;
mod ids;
mod link;
pub mod routing;
pub mod topology;

pub use flow::FlowSpec;
pub use graph::Graph;
pub use ids::{FlowId, LinkKey, NodeId};
pub use link::{LinkOverride, LinkParams};
pub use routing::{LinkCost, PathRouter, RoutingTable, dijkstra, nodes_to_link_keys};
pub use topology::{Attachment, Topology, TopologyBuilder, TopologyKind};
