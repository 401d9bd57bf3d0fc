//! Shortest-path routing of flows over a topology.
//!
//! Links are weighted by [`LinkCost`], paths are found with Dijkstra over the
//! node graph and converted to link keys. The parallel template gets a
//! load-balancing rule: flows sharing a (source, destination) pair are spread
//! round-robin across the paths through each parallel router.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

use tracing::{debug, info, warn};

use super::flow::FlowSpec;
use super::graph::Graph;
use super::ids::{FlowId, LinkKey, NodeId};
use super::link::LinkParams;
use super::topology::{Topology, TopologyKind};
use crate::config::RoutingConfig;

/// Assigned link path per flow; an empty path marks an unroutable flow.
pub type RoutingTable = BTreeMap<FlowId, Vec<LinkKey>>;

/// Smallest bandwidth the cost function divides by, in Mbps.
const MIN_COST_BANDWIDTH_MBPS: f64 = 0.001;

/// Scalar link weight trading propagation delay against bandwidth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkCost {
    alpha_delay: f64,
    beta_inv_bandwidth: f64,
}

impl Default for LinkCost {
    fn default() -> Self {
        Self::from(RoutingConfig::default())
    }
}

impl From<RoutingConfig> for LinkCost {
    fn from(config: RoutingConfig) -> Self {
        Self {
            alpha_delay: config.alpha_delay,
            beta_inv_bandwidth: config.beta_inv_bandwidth,
        }
    }
}

impl LinkCost {
    /// Creates cost function with explicit weights.
    pub fn new(alpha_delay: f64, beta_inv_bandwidth: f64) -> Self {
        Self {
            alpha_delay,
            beta_inv_bandwidth,
        }
    }

    /// Returns `alpha * delay_ms + beta / bandwidth_mbps`.
    pub fn cost(&self, link: &LinkParams) -> f64 {
        self.alpha_delay * link.delay
            + self.beta_inv_bandwidth * (1.0 / link.bandwidth.max(MIN_COST_BANDWIDTH_MBPS))
    }
}

/// Frontier entry of the shortest-path search.
struct Frontier {
    cost: f64,
    seq: u64,
    node: NodeId,
    path: Vec<NodeId>,
}

impl Eq for Frontier {}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Cheapest first, then earliest pushed; reversed for min-heap behavior
        match self.cost.total_cmp(&other.cost) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            other_order => other_order.reverse(),
        }
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Finds the cheapest node path from `start` to `goal`.
///
/// Equal-cost candidates are settled in push order; neighbors are pushed in
/// lexicographic order, so the result is reproducible for a given graph.
/// Returns `None` when `goal` is unreachable.
pub fn dijkstra(
    graph: &Graph,
    start: &NodeId,
    goal: &NodeId,
    link_cost: impl Fn(&LinkKey) -> f64,
) -> Option<Vec<NodeId>> {
    let mut frontier = BinaryHeap::new();
    let mut settled: HashMap<NodeId, f64> = HashMap::new();
    let mut seq = 0u64;

    frontier.push(Frontier {
        cost: 0.0,
        seq,
        node: start.clone(),
        path: Vec::new(),
    });

    while let Some(Frontier {
        cost,
        node,
        mut path,
        ..
    }) = frontier.pop()
    {
        if node == *goal {
            path.push(node);
            return Some(path);
        }
        if settled.get(&node).is_some_and(|best| *best <= cost) {
            continue;
        }
        settled.insert(node.clone(), cost);
        path.push(node.clone());

        for (neighbor, key) in graph.neighbors(&node) {
            seq += 1;
            frontier.push(Frontier {
                cost: cost + link_cost(key),
                seq,
                node: neighbor.clone(),
                path: path.clone(),
            });
        }
    }

    None
}

/// Converts a node path to the link keys joining consecutive nodes.
///
/// Each pair is looked up in both directions. Returns `None` when some pair
/// has no link; paths shorter than two nodes convert to an empty list.
pub fn nodes_to_link_keys(nodes: &[NodeId], graph: &Graph) -> Option<Vec<LinkKey>> {
    nodes
        .windows(2)
        .map(|pair| {
            graph
                .link_between(&pair[0], &pair[1])
                .or_else(|| graph.link_between(&pair[1], &pair[0]))
                .cloned()
        })
        .collect()
}

/// Assigns every flow of a request a path through the topology.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathRouter {
    cost: LinkCost,
}

impl PathRouter {
    /// Creates router using `cost` to weight links.
    pub fn new(cost: LinkCost) -> Self {
        Self { cost }
    }

    /// Returns the cost function used by this router.
    pub fn link_cost(&self) -> LinkCost {
        self.cost
    }

    /// Returns the cost of a single link, or infinity if it does not exist.
    pub fn cost_of(&self, topology: &Topology, key: &LinkKey) -> f64 {
        topology
            .link(key)
            .map_or(f64::INFINITY, |link| self.cost.cost(link))
    }

    /// Returns the summed cost of a link path.
    pub fn path_cost(&self, topology: &Topology, path: &[LinkKey]) -> f64 {
        path.iter().map(|key| self.cost_of(topology, key)).sum()
    }

    /// Returns the cheapest node path between two nodes.
    pub fn node_path(
        &self,
        topology: &Topology,
        src: &NodeId,
        dst: &NodeId,
    ) -> Option<Vec<NodeId>> {
        dijkstra(&topology.graph, src, dst, |key| self.cost_of(topology, key))
    }

    /// Returns the cheapest link path between two nodes.
    pub fn shortest_path(
        &self,
        topology: &Topology,
        src: &NodeId,
        dst: &NodeId,
    ) -> Option<Vec<LinkKey>> {
        let nodes = self.node_path(topology, src, dst)?;
        nodes_to_link_keys(&nodes, &topology.graph)
    }

    /// Returns the cheapest link path from `src` to `dst` forced through `via`.
    ///
    /// Returns `None` when the joined path would visit a node twice, which
    /// happens when `dst` lies on the way to `via` or `src` on the way back.
    pub fn path_via(
        &self,
        topology: &Topology,
        src: &NodeId,
        via: &NodeId,
        dst: &NodeId,
    ) -> Option<Vec<LinkKey>> {
        let mut nodes = self.node_path(topology, src, via)?;
        let tail = self.node_path(topology, via, dst)?;
        nodes.extend(tail.into_iter().skip(1));

        let mut visited = BTreeSet::new();
        if !nodes.iter().all(|node| visited.insert(node)) {
            debug!("Path {}->{} via {} revisits a node: {:?}", src, dst, via, nodes);
            return None;
        }
        nodes_to_link_keys(&nodes, &topology.graph).filter(|links| !links.is_empty())
    }

    /// Routes every flow; unroutable flows get an empty path.
    pub fn route(&self, topology: &Topology, flows: &[FlowSpec]) -> RoutingTable {
        if topology.kind == TopologyKind::Parallel && !flows.is_empty() {
            info!("Routing {} flows with parallel round-robin", flows.len());
            self.route_round_robin(topology, flows)
        } else {
            info!(
                "Routing {} flows with shortest paths over '{}'",
                flows.len(),
                topology.kind
            );
            flows
                .iter()
                .map(|flow| (flow.flow_id(), self.route_shortest(topology, flow)))
                .collect()
        }
    }

    fn route_shortest(&self, topology: &Topology, flow: &FlowSpec) -> Vec<LinkKey> {
        match self.shortest_path(topology, &flow.src, &flow.dst) {
            Some(path) => {
                debug!(flow = %flow.flow_id(), ?path, "Assigned shortest path");
                path
            }
            None => {
                warn!(
                    "No path found for flow {} from {} to {}",
                    flow.flow_id(),
                    flow.src,
                    flow.dst
                );
                Vec::new()
            }
        }
    }

    /// Discovers one path per parallel router for each (src, dst) pair and
    /// hands them out to the pair's flows in turn.
    fn route_round_robin(&self, topology: &Topology, flows: &[FlowSpec]) -> RoutingTable {
        let mut pair_paths: HashMap<(NodeId, NodeId), Vec<Vec<LinkKey>>> = HashMap::new();
        for flow in flows {
            let pair = (flow.src.clone(), flow.dst.clone());
            if pair_paths.contains_key(&pair) {
                continue;
            }

            let mut candidates: Vec<Vec<LinkKey>> = Vec::new();
            for router in &topology.routers {
                if let Some(path) = self.path_via(topology, &flow.src, router, &flow.dst) {
                    if !candidates.contains(&path) {
                        debug!("Found path {}->{} via {}: {:?}", flow.src, flow.dst, router, path);
                        candidates.push(path);
                    }
                }
            }
            pair_paths.insert(pair, candidates);
        }

        let mut next_index: HashMap<(NodeId, NodeId), usize> = HashMap::new();
        let mut table = RoutingTable::new();
        for flow in flows {
            let pair = (flow.src.clone(), flow.dst.clone());
            let candidates = pair_paths.get(&pair).map(Vec::as_slice).unwrap_or_default();

            let path = if candidates.is_empty() {
                warn!(
                    "No parallel paths for {}->{}, falling back to shortest path for flow {}",
                    flow.src,
                    flow.dst,
                    flow.flow_id()
                );
                self.route_shortest(topology, flow)
            } else {
                let index = next_index.entry(pair).or_insert(0);
                let chosen = candidates[*index % candidates.len()].clone();
                *index += 1;
                debug!(flow = %flow.flow_id(), path = ?chosen, "Assigned round-robin path");
                chosen
            };

            table.insert(flow.flow_id(), path);
        }

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion::Algorithm;
    use crate::network::topology::{Attachment, TopologyBuilder};

    fn keys(path: &[LinkKey]) -> Vec<&str> {
        path.iter().map(LinkKey::as_str).collect()
    }

    #[test]
    fn test_cost_function_example() {
        let link = LinkParams::new(5.0, 15.0, 20, 1500);
        assert_eq!(LinkCost::default().cost(&link), 25.0);
    }

    #[test]
    fn test_cost_guards_tiny_bandwidth() {
        let link = LinkParams::new(0.0, 0.0, 20, 1500);
        let cost = LinkCost::new(1.0, 1.0).cost(&link);
        assert!(cost.is_finite());
        assert_eq!(cost, 1000.0);
    }

    #[test]
    fn test_single_topology_path() {
        let topology = TopologyBuilder::new("single")
            .sender(Attachment::new("S", "R"))
            .receiver(Attachment::new("D", "R"))
            .build();
        let router = PathRouter::default();

        let nodes = router
            .node_path(&topology, &NodeId::from("S"), &NodeId::from("D"))
            .unwrap();
        let names: Vec<&str> = nodes.iter().map(NodeId::as_str).collect();
        assert_eq!(names, vec!["S", "R", "D"]);

        let path = nodes_to_link_keys(&nodes, &topology.graph).unwrap();
        assert_eq!(keys(&path), vec!["S-R", "R-D"]);

        let expected: f64 = path.iter().map(|k| router.cost_of(&topology, k)).sum();
        assert_eq!(router.path_cost(&topology, &path), expected);
        assert_eq!(router.path_cost(&topology, &path), 50.0);
    }

    #[test]
    fn test_dijkstra_prefers_cheaper_route() {
        // Triangle: direct R1-R3 link is slow, detour through R2 is cheaper
        let topology = TopologyBuilder::new("triangle")
            .link_override(
                "R3-R1",
                crate::network::LinkOverride {
                    bandwidth: Some(0.5),
                    ..Default::default()
                },
            )
            .build();
        let router = PathRouter::default();
        let path = router
            .shortest_path(&topology, &NodeId::from("R1"), &NodeId::from("R3"))
            .unwrap();
        assert_eq!(keys(&path), vec!["R1-R2", "R2-R3"]);
    }

    #[test]
    fn test_start_equals_goal() {
        let topology = TopologyBuilder::new("series").build();
        let r1 = NodeId::from("R1");
        let nodes = PathRouter::default().node_path(&topology, &r1, &r1).unwrap();
        assert_eq!(nodes, vec![r1.clone()]);
        assert_eq!(nodes_to_link_keys(&nodes, &topology.graph), Some(Vec::new()));
    }

    #[test]
    fn test_unreachable_pair_has_no_path() {
        let topology = TopologyBuilder::new("parallel")
            .sender(Attachment::new("S", "R1"))
            .receiver(Attachment::new("D", "R9"))
            .build();
        let router = PathRouter::default();
        assert!(router
            .shortest_path(&topology, &NodeId::from("S"), &NodeId::from("D"))
            .is_none());

        let flows = vec![FlowSpec::new("f1", "S", "D", Algorithm::Reno)];
        let table = router.route(&topology, &flows);
        assert!(table[&FlowId::from("f1")].is_empty());
    }

    #[test]
    fn test_nodes_to_link_keys_missing_pair() {
        let topology = TopologyBuilder::new("series").build();
        let nodes = vec![NodeId::from("R1"), NodeId::from("R3")];
        assert!(nodes_to_link_keys(&nodes, &topology.graph).is_none());
    }

    #[test]
    fn test_parallel_round_robin_assignment() {
        let topology = TopologyBuilder::new("parallel")
            .senders([Attachment::new("S", "R1"), Attachment::new("S", "R2")])
            .receivers([Attachment::new("D", "R1"), Attachment::new("D", "R2")])
            .build();
        let flows: Vec<FlowSpec> = ["f1", "f2", "f3"]
            .iter()
            .map(|id| FlowSpec::new(*id, "S", "D", Algorithm::Reno))
            .collect();

        let table = PathRouter::default().route(&topology, &flows);

        assert_eq!(keys(&table[&FlowId::from("f1")]), vec!["S-R1", "R1-D"]);
        assert_eq!(keys(&table[&FlowId::from("f2")]), vec!["S-R2", "R2-D"]);
        assert_eq!(keys(&table[&FlowId::from("f3")]), vec!["S-R1", "R1-D"]);
    }

    #[test]
    fn test_parallel_single_discovered_path() {
        // Only R1 reaches the receiver, so every flow shares that path
        let topology = TopologyBuilder::new("parallel")
            .senders([Attachment::new("S", "R1"), Attachment::new("S", "R2")])
            .receiver(Attachment::new("D", "R1"))
            .build();
        let flows = vec![
            FlowSpec::new("a", "S", "D", Algorithm::Cubic),
            FlowSpec::new("b", "S", "D", Algorithm::Cubic),
        ];
        let table = PathRouter::default().route(&topology, &flows);
        assert_eq!(table[&FlowId::from("a")], table[&FlowId::from("b")]);
        assert_eq!(keys(&table[&FlowId::from("a")]), vec!["S-R1", "R1-D"]);
    }

    #[test]
    fn test_parallel_candidate_through_receiver_rejected() {
        // Reaching R2 from S means passing D first, so R2 offers no simple path
        let topology = TopologyBuilder::new("parallel")
            .sender(Attachment::new("S", "R1"))
            .receivers([Attachment::new("D", "R1"), Attachment::new("D", "R2")])
            .build();
        let router = PathRouter::default();
        let (s, r2, d) = (NodeId::from("S"), NodeId::from("R2"), NodeId::from("D"));
        assert!(router.path_via(&topology, &s, &r2, &d).is_none());

        let flows = vec![
            FlowSpec::new("a", "S", "D", Algorithm::Reno),
            FlowSpec::new("b", "S", "D", Algorithm::Reno),
        ];
        let table = router.route(&topology, &flows);
        for flow in ["a", "b"] {
            let path = &table[&FlowId::from(flow)];
            assert_eq!(keys(path), vec!["S-R1", "R1-D"]);
            let unique: BTreeSet<&LinkKey> = path.iter().collect();
            assert_eq!(unique.len(), path.len());
        }
    }
}
