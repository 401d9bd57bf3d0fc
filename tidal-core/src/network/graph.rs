//! Undirected adjacency between topology nodes.

use std::collections::BTreeMap;

use super::ids::{LinkKey, NodeId};

/// Node adjacency: node → (neighbor → link key).
///
/// Every link is registered in both directions. Neighbors iterate in
/// lexicographic order, which keeps shortest-path tie-breaking reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    adjacency: BTreeMap<NodeId, BTreeMap<NodeId, LinkKey>>,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` between `a` and `b` in both directions.
    pub fn add_link(&mut self, a: &NodeId, b: &NodeId, key: LinkKey) {
        self.adjacency
            .entry(a.clone())
            .or_default()
            .insert(b.clone(), key.clone());
        self.adjacency
            .entry(b.clone())
            .or_default()
            .insert(a.clone(), key);
    }

    /// Returns neighbors of `node` with the connecting link keys.
    pub fn neighbors(&self, node: &NodeId) -> impl Iterator<Item = (&NodeId, &LinkKey)> {
        self.adjacency.get(node).into_iter().flat_map(|n| n.iter())
    }

    /// Returns the link registered from `a` to `b`, if any.
    pub fn link_between(&self, a: &NodeId, b: &NodeId) -> Option<&LinkKey> {
        self.adjacency.get(a).and_then(|n| n.get(b))
    }

    /// Returns true when `node` has at least one link.
    pub fn contains(&self, node: &NodeId) -> bool {
        self.adjacency.contains_key(node)
    }

    /// Returns every node that has at least one link, in sorted order.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.adjacency.keys().cloned().collect()
    }

    /// Returns number of nodes with at least one link.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_are_undirected() {
        let mut graph = Graph::new();
        let (a, b) = (NodeId::from("A"), NodeId::from("B"));
        graph.add_link(&a, &b, LinkKey::between(&a, &b));

        assert_eq!(graph.link_between(&a, &b).unwrap().as_str(), "A-B");
        assert_eq!(graph.link_between(&b, &a).unwrap().as_str(), "A-B");
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_neighbors_sorted() {
        let mut graph = Graph::new();
        let hub = NodeId::from("R1");
        for name in ["R3", "R2", "S"] {
            let other = NodeId::from(name);
            graph.add_link(&hub, &other, LinkKey::between(&hub, &other));
        }

        let neighbors: Vec<&str> = graph.neighbors(&hub).map(|(n, _)| n.as_str()).collect();
        assert_eq!(neighbors, vec!["R2", "R3", "S"]);
        assert_eq!(graph.neighbors(&NodeId::from("missing")).count(), 0);
    }
}
