use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Payload of a directed relationship edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipEdge {
    pub relationship_type: String,
    /// source column -> target column
    pub keys: IndexMap<String, String>,
    pub description: String,
}

/// Directed, possibly cyclic table relationship graph.
///
/// Adjacency is keyed by table name; neighbours keep insertion order so
/// traversal is deterministic for a given load order.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    adjacency: IndexMap<String, IndexMap<String, RelationshipEdge>>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, table: &str) {
        self.adjacency.entry(table.to_string()).or_default();
    }

    /// Add or replace the edge `from -> to`, returning the replaced payload.
    pub fn add_edge(&mut self, from: &str, to: &str, edge: RelationshipEdge) -> Option<RelationshipEdge> {
        self.add_node(to);
        self.adjacency
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string(), edge)
    }

    pub fn contains_node(&self, table: &str) -> bool {
        self.adjacency.contains_key(table)
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edge(from, to).is_some()
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&RelationshipEdge> {
        self.adjacency.get(from).and_then(|targets| targets.get(to))
    }

    pub fn neighbors(&self, from: &str) -> impl Iterator<Item = &str> {
        self.adjacency
            .get(from)
            .into_iter()
            .flat_map(|targets| targets.keys().map(String::as_str))
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(IndexMap::len).sum()
    }

    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &RelationshipEdge)> {
        self.adjacency.iter().flat_map(|(from, targets)| {
            targets
                .iter()
                .map(move |(to, edge)| (from.as_str(), to.as_str(), edge))
        })
    }

    /// Shortest path by edge count (BFS). The path includes both endpoints;
    /// `None` when either table is unknown or `target` is unreachable.
    pub fn shortest_path(&self, source: &str, target: &str) -> Option<Vec<String>> {
        if !self.contains_node(source) || !self.contains_node(target) {
            return None;
        }
        if source == target {
            return Some(vec![source.to_string()]);
        }

        let mut predecessor: HashMap<&str, &str> = HashMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(source);
        predecessor.insert(source, source);

        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(current) {
                if predecessor.contains_key(next) {
                    continue;
                }
                predecessor.insert(next, current);

                if next == target {
                    let mut path = vec![target.to_string()];
                    let mut node = target;
                    while node != source {
                        node = predecessor[node];
                        path.push(node.to_string());
                    }
                    path.reverse();
                    return Some(path);
                }

                queue.push_back(next);
            }
        }

        None
    }
}
