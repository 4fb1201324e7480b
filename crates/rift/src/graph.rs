//! Directed adjacency over relay destinations.
//!
//! An edge `a -> b` means messages seen at `a` are relayed to `b`. Two-way
//! wiring is two edges added together. Unknown vertices are never an error;
//! they simply have no neighbors.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct Graph<V: Ord + Clone> {
    adjacency: BTreeMap<V, BTreeSet<V>>,
}

impl<V: Ord + Clone> Default for Graph<V> {
    fn default() -> Self {
        Self {
            adjacency: BTreeMap::new(),
        }
    }
}

impl<V: Ord + Clone> Graph<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `source -> target` for every target, and the reverse edges when
    /// `two_way`. A target equal to `source` is discarded.
    pub fn add_edges<'a, I>(&mut self, source: &V, targets: I, two_way: bool)
    where
        I: IntoIterator<Item = &'a V>,
        V: 'a,
    {
        for target in targets {
            if target == source {
                continue;
            }
            self.adjacency
                .entry(source.clone())
                .or_default()
                .insert(target.clone());
            if two_way {
                self.adjacency
                    .entry(target.clone())
                    .or_default()
                    .insert(source.clone());
            }
        }
    }

    /// Full mesh: every given vertex gets an edge to every other one.
    pub fn link_all(&mut self, vertices: &[V]) {
        for vertex in vertices {
            self.add_edges(vertex, vertices, false);
        }
    }

    /// Drop each vertex as a key and from every neighbor set. Vertices left
    /// without any edge disappear.
    pub fn unlink_all<'a, I>(&mut self, vertices: I)
    where
        I: IntoIterator<Item = &'a V>,
        V: 'a,
    {
        let removed: BTreeSet<&V> = vertices.into_iter().collect();
        if removed.is_empty() {
            return;
        }
        self.adjacency.retain(|vertex, _| !removed.contains(vertex));
        for neighbors in self.adjacency.values_mut() {
            neighbors.retain(|n| !removed.contains(n));
        }
        self.adjacency.retain(|_, neighbors| !neighbors.is_empty());
    }

    /// Receivers of `vertex`, empty when unknown.
    pub fn neighbors_of(&self, vertex: &V) -> BTreeSet<V> {
        self.adjacency.get(vertex).cloned().unwrap_or_default()
    }

    pub fn has_edge(&self, from: &V, to: &V) -> bool {
        self.adjacency.get(from).is_some_and(|n| n.contains(to))
    }

    /// Whether `vertex` takes part in any edge, as sender or receiver.
    pub fn contains(&self, vertex: &V) -> bool {
        self.adjacency.contains_key(vertex)
            || self.adjacency.values().any(|n| n.contains(vertex))
    }

    /// Every vertex taking part in an edge.
    pub fn vertices(&self) -> BTreeSet<V> {
        let mut all: BTreeSet<V> = self.adjacency.keys().cloned().collect();
        for neighbors in self.adjacency.values() {
            all.extend(neighbors.iter().cloned());
        }
        all
    }

    /// Every edge as `(from, to)`.
    pub fn edges(&self) -> Vec<(V, V)> {
        self.adjacency
            .iter()
            .flat_map(|(from, to)| to.iter().map(move |t| (from.clone(), t.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn set(items: &[&'static str]) -> BTreeSet<&'static str> {
        items.iter().copied().collect()
    }

    #[test]
    fn link_all_builds_a_full_mesh_without_self_loops() {
        let mut graph = Graph::new();
        graph.link_all(&["a", "b", "c"]);
        assert_eq!(graph.neighbors_of(&"a"), set(&["b", "c"]));
        assert_eq!(graph.neighbors_of(&"b"), set(&["a", "c"]));
        assert_eq!(graph.neighbors_of(&"c"), set(&["a", "b"]));
        for v in ["a", "b", "c"] {
            assert!(!graph.has_edge(&v, &v));
        }
    }

    #[test]
    fn unlink_removes_vertex_everywhere() {
        let mut graph = Graph::new();
        graph.link_all(&["a", "b", "c"]);
        graph.unlink_all(&["b"]);
        assert_eq!(graph.neighbors_of(&"a"), set(&["c"]));
        assert!(graph.neighbors_of(&"b").is_empty());
        assert!(!graph.contains(&"b"));
    }

    #[test]
    fn unlinking_the_last_partner_empties_the_graph() {
        let mut graph = Graph::new();
        graph.add_edges(&"a", &["b"], true);
        graph.unlink_all(&["a"]);
        assert!(graph.is_empty());
        assert!(graph.vertices().is_empty());
    }

    #[rstest]
    #[case(true, true)]
    #[case(false, false)]
    fn add_edges_direction(#[case] two_way: bool, #[case] reverse: bool) {
        let mut graph = Graph::new();
        graph.add_edges(&"a", &["b", "a"], two_way);
        assert!(graph.has_edge(&"a", &"b"));
        assert_eq!(graph.has_edge(&"b", &"a"), reverse);
        assert!(!graph.has_edge(&"a", &"a"));
    }

    #[test]
    fn unknown_vertex_has_no_neighbors() {
        let mut graph: Graph<&str> = Graph::new();
        assert!(graph.neighbors_of(&"ghost").is_empty());
        graph.unlink_all(&["ghost"]);
        assert!(graph.is_empty());
    }

    #[test]
    fn edges_lists_each_direction() {
        let mut graph = Graph::new();
        graph.add_edges(&"a", &["b"], true);
        graph.add_edges(&"a", &["c"], false);
        assert_eq!(graph.edges(), vec![("a", "b"), ("a", "c"), ("b", "a")]);
        assert_eq!(graph.vertices(), set(&["a", "b", "c"]));
    }
}
