//! Dependency graph over resolved nodes.
//!
//! An edge `from -> to` means `from` must be emitted before `to`. Nodes are
//! stored densely by handle, so neighbour lists iterate in a fixed order.

use crate::node::ResolvedNode;
use featurestack_core::{DefinitionError, Handle};
use indexmap::IndexSet;

/// A directed graph of resolved definitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    /// Nodes indexed by handle
    nodes: Vec<ResolvedNode>,
    /// All edges, in discovery order
    edges: Vec<Edge>,
    /// Upstream nodes of each node
    dependencies: Vec<IndexSet<Handle>>,
    /// Downstream nodes of each node
    dependents: Vec<IndexSet<Handle>>,
}

/// An edge between nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Upstream node
    pub from: Handle,
    /// Dependent node
    pub to: Handle,
    /// Field of `to` that produced the edge
    pub field: String,
}

impl Edge {
    /// Create a new edge
    #[must_use]
    pub fn new(from: Handle, to: Handle, field: impl Into<String>) -> Self {
        Self {
            from,
            to,
            field: field.into(),
        }
    }
}

impl Graph {
    /// Build the graph from every resolved node of a build.
    ///
    /// `nodes` must hold exactly one node per registry handle. Repeated
    /// references (e.g. a feature listed twice in a set) produce one edge.
    ///
    /// # Errors
    ///
    /// Returns every edge whose dependent kind cannot depend on the upstream kind
    pub fn build(mut nodes: Vec<ResolvedNode>) -> Result<Self, Vec<DefinitionError>> {
        nodes.sort_by_key(|n| n.handle);
        debug_assert!(nodes.iter().enumerate().all(|(i, n)| n.handle.index() == i));

        let count = nodes.len();
        let mut graph = Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            dependencies: vec![IndexSet::new(); count],
            dependents: vec![IndexSet::new(); count],
        };
        let mut errors = Vec::new();

        for node in &nodes {
            for reference in node.references() {
                let Some(upstream) = nodes.get(reference.target.index()) else {
                    errors.push(DefinitionError::InvalidDefinition {
                        node: node.id.clone(),
                        field: reference.field,
                        reason: format!("reference {} is outside this build", reference.target),
                    });
                    continue;
                };

                if !node.kind().may_depend_on(upstream.kind()) {
                    errors.push(DefinitionError::IllegalEdge {
                        from: upstream.id.clone(),
                        from_kind: upstream.kind(),
                        to: node.id.clone(),
                        to_kind: node.kind(),
                    });
                    continue;
                }

                graph.add_edge(Edge::new(reference.target, node.handle, reference.field));
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        graph.nodes = nodes;
        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "dependency graph built"
        );
        Ok(graph)
    }

    /// Add an edge, ignoring repeats
    fn add_edge(&mut self, edge: Edge) {
        if self.dependencies[edge.to.index()].insert(edge.from) {
            self.dependents[edge.from.index()].insert(edge.to);
            self.edges.push(edge);
        }
    }

    /// Get node by handle
    #[must_use]
    pub fn node(&self, handle: Handle) -> Option<&ResolvedNode> {
        self.nodes.get(handle.index())
    }

    /// Nodes in registration order
    #[must_use]
    pub fn nodes(&self) -> &[ResolvedNode] {
        &self.nodes
    }

    /// All edges
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Nodes the given node depends on
    #[must_use]
    pub fn dependencies(&self, handle: Handle) -> &IndexSet<Handle> {
        &self.dependencies[handle.index()]
    }

    /// Nodes that depend on the given node
    #[must_use]
    pub fn dependents(&self, handle: Handle) -> &IndexSet<Handle> {
        &self.dependents[handle.index()]
    }

    /// Every node reachable downstream of the given node, excluding itself
    /// unless it sits on a cycle
    #[must_use]
    pub fn descendants(&self, handle: Handle) -> IndexSet<Handle> {
        let mut seen = IndexSet::new();
        let mut stack: Vec<Handle> = self.dependents(handle).iter().copied().collect();

        while let Some(current) = stack.pop() {
            if seen.insert(current) {
                stack.extend(self.dependents(current).iter().copied());
            }
        }

        seen
    }

    /// Get total node count
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get total edge count
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Check if the graph is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::node::{FeatureLineage, NodePayload, ResolvedFeature, ResolvedTable, TableLineage};
    use featurestack_core::{DeclaredId, ResourceKind};

    pub(crate) fn source(i: usize, id: &str) -> ResolvedNode {
        ResolvedNode {
            handle: Handle::from_index(i),
            id: DeclaredId::from(id),
            payload: NodePayload::Source { name: id.to_string() },
        }
    }

    pub(crate) fn view(i: usize, id: &str, sources: &[usize]) -> ResolvedNode {
        ResolvedNode {
            handle: Handle::from_index(i),
            id: DeclaredId::from(id),
            payload: NodePayload::Table(ResolvedTable {
                name: id.to_string(),
                description: String::new(),
                lineage: TableLineage::Derived {
                    sources: sources.iter().map(|s| Handle::from_index(*s)).collect(),
                    expression: "SELECT 1".to_string(),
                },
                event: None,
            }),
        }
    }

    pub(crate) fn feature_over(i: usize, id: &str, over: &[usize]) -> ResolvedNode {
        ResolvedNode {
            handle: Handle::from_index(i),
            id: DeclaredId::from(id),
            payload: NodePayload::Feature(ResolvedFeature {
                name: id.to_string(),
                description: String::new(),
                aggregation: None,
                select: "x".to_string(),
                post_aggregation: None,
                days: None,
                lineage: FeatureLineage::Over(over.iter().map(|s| Handle::from_index(*s)).collect()),
                entity: None,
            }),
        }
    }

    #[test]
    fn test_build_edges() {
        let graph = Graph::build(vec![
            source(0, "s"),
            view(1, "t1", &[]),
            view(2, "t2", &[1]),
            view(3, "t3", &[1, 2]),
        ])
        .unwrap();

        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
        let deps: Vec<usize> = graph.dependencies(Handle::from_index(3)).iter().map(Handle::index).collect();
        assert_eq!(deps, vec![1, 2]);
        let downstream: Vec<usize> = graph.dependents(Handle::from_index(1)).iter().map(Handle::index).collect();
        assert_eq!(downstream, vec![2, 3]);
    }

    #[test]
    fn test_build_sorts_by_handle() {
        let graph = Graph::build(vec![view(1, "t2", &[0]), view(0, "t1", &[])]).unwrap();
        assert_eq!(graph.nodes()[0].id.as_str(), "t1");
        assert_eq!(graph.node(Handle::from_index(1)).map(|n| n.id.as_str()), Some("t2"));
    }

    #[test]
    fn test_repeated_reference_single_edge() {
        let graph = Graph::build(vec![
            feature_over(0, "f1", &[]),
            feature_over(1, "f2", &[0, 0]),
        ])
        .unwrap();
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_rejects_illegal_edge() {
        // a derived table pointing at a feature
        let errors = Graph::build(vec![feature_over(0, "f1", &[]), view(1, "t1", &[0])]).unwrap_err();

        assert_eq!(
            errors,
            vec![DefinitionError::IllegalEdge {
                from: DeclaredId::from("f1"),
                from_kind: ResourceKind::Feature,
                to: DeclaredId::from("t1"),
                to_kind: ResourceKind::Table,
            }]
        );
    }

    #[test]
    fn test_descendants() {
        let graph = Graph::build(vec![
            view(0, "a", &[]),
            view(1, "b", &[0]),
            view(2, "c", &[1]),
            view(3, "d", &[]),
        ])
        .unwrap();

        let below: Vec<usize> = graph.descendants(Handle::from_index(0)).iter().map(Handle::index).collect();
        assert_eq!(below.len(), 2);
        assert!(below.contains(&1) && below.contains(&2));
        assert!(graph.descendants(Handle::from_index(3)).is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let graph = Graph::build(Vec::new()).unwrap();
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
    }
}
