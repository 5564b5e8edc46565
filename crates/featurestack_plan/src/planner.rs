//! Cycle detection and topological planning.
//!
//! Kahn's algorithm over the dependency graph with a min-heap frontier keyed
//! by handle: whenever several nodes are ready, the one registered first is
//! taken. The order is therefore a pure function of the input.

use crate::dag::Graph;
use featurestack_core::{DeclaredId, DefinitionError, Handle};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

/// Topological planner
#[derive(Debug, Clone, Copy, Default)]
pub struct Planner;

impl Planner {
    /// Create a new planner
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Order every node so each edge `a -> b` has `a` before `b`
    ///
    /// # Errors
    ///
    /// Returns `CyclicDependency` naming the shortest cycle if the graph is not acyclic
    pub fn plan(&self, graph: &Graph) -> Result<Vec<Handle>, DefinitionError> {
        let count = graph.node_count();
        let mut in_degree: Vec<usize> = graph
            .nodes()
            .iter()
            .map(|n| graph.dependencies(n.handle).len())
            .collect();

        let mut ready: BinaryHeap<Reverse<Handle>> = graph
            .nodes()
            .iter()
            .map(|n| n.handle)
            .filter(|h| in_degree[h.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(next)) = ready.pop() {
            order.push(next);
            for &dependent in graph.dependents(next) {
                let degree = &mut in_degree[dependent.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() == count {
            tracing::debug!(nodes = count, "plan ordered");
            return Ok(order);
        }

        let stuck: Vec<bool> = in_degree.iter().map(|d| *d > 0).collect();
        let cycle = shortest_cycle(graph, &stuck)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|h| graph.node(h).map(|n| n.id.clone()))
            .collect::<Vec<DeclaredId>>();

        Err(DefinitionError::CyclicDependency { cycle })
    }
}

/// Shortest cycle among the nodes Kahn's algorithm could not order.
///
/// Runs a BFS from each stuck node, in handle order, back to itself. Ties
/// keep the cycle whose start was registered first. The returned walk starts
/// at that node and follows edge direction.
fn shortest_cycle(graph: &Graph, stuck: &[bool]) -> Option<Vec<Handle>> {
    let mut best: Option<Vec<Handle>> = None;

    for start in graph.nodes().iter().map(|n| n.handle).filter(|h| stuck[h.index()]) {
        let limit = best.as_ref().map_or(usize::MAX, Vec::len);
        if let Some(cycle) = cycle_through(graph, stuck, start, limit) {
            let done = cycle.len() == 1;
            best = Some(cycle);
            if done {
                break;
            }
        }
    }

    best
}

/// Shortest closed walk through `start`, if shorter than `limit`
fn cycle_through(graph: &Graph, stuck: &[bool], start: Handle, limit: usize) -> Option<Vec<Handle>> {
    let mut parent: Vec<Option<Handle>> = vec![None; stuck.len()];
    let mut depth: Vec<usize> = vec![0; stuck.len()];
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        if depth[current.index()] + 1 >= limit {
            return None;
        }
        for &next in graph.dependents(current) {
            if !stuck[next.index()] {
                continue;
            }
            if next == start {
                let mut walk = vec![current];
                let mut cursor = current;
                while cursor != start {
                    cursor = parent[cursor.index()]?;
                    walk.push(cursor);
                }
                walk.reverse();
                return Some(walk);
            }
            if parent[next.index()].is_none() && next != start {
                parent[next.index()] = Some(current);
                depth[next.index()] = depth[current.index()] + 1;
                queue.push_back(next);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::tests::{feature_over, source, view};
    use crate::node::ResolvedNode;
    use proptest::prelude::*;

    fn ids(graph: &Graph, order: &[Handle]) -> Vec<String> {
        order
            .iter()
            .map(|h| graph.node(*h).map(|n| n.id.to_string()).unwrap_or_default())
            .collect()
    }

    fn position(order: &[Handle]) -> Vec<usize> {
        let mut pos = vec![0; order.len()];
        for (i, h) in order.iter().enumerate() {
            pos[h.index()] = i;
        }
        pos
    }

    #[test]
    fn test_plan_linear_chain() {
        let graph = Graph::build(vec![
            source(0, "s"),
            view(1, "t1", &[]),
            view(2, "t2", &[1]),
            feature_over(3, "f1", &[]),
            feature_over(4, "f2", &[3]),
        ])
        .unwrap();

        let order = Planner::new().plan(&graph).unwrap();
        assert_eq!(ids(&graph, &order), vec!["s", "t1", "t2", "f1", "f2"]);
    }

    #[test]
    fn test_plan_ties_follow_registration_order() {
        // c was registered before b, both become ready once a is done
        let graph = Graph::build(vec![
            view(0, "a", &[]),
            view(1, "c", &[0]),
            view(2, "b", &[0]),
            view(3, "late_root", &[]),
        ])
        .unwrap();

        let order = Planner::new().plan(&graph).unwrap();
        assert_eq!(ids(&graph, &order), vec!["a", "c", "b", "late_root"]);
    }

    #[test]
    fn test_plan_dependency_registered_after_dependent() {
        let graph = Graph::build(vec![view(0, "t2", &[1]), view(1, "t1", &[])]).unwrap();
        let order = Planner::new().plan(&graph).unwrap();
        assert_eq!(ids(&graph, &order), vec!["t1", "t2"]);
    }

    #[test]
    fn test_two_node_cycle() {
        let graph = Graph::build(vec![
            source(0, "s"),
            view(1, "t1", &[2]),
            view(2, "t2", &[1]),
            view(3, "t3", &[2]),
        ])
        .unwrap();

        let err = Planner::new().plan(&graph).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::CyclicDependency {
                cycle: vec![DeclaredId::from("t1"), DeclaredId::from("t2")],
            }
        );
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let graph = Graph::build(vec![view(0, "t0", &[]), view(1, "t1", &[1])]).unwrap();
        let err = Planner::new().plan(&graph).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::CyclicDependency {
                cycle: vec![DeclaredId::from("t1")],
            }
        );
    }

    #[test]
    fn test_reports_shortest_cycle() {
        // long loop a -> b -> c -> d -> a, short loop c -> d -> c
        let graph = Graph::build(vec![
            view(0, "a", &[3]),
            view(1, "b", &[0]),
            view(2, "c", &[1, 3]),
            view(3, "d", &[2]),
        ])
        .unwrap();

        let err = Planner::new().plan(&graph).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::CyclicDependency {
                cycle: vec![DeclaredId::from("c"), DeclaredId::from("d")],
            }
        );
    }

    #[test]
    fn test_empty_plan() {
        let graph = Graph::build(Vec::new()).unwrap();
        assert!(Planner::new().plan(&graph).unwrap().is_empty());
    }

    /// Random DAG: node i may depend only on lower indices
    fn arb_dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
        (1usize..24).prop_flat_map(|n| {
            (0..n)
                .map(|i| proptest::collection::vec(0..i.max(1), 0..=i.min(4)))
                .collect::<Vec<_>>()
                .prop_map(|deps: Vec<Vec<usize>>| -> Vec<Vec<usize>> {
                    deps.into_iter()
                        .enumerate()
                        .map(|(i, d)| d.into_iter().filter(|x| *x < i).collect::<Vec<usize>>())
                        .collect()
                })
        })
    }

    /// Registers nodes in a shuffled order so edges run both ways in handle space
    fn build_permuted(deps: &[Vec<usize>], rotate: usize) -> Graph {
        let n = deps.len();
        let handle_of = |i: usize| (i + rotate) % n;
        let nodes: Vec<ResolvedNode> = deps
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let mapped: Vec<usize> = d.iter().map(|x| handle_of(*x)).collect();
                view(handle_of(i), &format!("n{}", i), &mapped)
            })
            .collect();
        Graph::build(nodes).unwrap()
    }

    proptest! {
        #[test]
        fn prop_order_respects_every_edge(deps in arb_dag(), rotate in 0usize..24) {
            let graph = build_permuted(&deps, rotate);
            let order = Planner::new().plan(&graph).unwrap();

            prop_assert_eq!(order.len(), graph.node_count());
            let pos = position(&order);
            let mut seen = order.clone();
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), order.len());
            for edge in graph.edges() {
                prop_assert!(pos[edge.from.index()] < pos[edge.to.index()]);
            }
        }

        #[test]
        fn prop_plan_is_deterministic(deps in arb_dag(), rotate in 0usize..24) {
            let first = Planner::new().plan(&build_permuted(&deps, rotate)).unwrap();
            let second = Planner::new().plan(&build_permuted(&deps, rotate)).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_cycle_is_closed_walk(deps in arb_dag(), back in 0usize..24) {
            // close a loop between the last node and an earlier one
            let mut deps = deps;
            let n = deps.len();
            let target = back % n;
            deps[target].push(n - 1);
            if target != n - 1 {
                deps[n - 1].push(target);
            }
            let graph = build_permuted(&deps, 0);

            let err = Planner::new().plan(&graph).unwrap_err();
            let DefinitionError::CyclicDependency { cycle } = err else {
                return Err(TestCaseError::fail("expected a cycle"));
            };
            prop_assert!(!cycle.is_empty());

            let handles: Vec<Handle> = cycle
                .iter()
                .map(|id| graph.nodes().iter().find(|n| &n.id == id).map(|n| n.handle).unwrap())
                .collect();
            for (i, from) in handles.iter().enumerate() {
                let to = handles[(i + 1) % handles.len()];
                prop_assert!(graph.dependents(*from).contains(&to));
            }
        }
    }
}
