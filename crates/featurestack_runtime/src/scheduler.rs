//! Deterministic emission scheduler.
//!
//! Ready nodes are kept in a `BTreeSet` keyed by plan position, so the next
//! node handed out is always the earliest one in the plan whose dependencies
//! have all been accepted. With one node in flight at a time this reproduces
//! the plan order exactly.

use featurestack_core::Handle;
use featurestack_plan::CompiledPlan;
use indexmap::IndexSet;
use std::collections::BTreeSet;

/// State of a single node during emission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Waiting on dependencies
    Pending,
    /// All dependencies accepted
    Ready,
    /// Handed to the backend
    InFlight,
    /// Accepted by the backend
    Completed,
    /// Rejected by the backend
    Failed,
    /// Never submitted because an upstream node failed
    Skipped {
        /// The failed upstream node
        failed_dependency: Handle,
    },
}

impl NodeState {
    /// Whether the node has reached a final state
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped { .. })
    }
}

/// Scheduling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Submit this node next
    Run(Handle),
    /// Wait for in-flight nodes
    Wait,
    /// Every node is terminal
    Complete,
}

/// Tracks which plan nodes may be submitted
pub struct Scheduler<'p> {
    plan: &'p CompiledPlan,
    /// Plan position of each handle
    position: Vec<usize>,
    /// Ready nodes by plan position
    ready: BTreeSet<usize>,
    /// Unaccepted dependencies per node
    waiting_on: Vec<usize>,
    states: Vec<NodeState>,
    terminal: usize,
}

impl<'p> Scheduler<'p> {
    /// Create a scheduler over a compiled plan
    #[must_use]
    pub fn new(plan: &'p CompiledPlan) -> Self {
        let graph = plan.graph();
        let count = graph.node_count();

        let mut position = vec![0; count];
        for (i, handle) in plan.order().iter().enumerate() {
            position[handle.index()] = i;
        }

        let waiting_on: Vec<usize> = (0..count)
            .map(|i| graph.dependencies(Handle::from_index(i)).len())
            .collect();

        let mut states = vec![NodeState::Pending; count];
        let mut ready = BTreeSet::new();
        for (i, waiting) in waiting_on.iter().enumerate() {
            if *waiting == 0 {
                states[i] = NodeState::Ready;
                ready.insert(position[i]);
            }
        }

        Self {
            plan,
            position,
            ready,
            waiting_on,
            states,
            terminal: 0,
        }
    }

    /// Next scheduling decision, without changing state
    #[must_use]
    pub fn decide(&self) -> ScheduleDecision {
        if let Some(pos) = self.ready.first() {
            ScheduleDecision::Run(self.plan.order()[*pos])
        } else if self.terminal < self.states.len() {
            ScheduleDecision::Wait
        } else {
            ScheduleDecision::Complete
        }
    }

    /// Take the earliest ready node and mark it in flight
    pub fn next_ready(&mut self) -> Option<Handle> {
        let pos = self.ready.pop_first()?;
        let handle = self.plan.order()[pos];
        self.states[handle.index()] = NodeState::InFlight;
        Some(handle)
    }

    /// Record that the backend accepted a node.
    ///
    /// Returns dependents that became ready.
    pub fn mark_complete(&mut self, handle: Handle) -> Vec<Handle> {
        if self.states[handle.index()] != NodeState::InFlight {
            return Vec::new();
        }
        self.states[handle.index()] = NodeState::Completed;
        self.terminal += 1;

        let mut unblocked = Vec::new();
        for &dependent in self.plan.graph().dependents(handle) {
            let i = dependent.index();
            self.waiting_on[i] = self.waiting_on[i].saturating_sub(1);
            if self.waiting_on[i] == 0 && self.states[i] == NodeState::Pending {
                self.states[i] = NodeState::Ready;
                self.ready.insert(self.position[i]);
                unblocked.push(dependent);
            }
        }
        unblocked
    }

    /// Record that the backend rejected a node.
    ///
    /// Every downstream node not yet terminal is skipped. Returns the skipped
    /// nodes in plan order.
    pub fn mark_failed(&mut self, handle: Handle) -> Vec<Handle> {
        if self.states[handle.index()] != NodeState::InFlight {
            return Vec::new();
        }
        self.states[handle.index()] = NodeState::Failed;
        self.terminal += 1;

        let mut skipped: Vec<Handle> = self
            .plan
            .graph()
            .descendants(handle)
            .into_iter()
            .filter(|h| matches!(self.states[h.index()], NodeState::Pending | NodeState::Ready))
            .collect();
        skipped.sort_by_key(|h| self.position[h.index()]);

        for h in &skipped {
            self.ready.remove(&self.position[h.index()]);
            self.states[h.index()] = NodeState::Skipped {
                failed_dependency: handle,
            };
            self.terminal += 1;
        }
        skipped
    }

    /// State of a node
    #[must_use]
    pub fn state(&self, handle: Handle) -> NodeState {
        self.states[handle.index()]
    }

    /// Whether every node is terminal
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.terminal == self.states.len()
    }

    /// Nodes currently ready, in plan order
    #[must_use]
    pub fn ready(&self) -> IndexSet<Handle> {
        self.ready.iter().map(|pos| self.plan.order()[*pos]).collect()
    }

    /// Number of completed nodes
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.states.iter().filter(|s| **s == NodeState::Completed).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featurestack_core::DeclaredId;
    use featurestack_plan::{Aggregation, Compiler, Declarations, EntityDef, FeatureDef, SourceDef, TableDef};
    use proptest::prelude::*;

    fn handle(plan: &CompiledPlan, id: &str) -> Handle {
        plan.registry().get(&DeclaredId::from(id)).unwrap()
    }

    /// s -> t -> f, plus an unrelated entity e
    fn plan() -> CompiledPlan {
        let declarations = Declarations::new()
            .entity(EntityDef::new("e", "user"))
            .source(SourceDef::new("s", "warehouse"))
            .table(TableDef::raw("t", "events", "s", "raw_events"))
            .feature(FeatureDef::aggregate("f", "total", "t", Aggregation::Sum, "amount"));
        Compiler::default().compile(&declarations).unwrap()
    }

    #[test]
    fn test_initial_ready_set() {
        let plan = plan();
        let scheduler = Scheduler::new(&plan);
        let ready: Vec<Handle> = scheduler.ready().into_iter().collect();
        assert_eq!(ready, vec![handle(&plan, "e"), handle(&plan, "s")]);
        assert_eq!(scheduler.decide(), ScheduleDecision::Run(handle(&plan, "e")));
    }

    #[test]
    fn test_sequential_walk_matches_plan() {
        let plan = plan();
        let mut scheduler = Scheduler::new(&plan);
        let mut walked = Vec::new();
        while let Some(h) = scheduler.next_ready() {
            walked.push(h);
            scheduler.mark_complete(h);
        }
        assert_eq!(walked, plan.order());
        assert!(scheduler.is_complete());
        assert_eq!(scheduler.decide(), ScheduleDecision::Complete);
        assert_eq!(scheduler.completed_count(), plan.len());
    }

    #[test]
    fn test_wait_while_in_flight() {
        let plan = plan();
        let mut scheduler = Scheduler::new(&plan);
        let e = scheduler.next_ready().unwrap();
        let s = scheduler.next_ready().unwrap();
        assert_eq!(scheduler.decide(), ScheduleDecision::Wait);

        scheduler.mark_complete(e);
        assert_eq!(scheduler.decide(), ScheduleDecision::Wait);
        let unblocked = scheduler.mark_complete(s);
        assert_eq!(unblocked, vec![handle(&plan, "t")]);
    }

    #[test]
    fn test_failure_skips_descendants() {
        let plan = plan();
        let mut scheduler = Scheduler::new(&plan);
        let e = scheduler.next_ready().unwrap();
        scheduler.mark_complete(e);
        let s = scheduler.next_ready().unwrap();

        let skipped = scheduler.mark_failed(s);
        assert_eq!(skipped, vec![handle(&plan, "t"), handle(&plan, "f")]);
        assert_eq!(
            scheduler.state(handle(&plan, "f")),
            NodeState::Skipped { failed_dependency: s }
        );
        assert!(scheduler.is_complete());
        assert!(scheduler.next_ready().is_none());
    }

    #[test]
    fn test_mark_requires_in_flight() {
        let plan = plan();
        let mut scheduler = Scheduler::new(&plan);
        let t = handle(&plan, "t");
        assert!(scheduler.mark_complete(t).is_empty());
        assert_eq!(scheduler.state(t), NodeState::Pending);
        assert!(!NodeState::Pending.is_terminal());
    }

    /// Tables t0..tn over one source; table i may read lower-numbered tables
    fn arb_tables() -> impl Strategy<Value = Vec<Vec<usize>>> {
        (1usize..16).prop_flat_map(|n| {
            (0..n)
                .map(|i| proptest::collection::vec(0..i.max(1), 0..=i.min(3)))
                .collect::<Vec<_>>()
                .prop_map(|deps: Vec<Vec<usize>>| -> Vec<Vec<usize>> {
                    deps.into_iter()
                        .enumerate()
                        .map(|(i, d)| d.into_iter().filter(|x| *x < i).collect::<Vec<usize>>())
                        .collect()
                })
        })
    }

    fn table_plan(deps: &[Vec<usize>]) -> CompiledPlan {
        let mut declarations = Declarations::new().source(SourceDef::new("s", "warehouse"));
        for (i, d) in deps.iter().enumerate() {
            let id = format!("t{}", i);
            let table = if d.is_empty() {
                TableDef::raw(id.as_str(), id.as_str(), "s", "raw")
            } else {
                let sources: Vec<String> = d.iter().map(|x| format!("t{}", x)).collect();
                TableDef::view(id.as_str(), id.as_str(), sources, "select 1")
            };
            declarations = declarations.table(table);
        }
        Compiler::default().compile(&declarations).unwrap()
    }

    proptest! {
        #[test]
        fn prop_skipped_are_exactly_descendants(deps in arb_tables(), fail in 0usize..16) {
            let plan = table_plan(&deps);
            let failing = handle(&plan, &format!("t{}", fail % deps.len()));
            let mut scheduler = Scheduler::new(&plan);

            while let Some(h) = scheduler.next_ready() {
                if h == failing {
                    scheduler.mark_failed(h);
                } else {
                    scheduler.mark_complete(h);
                }
            }

            prop_assert!(scheduler.is_complete());
            let downstream = plan.graph().descendants(failing);
            for node in plan.graph().nodes() {
                let skipped = matches!(scheduler.state(node.handle), NodeState::Skipped { .. });
                prop_assert_eq!(skipped, downstream.contains(&node.handle));
            }
        }
    }
}
