use common::{ScheduledModule, SchedulingGraph, Tables};
use std::collections::{BTreeSet, HashSet};

/// Modules configured together, ordered by column.
pub type Run = Vec<ScheduledModule>;

/// Runs executed one after the other.
pub type ExecutionPlan = Vec<Run>;

/// Scheduling state left behind by a complete plan.
#[derive(Clone, Debug)]
pub struct PlanData {
    /// Nodes that are still available, the ones the plan had to leave out.
    pub available_nodes: BTreeSet<String>,
    pub processed_nodes: BTreeSet<String>,
    pub graph: SchedulingGraph,
    pub tables: Tables,
    /// Bytes streamed from memory while executing the plan.
    pub streamed_data_size: i64,
}

/// Complete plans in discovery order, each plan stored once.
#[derive(Default)]
pub struct PlanSet {
    plans: Vec<(ExecutionPlan, PlanData)>,
    seen: HashSet<ExecutionPlan>,
}

impl PlanSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plan unless the same module sequence is stored already.
    ///
    /// Returns true if the plan was new.
    pub fn insert(&mut self, plan: ExecutionPlan, data: PlanData) -> bool {
        if self.seen.contains(&plan) {
            return false;
        }
        self.seen.insert(plan.clone());
        self.plans.push((plan, data));
        true
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&(ExecutionPlan, PlanData)> {
        self.plans.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ExecutionPlan, PlanData)> {
        self.plans.iter()
    }

    /// Takes the plan at `index` out of the set.
    pub fn take(mut self, index: usize) -> Option<(ExecutionPlan, PlanData)> {
        if index < self.plans.len() {
            Some(self.plans.swap_remove(index))
        } else {
            None
        }
    }
}
