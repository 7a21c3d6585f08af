use crate::accelerator_library::{find_missing_utility, AcceleratorLibrary};
use crate::heuristics::{select_according_to_preferences, HeuristicChoice, Placement};
use crate::plan::{ExecutionPlan, PlanData, PlanSet, Run};
use crate::pre_scheduling::PreSchedulingProcessor;
use common::{HwLibrary, ScheduledModule, SchedulerError, SchedulingGraph, SchedulingNode, Tables};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Tells the recursion to keep exploring or to unwind because the deadline passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchFlow {
    Continue,
    TimedOut,
}

/// Counters collected while searching.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Candidate placements the heuristic dropped.
    pub discarded_placements: u64,
    /// Nodes the heuristic got to choose a placement for.
    pub placed_nodes: u64,
    /// Branches that could not place a node at all.
    pub dead_ends: u64,
    pub plans_found: u64,
}

impl SearchStats {
    pub fn add(&mut self, other: &SearchStats) {
        self.discarded_placements += other.discarded_placements;
        self.placed_nodes += other.placed_nodes;
        self.dead_ends += other.dead_ends;
        self.plans_found += other.plans_found;
    }
}

/// Everything a finished search hands back.
pub struct SearchOutcome {
    pub plans: PlanSet,
    pub timed_out: bool,
    pub elapsed: Duration,
    pub stats: SearchStats,
    /// Run count of the shortest plan, `usize::MAX` if none was found.
    pub min_runs: usize,
}

/// State of one branch of the search.
#[derive(Clone)]
struct SearchState {
    available: BTreeSet<String>,
    processed: BTreeSet<String>,
    graph: SchedulingGraph,
    tables: Tables,
    current_run: Run,
    current_plan: ExecutionPlan,
    /// Nodes that can't be scheduled any more in this plan.
    blocked: BTreeSet<String>,
    /// Nodes that can't go into any run after the current one.
    next_run_blocked: BTreeSet<String>,
    streamed_data_size: i64,
}

/// Result of applying a placed module to the graph.
struct NodeUpdate {
    graph: SchedulingGraph,
    tables: Tables,
    satisfied: bool,
    skipped_nodes: Vec<String>,
}

/// Depth first search over module placements.
///
/// Every branch owns its copy of the graph, the tables and the node sets, so
/// backtracking is just returning from the recursion.
pub struct PlacementSearch<'a> {
    hw_library: &'a HwLibrary,
    library: &'a dyn AcceleratorLibrary,
    preprocessor: PreSchedulingProcessor<'a>,
    heuristic: HeuristicChoice,
    first_nodes: BTreeSet<String>,
    reduce_single_runs: bool,
    use_max_runs_cap: bool,
    deadline: Instant,
    plans: PlanSet,
    min_runs: usize,
    stats: SearchStats,
}

impl<'a> PlacementSearch<'a> {
    /// Creates a search.
    ///
    /// Nodes of operations that have to lead a pipeline get added to the first nodes.
    ///
    /// # Arguments
    ///
    /// * `hw_library` - Catalog of PR bitstreams.
    /// * `library` - Operation rules.
    /// * `heuristic` - Selection clauses cutting down the candidates of a node.
    /// * `first_nodes` - Nodes that may not share a run with their producers.
    /// * `graph` - Graph that gets searched.
    /// * `reduce_single_runs` - Only close a run once nothing fits into it.
    /// * `use_max_runs_cap` - Prune branches longer than the shortest plan.
    pub fn new(
        hw_library: &'a HwLibrary,
        library: &'a dyn AcceleratorLibrary,
        heuristic: HeuristicChoice,
        first_nodes: BTreeSet<String>,
        graph: &SchedulingGraph,
        reduce_single_runs: bool,
        use_max_runs_cap: bool,
    ) -> Self {
        let mut first_nodes = first_nodes;
        for (name, node) in graph.iter() {
            if library.is_constrained_to_first_in_pipeline(node.operation) {
                first_nodes.insert(name.clone());
            }
        }
        PlacementSearch {
            hw_library,
            library,
            preprocessor: PreSchedulingProcessor::new(hw_library, library),
            heuristic,
            first_nodes,
            reduce_single_runs,
            use_max_runs_cap,
            deadline: Instant::now(),
            plans: PlanSet::new(),
            min_runs: usize::MAX,
            stats: SearchStats::default(),
        }
    }

    /// Searches for plans until the tree is exhausted or the time limit passes.
    ///
    /// The graph has to be preprocessed already.
    ///
    /// # Arguments
    ///
    /// * `available_nodes` - Nodes that can be scheduled now.
    /// * `processed_nodes` - Nodes that are already scheduled.
    /// * `graph` - Preprocessed graph.
    /// * `tables` - Table metadata including the worst case tables.
    /// * `time_limit` - Search budget.
    pub fn run(
        mut self,
        available_nodes: BTreeSet<String>,
        processed_nodes: BTreeSet<String>,
        graph: SchedulingGraph,
        tables: Tables,
        time_limit: Duration,
    ) -> Result<SearchOutcome, SchedulerError> {
        let start = Instant::now();
        self.deadline = common::require(start.checked_add(time_limit), "Search deadline")?;
        let state = SearchState {
            available: available_nodes,
            processed: processed_nodes,
            graph,
            tables,
            current_run: Vec::new(),
            current_plan: Vec::new(),
            blocked: BTreeSet::new(),
            next_run_blocked: BTreeSet::new(),
            streamed_data_size: 0,
        };
        let timed_out = self.place_nodes_recursively(state)? == SearchFlow::TimedOut;
        let elapsed = start.elapsed();
        if timed_out {
            info!(
                "Timeout of {:.3} seconds hit with {} plans found",
                time_limit.as_secs_f64(),
                self.plans.len()
            );
        } else if self.plans.is_empty() {
            return Err(SchedulerError::UnschedulableError(String::from(
                "Every branch of the search ran into a node that can't be placed",
            )));
        }
        debug!(
            "Search done in {:.3}s: {} plans, {} dead ends",
            elapsed.as_secs_f64(),
            self.plans.len(),
            self.stats.dead_ends
        );
        Ok(SearchOutcome {
            plans: self.plans,
            timed_out,
            elapsed,
            stats: self.stats,
            min_runs: self.min_runs,
        })
    }

    fn place_nodes_recursively(&mut self, state: SearchState) -> Result<SearchFlow, SchedulerError> {
        if Instant::now() >= self.deadline {
            return Ok(SearchFlow::TimedOut);
        }
        if self.use_max_runs_cap && state.current_plan.len() > self.min_runs {
            return Ok(SearchFlow::Continue);
        }
        if state.available.is_empty() || state.available.is_subset(&state.blocked) {
            self.save_plan(state);
            return Ok(SearchFlow::Continue);
        }

        let eligible = self.available_nodes_in_this_run(&state)?;
        let mut placements = Vec::new();
        for node_name in eligible.iter() {
            let min_position =
                min_position_in_current_run(&state.current_run, node_name, &state.graph)?;
            placements.extend(self.get_scheduled_modules_for_node_after_pos(
                &state.graph,
                &state.tables,
                min_position,
                node_name,
                &state.current_run,
            )?);
        }

        for placement in placements.iter() {
            let mut new_run = state.current_run.clone();
            new_run.insert(placement.insert_at, placement.module.clone());
            let streamed = state.streamed_data_size
                + new_streamed_data_size(
                    &state.current_run,
                    &placement.module.node_name,
                    &state.graph,
                    &state.tables,
                )?;
            let flow = self.find_next_module_placement(
                &state,
                &placement.module,
                new_run,
                state.current_plan.clone(),
                state.blocked.clone(),
                state.next_run_blocked.clone(),
                streamed,
            )?;
            if flow == SearchFlow::TimedOut {
                return Ok(flow);
            }
        }

        if (placements.is_empty() || !self.reduce_single_runs) && !state.current_run.is_empty() {
            for node_name in state.available.iter() {
                if state.blocked.contains(node_name) {
                    continue;
                }
                let new_blocked: BTreeSet<String> = state
                    .blocked
                    .union(&state.next_run_blocked)
                    .cloned()
                    .collect();
                if new_blocked.contains(node_name) {
                    trace!("{} blocked for the following runs", node_name);
                    let mut next = state.clone();
                    next.blocked = new_blocked;
                    next.next_run_blocked = BTreeSet::new();
                    return self.place_nodes_recursively(next);
                }
                let mut new_plan = state.current_plan.clone();
                new_plan.push(state.current_run.clone());
                let new_placements = self.get_scheduled_modules_for_node_after_pos(
                    &state.graph,
                    &state.tables,
                    0,
                    node_name,
                    &[],
                )?;
                if new_placements.is_empty() {
                    trace!("{} doesn't fit into an empty run", node_name);
                    self.stats.dead_ends += 1;
                    continue;
                }
                let streamed = state.streamed_data_size
                    + new_streamed_data_size(&[], node_name, &state.graph, &state.tables)?;
                for placement in new_placements {
                    let flow = self.find_next_module_placement(
                        &state,
                        &placement.module,
                        vec![placement.module.clone()],
                        new_plan.clone(),
                        new_blocked.clone(),
                        BTreeSet::new(),
                        streamed,
                    )?;
                    if flow == SearchFlow::TimedOut {
                        return Ok(flow);
                    }
                }
            }
        } else if placements.is_empty() {
            self.stats.dead_ends += 1;
        }
        Ok(SearchFlow::Continue)
    }

    fn save_plan(&mut self, state: SearchState) {
        let mut plan = state.current_plan;
        if !state.current_run.is_empty() {
            plan.push(state.current_run);
        }
        let run_count = plan.len();
        let data = PlanData {
            available_nodes: state.available,
            processed_nodes: state.processed,
            graph: state.graph,
            tables: state.tables,
            streamed_data_size: state.streamed_data_size,
        };
        if self.plans.insert(plan, data) {
            self.stats.plans_found += 1;
            if run_count < self.min_runs {
                self.min_runs = run_count;
            }
            trace!("Plan {} saved with {} runs", self.plans.len(), run_count);
        }
    }

    /// Available nodes allowed to join the current run.
    fn available_nodes_in_this_run(
        &self,
        state: &SearchState,
    ) -> Result<BTreeSet<String>, SchedulerError> {
        let mut eligible = BTreeSet::new();
        for node_name in state.available.iter() {
            if state.blocked.contains(node_name) {
                continue;
            }
            let node = state.graph.node(node_name)?;
            if self.first_nodes.contains(node_name)
                && node
                    .producer_names()
                    .any(|p| state.current_run.iter().any(|m| m.node_name == p))
            {
                continue;
            }
            if self.library.is_constrained_to_first_in_pipeline(node.operation)
                && state.current_run.iter().any(|m| {
                    m.node_name != *node_name
                        && self.library.is_constrained_to_first_in_pipeline(m.operation)
                })
            {
                continue;
            }
            eligible.insert(node_name.clone());
        }
        Ok(eligible)
    }

    /// Candidate placements of a node at or after `min_position`.
    ///
    /// Satisfying bitstreams come first. Only resource elastic nodes fall back to
    /// partial modules from the whole library.
    fn get_scheduled_modules_for_node_after_pos(
        &mut self,
        graph: &SchedulingGraph,
        tables: &Tables,
        min_position: usize,
        node_name: &str,
        current_run: &[ScheduledModule],
    ) -> Result<Vec<Placement>, SchedulerError> {
        let node = graph.node(node_name)?;
        let mut placements = Vec::new();
        if !node.satisfying_bitstreams.is_empty() {
            placements = self.get_chosen_module_placements(
                node_name,
                node,
                tables,
                true,
                min_position,
                current_run,
                &node.satisfying_bitstreams,
            )?;
        }
        if placements.is_empty() && self.library.is_resource_elastic(node.operation) {
            let hw_library = self.hw_library;
            placements = self.get_chosen_module_placements(
                node_name,
                node,
                tables,
                false,
                min_position,
                current_run,
                hw_library.start_locations(node.operation),
            )?;
        }
        Ok(placements)
    }

    #[allow(clippy::too_many_arguments)]
    fn get_chosen_module_placements(
        &mut self,
        node_name: &str,
        node: &SchedulingNode,
        tables: &Tables,
        satisfying: bool,
        min_position: usize,
        current_run: &[ScheduledModule],
        start_locations: &[Vec<String>],
    ) -> Result<Vec<Placement>, SchedulerError> {
        let candidates = self.find_all_available_bitstreams_after_min_pos(
            node_name,
            node,
            tables,
            min_position,
            current_run,
            start_locations,
        )?;
        if candidates.is_empty() {
            return Ok(candidates);
        }
        let clauses = if satisfying {
            &self.heuristic.satisfying
        } else {
            &self.heuristic.fitting
        };
        let chosen = select_according_to_preferences(&candidates, clauses);
        self.stats.discarded_placements += (candidates.len() - chosen.len()) as u64;
        self.stats.placed_nodes += 1;
        Ok(chosen)
    }

    fn find_all_available_bitstreams_after_min_pos(
        &self,
        node_name: &str,
        node: &SchedulingNode,
        tables: &Tables,
        min_position: usize,
        current_run: &[ScheduledModule],
        start_locations: &[Vec<String>],
    ) -> Result<Vec<Placement>, SchedulerError> {
        let input = node.data_tables.first().and_then(|name| tables.get(name));
        let column_count = self.hw_library.column_count();
        let mut placements = Vec::new();
        for (start, bitstreams) in start_locations.iter().enumerate().skip(min_position) {
            for bitstream in bitstreams {
                let module = common::require(
                    self.hw_library.get_bitstream(node.operation, bitstream),
                    &format!("Bitstream {}", bitstream),
                )?;
                let end = start + module.length - 1;
                if end >= column_count {
                    continue;
                }
                if let Some(insert_at) = free_slot(current_run, start, end) {
                    let mut scheduled =
                        ScheduledModule::new(node_name, node.operation, bitstream, (start, end));
                    if let Some(table) = input {
                        scheduled.processed_table_data = table.sorted_status.clone();
                        scheduled.table_data_size = table.record_count;
                    }
                    placements.push(Placement {
                        insert_at,
                        module: scheduled,
                    });
                }
            }
        }
        Ok(placements)
    }

    /// Applies the placed module and continues the search from the new state.
    #[allow(clippy::too_many_arguments)]
    fn find_next_module_placement(
        &mut self,
        state: &SearchState,
        module: &ScheduledModule,
        new_run: Run,
        new_plan: ExecutionPlan,
        blocked: BTreeSet<String>,
        next_run_blocked: BTreeSet<String>,
        streamed_data_size: i64,
    ) -> Result<SearchFlow, SchedulerError> {
        let node_name = &module.node_name;
        let update = match self.update_all_nodes(&state.graph, &state.tables, module) {
            Ok(Some(update)) => update,
            Ok(None) => {
                trace!("{} makes no progress with {}", node_name, module.bitstream);
                self.stats.dead_ends += 1;
                return Ok(SearchFlow::Continue);
            }
            // Module refused by the operation rules ends only this branch.
            Err(SchedulerError::SchedulerError(msg)) => {
                debug!("{} can't use {}: {}", node_name, module.bitstream, msg);
                self.stats.dead_ends += 1;
                return Ok(SearchFlow::Continue);
            }
            Err(e) => return Err(e),
        };
        let NodeUpdate {
            graph: mut new_graph,
            tables: mut new_tables,
            satisfied,
            skipped_nodes,
        } = update;

        let (mut available, mut processed) = create_new_available_nodes_lists(
            &state.graph,
            &state.available,
            &state.processed,
            node_name,
            satisfied,
        )?;
        for skipped in skipped_nodes.iter() {
            if !available.contains(skipped) {
                return Err(SchedulerError::SchedulerError(format!(
                    "Skipped node {} is not available after {}",
                    skipped, node_name
                )));
            }
            let (next_available, next_processed) = create_new_available_nodes_lists(
                &state.graph,
                &available,
                &processed,
                skipped,
                satisfied,
            )?;
            available = next_available;
            processed = next_processed;
        }

        let removed = self.update_satisfying_bitstreams(
            node_name,
            &state.graph,
            &mut new_graph,
            &state.tables,
            &mut new_tables,
            &mut available,
            &processed,
        )?;
        processed.extend(removed);

        let next_run_blocked = self.get_new_blocked_nodes(next_run_blocked, module, &state.graph);
        self.place_nodes_recursively(SearchState {
            available,
            processed,
            graph: new_graph,
            tables: new_tables,
            current_run: new_run,
            current_plan: new_plan,
            blocked,
            next_run_blocked,
            streamed_data_size,
        })
    }

    /// Applies the work of a module to the node it serves.
    ///
    /// Returns None if the module leaves the node's requirement unchanged.
    fn update_all_nodes(
        &self,
        graph: &SchedulingGraph,
        tables: &Tables,
        module: &ScheduledModule,
    ) -> Result<Option<NodeUpdate>, SchedulerError> {
        let node_name = &module.node_name;
        let node = graph.node(node_name)?;
        let capacity = &common::require(
            self.hw_library
                .get_bitstream(module.operation, &module.bitstream),
            &format!("Bitstream {}", module.bitstream),
        )?
        .capacity;
        let mut new_graph = graph.clone();
        let mut new_tables = tables.clone();
        let mut skipped_nodes = Vec::new();
        let satisfied;
        if self.library.is_operation_sorting(node.operation) {
            satisfied = self.library.update_data_table(
                node.operation,
                capacity,
                &node.data_tables,
                &mut new_tables,
            )?;
            if satisfied {
                skipped_nodes =
                    self.check_for_skippable_sort_operations(&new_graph, &new_tables, node_name)?;
            }
        } else {
            let (done, missing) = find_missing_utility(capacity, &node.capacity)?;
            satisfied = done;
            if !done {
                let new_capacity: Vec<i64> = missing.iter().map(|m| (*m).max(0)).collect();
                if new_capacity == node.capacity {
                    return Ok(None);
                }
                common::require(new_graph.get_node_mut(node_name), node_name)?.capacity =
                    new_capacity;
            }
        }

        if satisfied {
            let resulting_tables =
                self.library
                    .get_resulting_tables(node.operation, &node.data_tables, &new_tables)?;
            new_graph.add_new_table_to_next_nodes(node_name, &resulting_tables)?;
            new_graph.remove(node_name);
            for skipped in skipped_nodes.iter() {
                new_graph.add_new_table_to_next_nodes(skipped, &resulting_tables)?;
                new_graph.remove(skipped);
            }
        }
        Ok(Some(NodeUpdate {
            graph: new_graph,
            tables: new_tables,
            satisfied,
            skipped_nodes,
        }))
    }

    /// Sorting consumers with nothing left to sort once the node finished.
    fn check_for_skippable_sort_operations(
        &self,
        graph: &SchedulingGraph,
        tables: &Tables,
        node_name: &str,
    ) -> Result<Vec<String>, SchedulerError> {
        let node = graph.node(node_name)?;
        for table_name in node.data_tables.iter() {
            let table = common::require(tables.get(table_name), &format!("Table {}", table_name))?;
            if !table.is_sorted() {
                return Ok(Vec::new());
            }
        }
        Ok(node
            .consumer_names()
            .filter(|consumer| {
                graph
                    .get_node(consumer)
                    .map_or(false, |c| self.library.is_operation_sorting(c.operation))
            })
            .map(|consumer| consumer.to_string())
            .collect())
    }

    /// Reruns preprocessing if the placement changed any requirement or table.
    ///
    /// Returns the nodes preprocessing removed.
    #[allow(clippy::too_many_arguments)]
    fn update_satisfying_bitstreams(
        &self,
        node_name: &str,
        old_graph: &SchedulingGraph,
        new_graph: &mut SchedulingGraph,
        old_tables: &Tables,
        new_tables: &mut Tables,
        available: &mut BTreeSet<String>,
        processed: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, SchedulerError> {
        let mut update_required = false;
        for (name, new_node) in new_graph.iter() {
            let old_node = old_graph.node(name)?;
            if old_node.capacity != new_node.capacity
                || tables_changed(old_node, new_node, old_tables, new_tables)
            {
                update_required = true;
                break;
            }
        }
        if !update_required {
            for consumer in old_graph.node(node_name)?.consumer_names() {
                update_required = match new_graph.get_node(consumer) {
                    None => true,
                    Some(new_node) => {
                        tables_changed(old_graph.node(consumer)?, new_node, old_tables, new_tables)
                    }
                };
                if update_required {
                    break;
                }
            }
        }
        if update_required {
            return self.preprocessor.add_satisfying_bitstream_locations_to_graph(
                new_graph, new_tables, available, processed,
            );
        }
        Ok(BTreeSet::new())
    }

    /// Adds the data sensitive nodes downstream of a reducing module.
    fn get_new_blocked_nodes(
        &self,
        next_run_blocked: BTreeSet<String>,
        module: &ScheduledModule,
        graph: &SchedulingGraph,
    ) -> BTreeSet<String> {
        let mut blocked = next_run_blocked;
        if !self.library.is_reducing(module.operation) {
            return blocked;
        }
        let mut stack = vec![module.node_name.clone()];
        let mut visited = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let node = match graph.get_node(&current) {
                Some(node) => node,
                None => continue,
            };
            for consumer_name in node.consumer_names() {
                if let Some(consumer) = graph.get_node(consumer_name) {
                    if self.library.is_data_sensitive(consumer.operation) {
                        blocked.insert(consumer_name.to_string());
                    }
                    stack.push(consumer_name.to_string());
                }
            }
        }
        blocked
    }
}

/// Index in the run where a module on `start..=end` goes, None if it overlaps.
fn free_slot(current_run: &[ScheduledModule], start: usize, end: usize) -> Option<usize> {
    if current_run.is_empty() {
        return Some(0);
    }
    let index = get_module_index(start, current_run);
    if index == current_run.len() {
        if current_run[index - 1].end() < start {
            return Some(index);
        }
    } else if current_run[index].start() > end
        && (index == 0 || current_run[index - 1].end() < start)
    {
        return Some(index);
    }
    None
}

/// Position of the first module starting at or after `start`.
fn get_module_index(start: usize, current_run: &[ScheduledModule]) -> usize {
    current_run
        .iter()
        .position(|module| module.start() >= start)
        .unwrap_or_else(|| current_run.len())
}

/// First column after every producer of the node placed in the run.
fn min_position_in_current_run(
    current_run: &[ScheduledModule],
    node_name: &str,
    graph: &SchedulingGraph,
) -> Result<usize, SchedulerError> {
    let node = graph.node(node_name)?;
    Ok(current_run
        .iter()
        .filter(|module| node.producer_names().any(|p| p == module.node_name))
        .map(|module| module.end() + 1)
        .max()
        .unwrap_or(0))
}

/// Bytes a node reads from memory instead of from a module of the same run.
fn new_streamed_data_size(
    current_run: &[ScheduledModule],
    node_name: &str,
    graph: &SchedulingGraph,
    tables: &Tables,
) -> Result<i64, SchedulerError> {
    let node = graph.node(node_name)?;
    let mut size = 0;
    for (link, table_name) in node.before_nodes.iter().zip(node.data_tables.iter()) {
        if !link.is_boundary() && current_run.iter().any(|m| m.node_name == link.node) {
            continue;
        }
        if table_name.is_empty() {
            continue;
        }
        size += common::require(tables.get(table_name), &format!("Table {}", table_name))?
            .size_in_bytes();
    }
    Ok(size)
}

fn create_new_available_nodes_lists(
    graph: &SchedulingGraph,
    available: &BTreeSet<String>,
    processed: &BTreeSet<String>,
    node_name: &str,
    satisfied: bool,
) -> Result<(BTreeSet<String>, BTreeSet<String>), SchedulerError> {
    let mut new_available = available.clone();
    let mut new_processed = processed.clone();
    if satisfied {
        new_available.remove(node_name);
        new_processed.insert(node_name.to_string());
        new_available.extend(graph.new_available_nodes(node_name, &new_processed)?);
    }
    Ok((new_available, new_processed))
}

fn tables_changed(
    old_node: &SchedulingNode,
    new_node: &SchedulingNode,
    old_tables: &Tables,
    new_tables: &Tables,
) -> bool {
    old_node.data_tables.len() != new_node.data_tables.len()
        || old_node
            .data_tables
            .iter()
            .zip(new_node.data_tables.iter())
            .any(|(old, new)| old_tables.get(old) != new_tables.get(new))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::accelerator_library::DefaultAcceleratorLibrary;
    use crate::heuristics::default_heuristics;
    use common::testutil::*;
    use common::{OperationType, SortedStatus};

    struct Fixture {
        hw: HwLibrary,
        lib: DefaultAcceleratorLibrary,
    }

    impl Fixture {
        fn new(hw: HwLibrary) -> Self {
            init();
            Fixture {
                hw,
                lib: DefaultAcceleratorLibrary::new(),
            }
        }

        fn search(
            &self,
            graph: &SchedulingGraph,
            tables: &Tables,
            time_limit: Duration,
        ) -> Result<SearchOutcome, SchedulerError> {
            self.search_with(graph, tables, time_limit, true, true)
        }

        fn search_with(
            &self,
            graph: &SchedulingGraph,
            tables: &Tables,
            time_limit: Duration,
            reduce_single_runs: bool,
            use_max_runs_cap: bool,
        ) -> Result<SearchOutcome, SchedulerError> {
            let processor = PreSchedulingProcessor::new(&self.hw, &self.lib);
            let mut graph = graph.clone();
            let mut tables = tables.clone();
            let mut processed = BTreeSet::new();
            let mut available = graph.starting_nodes(&processed);
            processed.extend(processor.add_satisfying_bitstream_locations_to_graph(
                &mut graph,
                &mut tables,
                &mut available,
                &processed,
            )?);
            PlacementSearch::new(
                &self.hw,
                &self.lib,
                default_heuristics()[0].clone(),
                BTreeSet::new(),
                &graph,
                reduce_single_runs,
                use_max_runs_cap,
            )
            .run(available, processed, graph, tables, time_limit)
        }
    }

    fn long() -> Duration {
        Duration::from_secs(60)
    }

    fn positions(run: &Run) -> Vec<(&str, (usize, usize))> {
        run.iter()
            .map(|m| (m.node_name.as_str(), m.position))
            .collect()
    }

    #[test]
    fn test_single_run_chain() {
        let fixture = Fixture::new(uniform_library(
            4,
            &[
                (OperationType::Filter, "filter", vec![4, 2], 1),
                (OperationType::LinearSort, "linear_1024", vec![1024], 1),
                (OperationType::AggregationSum, "aggregation", vec![1], 1),
            ],
        ));
        let graph = chain_graph(
            &[
                ("f", OperationType::Filter, vec![1, 1]),
                ("s", OperationType::LinearSort, vec![]),
                ("a", OperationType::AggregationSum, vec![1]),
            ],
            INPUT_TABLE,
        );
        let tables = single_table(INPUT_TABLE, 4, 1000);
        let outcome = fixture.search(&graph, &tables, long()).unwrap();
        assert!(!outcome.timed_out);
        assert_eq!(outcome.plans.len(), 1);
        assert_eq!(outcome.min_runs, 1);
        let (plan, data) = outcome.plans.get(0).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(
            positions(&plan[0]),
            vec![("f", (0, 0)), ("s", (1, 1)), ("a", (2, 2))]
        );
        assert!(data.available_nodes.is_empty());
        assert!(data.graph.is_empty());
        assert_eq!(data.processed_nodes.len(), 3);
        // Only the filter streams from memory.
        assert_eq!(data.streamed_data_size, 4 * 1000 * 4);
    }

    #[test]
    fn test_merge_sort_passes() {
        let fixture = Fixture::new(uniform_library(
            4,
            &[(OperationType::MergeSort, "merge_64", vec![64], 1)],
        ));
        let graph = chain_graph(&[("m", OperationType::MergeSort, vec![])], INPUT_TABLE);
        let tables = single_table(INPUT_TABLE, 4, 1000);
        let outcome = fixture.search(&graph, &tables, long()).unwrap();
        let (plan, data) = outcome.plans.get(0).unwrap();
        let modules: usize = plan.iter().map(|run| run.len()).sum();
        assert_eq!(modules, 16);
        assert_eq!(plan.len(), 4);
        assert_eq!(
            data.tables[INPUT_TABLE].sorted_status,
            SortedStatus::FullySorted(1000)
        );
        assert_eq!(plan[0][0].processed_table_data, SortedStatus::Unsorted);
    }

    #[test]
    fn test_reducing_producer_defers_merge() {
        let fixture = Fixture::new(uniform_library(
            4,
            &[
                (OperationType::Filter, "filter", vec![4, 2], 1),
                (OperationType::MergeSort, "merge_64", vec![64], 1),
            ],
        ));
        let graph = chain_graph(
            &[
                ("f", OperationType::Filter, vec![1, 1]),
                ("m", OperationType::MergeSort, vec![]),
            ],
            INPUT_TABLE,
        );
        let tables = single_table(INPUT_TABLE, 4, 100);
        let outcome = fixture.search(&graph, &tables, long()).unwrap();
        assert_eq!(outcome.plans.len(), 1);
        let (plan, data) = outcome.plans.get(0).unwrap();
        assert_eq!(positions(&plan[0]), vec![("f", (0, 0))]);
        assert_eq!(plan.len(), 1);
        assert!(data.available_nodes.contains("m"));
        assert!(data.processed_nodes.contains("f"));
    }

    #[test]
    fn test_sorted_output_skips_merge() {
        let fixture = Fixture::new(uniform_library(
            4,
            &[
                (OperationType::LinearSort, "linear_512", vec![512], 1),
                (OperationType::LinearSort, "linear_2048", vec![2048], 1),
                (OperationType::MergeSort, "merge_64", vec![64], 1),
            ],
        ));
        let graph = chain_graph(
            &[
                ("l", OperationType::LinearSort, vec![]),
                ("m", OperationType::MergeSort, vec![]),
            ],
            INPUT_TABLE,
        );
        let tables = single_table(INPUT_TABLE, 4, 1000);
        let outcome = fixture.search(&graph, &tables, long()).unwrap();
        let (plan, data) = outcome.plans.get(0).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].len(), 1);
        assert_eq!(plan[0][0].bitstream, "linear_2048");
        assert!(data.processed_nodes.contains("m"));
        assert!(data.graph.is_empty());
    }

    #[test]
    fn test_refused_module_ends_only_its_branch() {
        let fixture = Fixture::new(uniform_library(
            4,
            &[
                (OperationType::Filter, "filter_narrow", vec![4], 1),
                (OperationType::Filter, "filter_wide", vec![4, 2], 1),
            ],
        ));
        let graph = chain_graph(&[("f", OperationType::Filter, vec![1, 1])], INPUT_TABLE);
        let tables = single_table(INPUT_TABLE, 4, 10);
        let outcome = fixture.search(&graph, &tables, long()).unwrap();
        assert!(!outcome.plans.is_empty());
        assert!(outcome.stats.dead_ends > 0);
        for (plan, _) in outcome.plans.iter() {
            for module in plan.iter().flatten() {
                assert_eq!(module.bitstream, "filter_wide");
            }
        }
    }

    /// Run index and columns of the first and last module of a node.
    fn span(plan: &[Run], node: &str) -> Option<((usize, usize), (usize, usize))> {
        let mut found = plan.iter().enumerate().flat_map(|(i, run)| {
            run.iter()
                .filter(move |m| m.node_name == node)
                .map(move |m| (i, m.position))
        });
        let (first_run, first_pos) = found.next()?;
        let (last_run, last_pos) = found.last().unwrap_or((first_run, first_pos));
        Some(((first_run, first_pos.0), (last_run, last_pos.1)))
    }

    fn join_fixture() -> Fixture {
        Fixture::new(uniform_library(
            4,
            &[
                (OperationType::Filter, "filter", vec![4, 2], 1),
                (OperationType::Join, "join", vec![1], 1),
            ],
        ))
    }

    #[test]
    fn test_join_waits_for_both_producers() {
        let fixture = join_fixture();
        let (graph, tables) = join_graph(false);
        let outcome = fixture.search(&graph, &tables, long()).unwrap();
        assert!(!outcome.plans.is_empty());
        for (plan, data) in outcome.plans.iter() {
            assert!(data.graph.is_empty());
            let ((join_run, join_start), _) = span(plan, "j").unwrap();
            for producer in ["a", "b"].iter() {
                let (_, (run, end)) = span(plan, producer).unwrap();
                assert!(run < join_run || (run == join_run && end < join_start));
            }
        }
    }

    #[test]
    fn test_join_with_producer_outside_of_graph() {
        let fixture = join_fixture();
        let (graph, tables) = join_graph(true);
        let outcome = fixture.search(&graph, &tables, long()).unwrap();
        assert_eq!(outcome.plans.len(), 1);
        let (plan, data) = outcome.plans.get(0).unwrap();
        assert_eq!(positions(&plan[0]), vec![("a", (0, 0)), ("j", (1, 1))]);
        assert!(data.processed_nodes.contains("j"));
        assert!(data.available_nodes.is_empty());
    }

    #[test]
    fn test_unsorted_join_input_unschedulable() {
        let fixture = join_fixture();
        let (graph, mut tables) = join_graph(true);
        tables.get_mut("tb").unwrap().sorted_status = SortedStatus::Unsorted;
        match fixture.search(&graph, &tables, long()) {
            Err(SchedulerError::UnschedulableError(_)) => {}
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("join needs sorted inputs"),
        }
    }

    fn three_step_chain() -> (Fixture, SchedulingGraph, Tables) {
        let fixture = Fixture::new(uniform_library(
            4,
            &[
                (OperationType::Filter, "filter", vec![4, 2], 1),
                (OperationType::AggregationSum, "aggregation", vec![1], 1),
            ],
        ));
        let graph = chain_graph(
            &[
                ("f", OperationType::Filter, vec![1, 1]),
                ("g", OperationType::Filter, vec![1, 1]),
                ("a", OperationType::AggregationSum, vec![1]),
            ],
            INPUT_TABLE,
        );
        (fixture, graph, single_table(INPUT_TABLE, 4, 100))
    }

    #[test]
    fn test_split_runs_explored_without_reduction() {
        let (fixture, graph, tables) = three_step_chain();
        let reduced = fixture.search(&graph, &tables, long()).unwrap();
        assert_eq!(reduced.plans.len(), 1);

        let split = fixture
            .search_with(&graph, &tables, long(), false, false)
            .unwrap();
        assert_eq!(split.min_runs, 1);
        // f|g|a, f|ga, fg|a and fga
        assert_eq!(split.plans.len(), 4);
        let mut run_counts: Vec<usize> = split.plans.iter().map(|(plan, _)| plan.len()).collect();
        run_counts.sort();
        assert_eq!(run_counts, vec![1, 2, 2, 3]);
        for (_, data) in split.plans.iter() {
            assert!(data.graph.is_empty());
        }
    }

    #[test]
    fn test_max_runs_cap_prunes_longer_plans() {
        let (fixture, graph, tables) = three_step_chain();
        let capped = fixture
            .search_with(&graph, &tables, long(), false, true)
            .unwrap();
        let uncapped = fixture
            .search_with(&graph, &tables, long(), false, false)
            .unwrap();
        assert_eq!(capped.min_runs, uncapped.min_runs);
        assert!(capped.plans.len() < uncapped.plans.len());
        assert!(capped.plans.iter().all(|(plan, _)| plan.len() <= 2));
        assert!(uncapped.plans.iter().any(|(plan, _)| plan.len() == 3));
    }

    #[test]
    fn test_zero_time_limit() {
        let fixture = Fixture::new(mixed_library(4));
        let graph = chain_graph(&[("f", OperationType::Filter, vec![1, 1])], INPUT_TABLE);
        let tables = single_table(INPUT_TABLE, 4, 10);
        let outcome = fixture
            .search(&graph, &tables, Duration::from_secs(0))
            .unwrap();
        assert!(outcome.timed_out);
        assert!(outcome.plans.is_empty());
    }

    #[test]
    fn test_unplaceable_node() {
        let fixture = Fixture::new(uniform_library(
            2,
            &[(OperationType::Filter, "filter", vec![4, 2], 1)],
        ));
        let graph = chain_graph(&[("a", OperationType::Addition, vec![1])], INPUT_TABLE);
        let tables = single_table(INPUT_TABLE, 4, 10);
        match fixture.search(&graph, &tables, long()) {
            Err(SchedulerError::UnschedulableError(_)) => {}
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("addition has no bitstreams"),
        }
    }

    #[test]
    fn test_elastic_filter_splits_over_modules() {
        let fixture = Fixture::new(uniform_library(
            4,
            &[(OperationType::Filter, "filter", vec![4, 2], 1)],
        ));
        let graph = chain_graph(&[("f", OperationType::Filter, vec![10, 2])], INPUT_TABLE);
        let tables = single_table(INPUT_TABLE, 4, 10);
        let outcome = fixture.search(&graph, &tables, long()).unwrap();
        let (plan, _) = outcome.plans.get(0).unwrap();
        assert_eq!(
            positions(&plan[0]),
            vec![("f", (0, 0)), ("f", (1, 1)), ("f", (2, 2))]
        );
    }

    #[test]
    fn test_first_nodes_start_new_run() {
        let fixture = Fixture::new(uniform_library(
            4,
            &[
                (OperationType::Addition, "addition", vec![1], 1),
                (OperationType::Multiplication, "multiplication", vec![1], 1),
            ],
        ));
        let graph = chain_graph(
            &[
                ("add", OperationType::Addition, vec![1]),
                ("mul", OperationType::Multiplication, vec![1]),
            ],
            INPUT_TABLE,
        );
        let mut tables = single_table(INPUT_TABLE, 4, 10);
        let mut pre_graph = graph.clone();
        let processor = PreSchedulingProcessor::new(&fixture.hw, &fixture.lib);
        let mut available = pre_graph.starting_nodes(&BTreeSet::new());
        processor
            .add_satisfying_bitstream_locations_to_graph(
                &mut pre_graph,
                &mut tables,
                &mut available,
                &BTreeSet::new(),
            )
            .unwrap();
        let first_nodes: BTreeSet<String> = vec![String::from("mul")].into_iter().collect();
        let outcome = PlacementSearch::new(
            &fixture.hw,
            &fixture.lib,
            default_heuristics()[0].clone(),
            first_nodes,
            &pre_graph,
            true,
            true,
        )
        .run(available, BTreeSet::new(), pre_graph, tables, long())
        .unwrap();
        let (plan, _) = outcome.plans.get(0).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(positions(&plan[0]), vec![("add", (0, 0))]);
        assert_eq!(positions(&plan[1]), vec![("mul", (0, 0))]);
    }

    #[test]
    fn test_deterministic() {
        let fixture = Fixture::new(mixed_library(6));
        let (graph, tables) = random_chain(&mut seeded_rng(3), 5);
        let first = fixture.search(&graph, &tables, long()).unwrap();
        let second = fixture.search(&graph, &tables, long()).unwrap();
        assert_eq!(first.plans.len(), second.plans.len());
        for (a, b) in first.plans.iter().zip(second.plans.iter()) {
            assert_eq!(a.0, b.0);
        }
        assert_eq!(first.stats, second.stats);
    }

    #[test]
    fn test_random_chains_respect_layout() {
        let fixture = Fixture::new(mixed_library(8));
        let mut rng = seeded_rng(42);
        for _ in 0..10 {
            let (graph, tables) = random_chain(&mut rng, 5);
            let outcome = fixture.search(&graph, &tables, long()).unwrap();
            for (plan, _) in outcome.plans.iter() {
                for run in plan.iter() {
                    for pair in run.windows(2) {
                        assert!(pair[0].end() < pair[1].start());
                    }
                    for module in run.iter() {
                        assert!(module.end() < 8);
                        let node = graph.node(&module.node_name).unwrap();
                        for producer in node.producer_names() {
                            if let Some(p) = run.iter().find(|m| m.node_name == producer) {
                                assert!(p.end() < module.start());
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_free_slot() {
        let run = vec![
            ScheduledModule::new("a", OperationType::Filter, "f", (1, 2)),
            ScheduledModule::new("b", OperationType::Filter, "f", (5, 5)),
        ];
        assert_eq!(free_slot(&run, 0, 0), Some(0));
        assert_eq!(free_slot(&run, 0, 1), None);
        assert_eq!(free_slot(&run, 3, 4), Some(1));
        assert_eq!(free_slot(&run, 2, 3), None);
        assert_eq!(free_slot(&run, 6, 7), Some(2));
        assert_eq!(free_slot(&run, 5, 6), None);
        assert_eq!(free_slot(&[], 3, 3), Some(0));
    }
}
