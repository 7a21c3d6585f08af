use crate::accelerator_library::AcceleratorLibrary;
use common::{HwLibrary, OperationType, SchedulerError, SchedulingGraph, Tables};
use std::collections::{BTreeMap, BTreeSet};

/// Annotates nodes with the bitstreams that can process them in one go.
pub struct PreSchedulingProcessor<'a> {
    hw_library: &'a HwLibrary,
    library: &'a dyn AcceleratorLibrary,
    min_capacity: BTreeMap<OperationType, Vec<i64>>,
}

impl<'a> PreSchedulingProcessor<'a> {
    /// Creates a processor and caches the smallest capacity of every operation.
    ///
    /// # Arguments
    ///
    /// * `hw_library` - Catalog of PR bitstreams.
    /// * `library` - Operation rules.
    pub fn new(hw_library: &'a HwLibrary, library: &'a dyn AcceleratorLibrary) -> Self {
        let min_capacity = OperationType::all()
            .iter()
            .filter_map(|op| hw_library.min_capacity(*op).ok().map(|cap| (*op, cap)))
            .collect();
        Self {
            hw_library,
            library,
            min_capacity,
        }
    }

    /// Walks the graph from the available nodes and sets the satisfying bitstreams
    /// and worst case output tables of every node reached.
    ///
    /// Nodes with nothing left to do get removed from the graph and from
    /// `available_nodes`; their names are returned.
    ///
    /// # Arguments
    ///
    /// * `graph` - Graph to annotate.
    /// * `tables` - Table metadata, worst case tables get added.
    /// * `available_nodes` - Nodes that can be scheduled now.
    /// * `processed_nodes` - Nodes that are already scheduled.
    pub fn add_satisfying_bitstream_locations_to_graph(
        &self,
        graph: &mut SchedulingGraph,
        tables: &mut Tables,
        available_nodes: &mut BTreeSet<String>,
        processed_nodes: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, SchedulerError> {
        let mut worklist = available_nodes.clone();
        let mut processed = processed_nodes.clone();
        let mut removed = BTreeSet::new();
        while let Some(node_name) = worklist.iter().next().cloned() {
            worklist.remove(&node_name);
            if !graph.contains(&node_name) {
                continue;
            }
            processed.insert(node_name.clone());
            worklist.extend(graph.new_available_nodes(&node_name, &processed)?);

            let node = graph.node(&node_name)?;
            let operation = node.operation;
            let input_tables = node.data_tables.clone();
            let min_requirements = self.library.get_min_requirements(node, tables)?;
            let satisfying = self.fitting_bitstream_locations(operation, &min_requirements);
            common::require(graph.get_node_mut(&node_name), &node_name)?.satisfying_bitstreams =
                satisfying;

            let resulting_tables = match self.min_capacity.get(&operation) {
                Some(min_capacity) => self.library.get_worst_case_processed_tables(
                    operation,
                    min_capacity,
                    &input_tables,
                    tables,
                )?,
                None => input_tables,
            };
            graph.add_new_table_to_next_nodes(&node_name, &resulting_tables)?;

            if min_requirements == [0] {
                if available_nodes.remove(&node_name) {
                    available_nodes.extend(graph.new_available_nodes(&node_name, &processed)?);
                }
                debug!("Removing {} from the graph, nothing to process", node_name);
                graph.remove_node_from_graph(&node_name)?;
                removed.insert(node_name);
            }
        }
        Ok(removed)
    }

    /// Recomputes the satisfying bitstreams of one node.
    pub fn update_only_satisfying_bitstreams(
        &self,
        node_name: &str,
        graph: &mut SchedulingGraph,
        tables: &Tables,
    ) -> Result<(), SchedulerError> {
        let node = graph.node(node_name)?;
        let min_requirements = self.library.get_min_requirements(node, tables)?;
        let satisfying = self.fitting_bitstream_locations(node.operation, &min_requirements);
        common::require(graph.get_node_mut(node_name), node_name)?.satisfying_bitstreams =
            satisfying;
        Ok(())
    }

    /// Start location index restricted to bitstreams covering the requirement.
    fn fitting_bitstream_locations(
        &self,
        operation: OperationType,
        min_requirements: &[i64],
    ) -> Vec<Vec<String>> {
        let modules = match self.hw_library.get_operation(operation) {
            Some(modules) => modules,
            None => return Vec::new(),
        };
        let fitting: BTreeSet<&String> = modules
            .bitstreams
            .iter()
            .filter(|(_, module)| {
                module
                    .capacity
                    .iter()
                    .enumerate()
                    .all(|(i, cap)| *cap >= min_requirements.get(i).copied().unwrap_or(0))
            })
            .map(|(name, _)| name)
            .collect();
        if fitting.is_empty() {
            return Vec::new();
        }
        modules
            .start_locations
            .iter()
            .map(|names| {
                names
                    .iter()
                    .filter(|name| fitting.contains(name))
                    .cloned()
                    .collect()
            })
            .collect()
    }
}
