use crate::plan::Run;
use common::{HwLibrary, SchedulerError, SchedulingGraph, TableMetadata, Tables};
use std::collections::{BTreeMap, BTreeSet};

/// Node of a run with the positions of its modules in the run, counted from 1.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RunNode {
    pub node_name: String,
    pub module_locations: Vec<usize>,
    /// Capacity of the bitstream at each location, e.g. the channels of a merge sorter.
    pub module_parameters: Vec<Vec<i64>>,
}

/// Run ready for execution.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ScheduledRun {
    pub modules: Run,
    /// Unique nodes of the run in module order.
    pub nodes: Vec<RunNode>,
}

impl ScheduledRun {
    pub fn contains_node(&self, node_name: &str) -> bool {
        self.nodes.iter().any(|node| node.node_name == node_name)
    }
}

/// Turns a plan into runs with node lists.
///
/// Every module location is paired with the capacity of its bitstream.
pub fn get_queue_of_resulting_runs(
    plan: &[Run],
    hw_library: &HwLibrary,
) -> Result<Vec<ScheduledRun>, SchedulerError> {
    let mut runs = Vec::with_capacity(plan.len());
    for run in plan.iter() {
        let mut nodes: Vec<RunNode> = Vec::new();
        for (i, module) in run.iter().enumerate() {
            let bitstream = common::require(
                hw_library.get_bitstream(module.operation, &module.bitstream),
                &format!("Bitstream {} of {}", module.bitstream, module.operation),
            )?;
            match nodes.iter_mut().find(|n| n.node_name == module.node_name) {
                Some(node) => {
                    node.module_locations.push(i + 1);
                    node.module_parameters.push(bitstream.capacity.clone());
                }
                None => nodes.push(RunNode {
                    node_name: module.node_name.clone(),
                    module_locations: vec![i + 1],
                    module_parameters: vec![bitstream.capacity.clone()],
                }),
            }
        }
        runs.push(ScheduledRun {
            modules: run.clone(),
            nodes,
        });
    }
    Ok(runs)
}

/// Input of a later node fed from memory written by an earlier run.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ReuseTarget {
    pub node: String,
    pub stream: i32,
    /// The target runs right after the producer, the memory block can be handed over.
    pub reuse_memory: bool,
}

/// Per node and output stream the inputs reading the written table.
pub type NodeLinks = BTreeMap<String, BTreeMap<i32, Vec<ReuseTarget>>>;

fn next_run_with(runs: &[ScheduledRun], after: usize, node_name: &str) -> Option<usize> {
    runs.iter()
        .enumerate()
        .skip(after + 1)
        .find(|(_, run)| run.contains_node(node_name))
        .map(|(i, _)| i)
}

/// Follows a link past nodes that got skipped without a module.
fn resolve_consumer(
    graph: &SchedulingGraph,
    runs: &[ScheduledRun],
    skipped_nodes: &BTreeSet<String>,
    node: &str,
    stream: i32,
) -> Option<(String, i32)> {
    let mut current = (node.to_string(), stream);
    let mut visited = BTreeSet::new();
    while skipped_nodes.contains(&current.0)
        && !runs.iter().any(|run| run.contains_node(&current.0))
        && visited.insert(current.0.clone())
    {
        let next = graph.get_node(&current.0)?.after_nodes.first()?;
        if next.is_boundary() {
            return None;
        }
        current = (next.node.clone(), next.stream);
    }
    Some(current)
}

/// Records for every run which outputs leave it and who reads them later.
///
/// A node that continues in a later run links its output back to itself.
/// Otherwise every consumer outside of the run gets a link, flagged for
/// memory reuse when it runs in the next run.
///
/// # Arguments
///
/// * `runs` - Runs in execution order.
/// * `graph` - Graph as it was before preprocessing.
/// * `skipped_nodes` - Processed nodes that never got a module.
pub fn link_peripheral_nodes_from_given_runs(
    runs: &[ScheduledRun],
    graph: &SchedulingGraph,
    skipped_nodes: &BTreeSet<String>,
) -> Result<Vec<NodeLinks>, SchedulerError> {
    let mut all_links = Vec::new();
    for (run_index, run) in runs.iter().enumerate() {
        let mut links = NodeLinks::new();
        for run_node in run.nodes.iter() {
            let name = &run_node.node_name;
            if let Some(next) = next_run_with(runs, run_index, name) {
                links.entry(name.clone()).or_default().insert(
                    0,
                    vec![ReuseTarget {
                        node: name.clone(),
                        stream: 0,
                        reuse_memory: next == run_index + 1,
                    }],
                );
                continue;
            }
            let node = graph.node(name)?;
            for (output, link) in node.after_nodes.iter().enumerate() {
                if link.is_boundary() {
                    continue;
                }
                let (consumer, stream) =
                    match resolve_consumer(graph, runs, skipped_nodes, &link.node, link.stream) {
                        Some(target) => target,
                        None => continue,
                    };
                if run.contains_node(&consumer) {
                    continue;
                }
                let reuse_memory = next_run_with(runs, run_index, &consumer) == Some(run_index + 1);
                links
                    .entry(name.clone())
                    .or_default()
                    .entry(output as i32)
                    .or_default()
                    .push(ReuseTarget {
                        node: consumer,
                        stream,
                        reuse_memory,
                    });
            }
        }
        all_links.push(links);
    }
    Ok(all_links)
}

/// Writes measured output tables into the input tables of the linked consumers.
///
/// # Arguments
///
/// * `results` - Per node the tables it produced on each output stream.
/// * `links` - Links of the executed run.
/// * `graph` - Graph binding consumer inputs to table names.
/// * `tables` - Table metadata to update.
pub fn update_table_data(
    results: &BTreeMap<String, Vec<TableMetadata>>,
    links: &NodeLinks,
    graph: &SchedulingGraph,
    tables: &mut Tables,
) -> Result<(), SchedulerError> {
    for (node_name, streams) in links.iter() {
        for (stream, targets) in streams.iter() {
            let result = match results
                .get(node_name)
                .and_then(|outputs| outputs.get(*stream as usize))
            {
                Some(result) => result,
                None => continue,
            };
            for target in targets {
                let consumer = match graph.get_node(&target.node) {
                    Some(consumer) => consumer,
                    None => continue,
                };
                let table_name = common::require(
                    consumer.data_tables.get(target.stream as usize),
                    &format!("Input {} of {}", target.stream, target.node),
                )?;
                if table_name.is_empty() {
                    continue;
                }
                let table = tables
                    .entry(table_name.clone())
                    .or_insert_with(|| result.clone());
                table.record_size = result.record_size;
                table.record_count = result.record_count;
                table.sorted_status = result.sorted_status.clone();
                table.crop_sorted_status();
                debug!(
                    "Table {} now holds {} records",
                    table_name, table.record_count
                );
            }
        }
    }
    Ok(())
}
