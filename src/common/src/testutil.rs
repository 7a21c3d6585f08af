use crate::{
    HwLibrary, OperationType, PRModule, SchedulingGraph, SchedulingNode, SortedStatus,
    StreamLink, TableMetadata, Tables,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Name of the table the first node of a generated chain reads.
pub const INPUT_TABLE: &str = "input";

/// Builds a linear chain of nodes, the first reading `input_table`.
///
/// # Arguments
///
/// * `nodes` - Name, operation and capacity requirement of every node in chain order.
/// * `input_table` - Table bound to the first node.
pub fn chain_graph(nodes: &[(&str, OperationType, Vec<i64>)], input_table: &str) -> SchedulingGraph {
    let mut graph = SchedulingGraph::new();
    for (i, (name, op, capacity)) in nodes.iter().enumerate() {
        let (before, table) = if i == 0 {
            (StreamLink::boundary(), input_table.to_string())
        } else {
            (StreamLink::new(nodes[i - 1].0, 0), String::new())
        };
        let after = match nodes.get(i + 1) {
            Some((next, _, _)) => StreamLink::new(next, 0),
            None => StreamLink::boundary(),
        };
        graph.add_node(
            name,
            SchedulingNode::new(*op, vec![before], vec![after], vec![table], capacity.clone()),
        );
    }
    graph
}

/// Builds a catalog where every bitstream may start on any column it fits.
///
/// # Arguments
///
/// * `column_count` - Number of columns on the fabric.
/// * `modules` - Operation, bitstream name, capacity and length of each bitstream.
pub fn uniform_library(
    column_count: usize,
    modules: &[(OperationType, &str, Vec<i64>, usize)],
) -> HwLibrary {
    let mut operations: BTreeMap<OperationType, BTreeMap<String, PRModule>> = BTreeMap::new();
    for (op, name, capacity, length) in modules {
        let locations = (0..column_count)
            .filter(|start| start + length <= column_count)
            .collect();
        operations.entry(*op).or_insert_with(BTreeMap::new).insert(
            name.to_string(),
            PRModule {
                capacity: capacity.clone(),
                locations,
                length: *length,
                resource_string: "M".repeat(*length),
                is_backwards: false,
            },
        );
    }
    HwLibrary::new(column_count, operations).unwrap()
}

/// Catalog with a couple of variants per operation used by randomized tests and benchmarks.
pub fn mixed_library(column_count: usize) -> HwLibrary {
    uniform_library(
        column_count,
        &[
            (OperationType::Filter, "filter_small", vec![4, 2], 1),
            (OperationType::Filter, "filter_large", vec![8, 4], 2),
            (OperationType::LinearSort, "linear_512", vec![512], 1),
            (OperationType::LinearSort, "linear_1024", vec![1024], 2),
            (OperationType::MergeSort, "merge_32", vec![32], 1),
            (OperationType::MergeSort, "merge_64", vec![64], 2),
            (OperationType::Join, "join", vec![1], 1),
            (OperationType::Addition, "addition", vec![1], 1),
            (OperationType::Multiplication, "multiplication", vec![1], 2),
            (OperationType::AggregationSum, "aggregation", vec![1], 1),
        ],
    )
}

/// One unsorted table.
pub fn single_table(name: &str, record_size: i64, record_count: i64) -> Tables {
    let mut tables = Tables::new();
    tables.insert(
        name.to_string(),
        TableMetadata::new(record_size, record_count, SortedStatus::Unsorted),
    );
    tables
}

/// Filter `a` on table `ta` joined with table `tb` in node `j`.
///
/// The second join input comes from filter `b`, or from a node outside of the
/// graph when `external_second_input` is set. Returns the graph and both
/// tables sorted.
pub fn join_graph(external_second_input: bool) -> (SchedulingGraph, Tables) {
    let mut graph = SchedulingGraph::new();
    graph.add_node(
        "a",
        SchedulingNode::new(
            OperationType::Filter,
            vec![StreamLink::boundary()],
            vec![StreamLink::new("j", 0)],
            vec![String::from("ta")],
            vec![1, 1],
        ),
    );
    let (second, second_table) = if external_second_input {
        (StreamLink::new("ext", 0), String::from("tb"))
    } else {
        graph.add_node(
            "b",
            SchedulingNode::new(
                OperationType::Filter,
                vec![StreamLink::boundary()],
                vec![StreamLink::new("j", 1)],
                vec![String::from("tb")],
                vec![1, 1],
            ),
        );
        (StreamLink::new("b", 0), String::new())
    };
    graph.add_node(
        "j",
        SchedulingNode::new(
            OperationType::Join,
            vec![StreamLink::new("a", 0), second],
            vec![StreamLink::boundary()],
            vec![String::new(), second_table],
            vec![1],
        ),
    );
    let mut tables = Tables::new();
    tables.insert(
        String::from("ta"),
        TableMetadata::new(4, 100, SortedStatus::FullySorted(100)),
    );
    tables.insert(
        String::from("tb"),
        TableMetadata::new(4, 50, SortedStatus::FullySorted(50)),
    );
    (graph, tables)
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Generates a random chain that `mixed_library` can schedule.
///
/// # Arguments
///
/// * `rng` - Seeded generator.
/// * `length` - Number of nodes.
pub fn random_chain(rng: &mut StdRng, length: usize) -> (SchedulingGraph, Tables) {
    let choices = [
        OperationType::Filter,
        OperationType::LinearSort,
        OperationType::MergeSort,
        OperationType::Addition,
        OperationType::Multiplication,
        OperationType::AggregationSum,
    ];
    let names: Vec<String> = (0..length).map(|i| format!("node_{}", i)).collect();
    let mut nodes = Vec::new();
    for name in names.iter() {
        let op = choices[rng.gen_range(0..choices.len())];
        let capacity = match op {
            OperationType::Filter => vec![rng.gen_range(1..=8), rng.gen_range(1..=4)],
            OperationType::LinearSort | OperationType::MergeSort => vec![],
            _ => vec![1],
        };
        nodes.push((name.as_str(), op, capacity));
    }
    let graph = chain_graph(&nodes, INPUT_TABLE);
    let tables = single_table(INPUT_TABLE, rng.gen_range(1..=8), rng.gen_range(10..=2000));
    (graph, tables)
}
