#[macro_use]
extern crate log;
use env_logger::Env;
extern crate clap;
use clap::{App, Arg};

use common::{HwLibrary, SchedulerConfig, SchedulerError, SchedulingGraph};
use std::collections::BTreeSet;
use std::fs;
use std::process;

use crate::conductor::Conductor;

mod conductor;
mod csv_utils;

/// Reads the files named on the command line and schedules the query.
fn run(matches: &clap::ArgMatches) -> Result<(), SchedulerError> {
    let mut config = match matches.value_of("config") {
        Some(path) => SchedulerConfig::from_json(&fs::read_to_string(path)?)?,
        None => SchedulerConfig::default(),
    };
    if let Some(heuristic) = matches.value_of("heuristic") {
        config.heuristic_choice = heuristic.parse::<usize>().map_err(|_| {
            SchedulerError::ValidationError(format!("Bad heuristic index {}", heuristic))
        })?;
    }
    if let Some(limit) = matches.value_of("time_limit") {
        config.time_limit_seconds = limit.parse::<f64>().map_err(|_| {
            SchedulerError::ValidationError(format!("Bad time limit {}", limit))
        })?;
    }
    let first_nodes: BTreeSet<String> = matches
        .value_of("first_nodes")
        .map(|nodes| {
            nodes
                .split(',')
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let graph_path = common::require(matches.value_of("graph"), "Argument graph")?;
    let library_path = common::require(matches.value_of("library"), "Argument library")?;
    let tables_path = common::require(matches.value_of("tables"), "Argument tables")?;
    let graph = SchedulingGraph::from_json(&fs::read_to_string(graph_path)?)?;
    let hw_library = HwLibrary::from_json(&fs::read_to_string(library_path)?)?;
    let tables = csv_utils::import_tables(tables_path)?;
    info!(
        "Scheduling {} nodes on {} columns with heuristic {}",
        graph.node_count(),
        hw_library.column_count(),
        config.heuristic_choice
    );

    let benchmark_path = matches.value_of("benchmark");
    let mut conductor = Conductor::new(config, hw_library, benchmark_path.is_some())?;
    let results = conductor.run_query(graph, tables, first_nodes)?;
    print!("{}", conductor::format_results(&results));
    println!(
        "Timed out: {}",
        results.iter().any(|result| result.timed_out)
    );

    if let (Some(path), Some(stats)) = (benchmark_path, conductor.stats.as_ref()) {
        fs::write(path, stats.to_json()?)?;
        info!("Benchmark results written to {}", path);
    }
    Ok(())
}

/// Entry point for the scheduler.
///
/// Schedules a query graph round by round and prints the resulting runs.
fn main() {
    // Configure log environment
    env_logger::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name("graph")
                .short("g")
                .long("graph")
                .value_name("FILE")
                .help("Query graph json")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("library")
                .short("l")
                .long("library")
                .value_name("FILE")
                .help("PR bitstream library json")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("tables")
                .short("t")
                .long("tables")
                .value_name("FILE")
                .help("Table metadata, csv or json")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Sets a custom config file")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("heuristic")
                .long("heuristic")
                .value_name("N")
                .help("Placement heuristic index")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("time_limit")
                .long("time-limit")
                .value_name("SECS")
                .help("Search time limit, negative to estimate it")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("first_nodes")
                .long("first-nodes")
                .value_name("NODES")
                .help("Comma separated nodes that start a new run")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("benchmark")
                .short("b")
                .long("benchmark")
                .value_name("FILE")
                .help("Writes scheduling statistics to the file")
                .takes_value(true),
        )
        .get_matches();

    if let Err(e) = run(&matches) {
        error!("{}", e);
        process::exit(1);
    }
}
