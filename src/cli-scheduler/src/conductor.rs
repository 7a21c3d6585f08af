use common::{HwLibrary, ScheduledModule, SchedulerConfig, SchedulerError, SchedulingGraph, Tables};
use scheduler::{BenchmarkStats, ElasticResourceScheduler, SchedulingRequest, SchedulingResult};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Drives scheduling rounds until every node of a query got scheduled.
pub struct Conductor {
    pub scheduler: ElasticResourceScheduler,
    /// Modules left on the fabric by the previous round.
    pub configuration: Vec<ScheduledModule>,
    /// Set while benchmarking.
    pub stats: Option<BenchmarkStats>,
}

impl Conductor {
    pub fn new(
        config: SchedulerConfig,
        hw_library: HwLibrary,
        benchmark: bool,
    ) -> Result<Self, SchedulerError> {
        let conductor = Conductor {
            scheduler: ElasticResourceScheduler::new(config, hw_library)?,
            configuration: Vec::new(),
            stats: if benchmark {
                Some(BenchmarkStats::default())
            } else {
                None
            },
        };
        Ok(conductor)
    }

    /// Schedules a whole query graph.
    ///
    /// Every round continues from the fabric configuration of the round before.
    ///
    /// # Arguments
    ///
    /// * `graph` - Query graph.
    /// * `tables` - Metadata of the input tables.
    /// * `first_nodes` - Nodes that have to start a new run in the first round.
    pub fn run_query(
        &mut self,
        graph: SchedulingGraph,
        tables: Tables,
        first_nodes: BTreeSet<String>,
    ) -> Result<Vec<SchedulingResult>, SchedulerError> {
        let node_count = graph.node_count();
        let mut request = SchedulingRequest::new(graph, tables);
        request.first_nodes = first_nodes;
        let mut results: Vec<SchedulingResult> = Vec::new();
        loop {
            info!("Processing round {} of query", results.len() + 1);
            let processed_before = request.processed_nodes.len();
            let result = match self.stats.as_mut() {
                Some(stats) => {
                    self.scheduler
                        .benchmark_scheduling(request, &self.configuration, stats)?
                }
                None => self
                    .scheduler
                    .get_next_set_of_runs(request, &self.configuration)?,
            };
            if result.timed_out {
                warn!("Round {} hit the time limit", results.len() + 1);
            }
            self.configuration = result.resulting_configuration.clone();
            if result.is_finished() {
                results.push(result);
                break;
            }
            if result.processed_nodes.len() <= processed_before {
                return Err(SchedulerError::SchedulerError(format!(
                    "Round {} scheduled no nodes, {} of {} remain",
                    results.len() + 1,
                    result.remaining_nodes.len(),
                    node_count
                )));
            }
            request = result.next_request(BTreeSet::new());
            results.push(result);
        }
        Ok(results)
    }
}

/// Renders the runs, loads and passthrough modules of every round.
pub fn format_results(results: &[SchedulingResult]) -> String {
    let mut out = String::new();
    let mut run_number = 0;
    for (round, result) in results.iter().enumerate() {
        let _ = writeln!(
            out,
            "Round {}: {} runs, {} plans, timed out: {}",
            round + 1,
            result.runs.len(),
            result.plan_count,
            result.timed_out
        );
        for (run, loads) in result.runs.iter().zip(result.bitstream_loads.iter()) {
            run_number += 1;
            let _ = writeln!(out, "  Run {}", run_number);
            for module in run.modules.iter() {
                let _ = writeln!(out, "    {}", module);
            }
            let _ = writeln!(out, "    load: [{}]", loads.bitstreams_to_load.join(", "));
            let passthrough: Vec<String> = loads
                .passthrough_modules
                .iter()
                .map(|(op, passthrough)| format!("{}:{}", op, passthrough))
                .collect();
            let _ = writeln!(out, "    modules: [{}]", passthrough.join(", "));
        }
    }
    out
}
