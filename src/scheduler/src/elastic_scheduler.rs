use crate::accelerator_library::{AcceleratorLibrary, DefaultAcceleratorLibrary};
use crate::bitstream_diff::{get_pr_bitstreams_to_load_with_passthrough_modules, BitstreamLoadPlan};
use crate::heuristics::{default_heuristics, HeuristicChoice};
use crate::placement::{PlacementSearch, SearchOutcome, SearchStats};
use crate::plan::Run;
use crate::plan_evaluator::choose_best_plan;
use crate::pre_scheduling::PreSchedulingProcessor;
use crate::run_linker::{get_queue_of_resulting_runs, link_peripheral_nodes_from_given_runs, NodeLinks, ScheduledRun};
use common::{
    HwLibrary, OperationType, ScheduledModule, SchedulerConfig, SchedulerError, SchedulingGraph,
    Tables, MAX_TIME_LIMIT_SECONDS,
};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

lazy_static! {
    /// Configuration bytes of the largest module of each operation.
    static ref DEFAULT_OPERATION_COSTS: BTreeMap<OperationType, f64> = {
        let mut costs = BTreeMap::new();
        costs.insert(OperationType::Filter, 315_456.0);
        costs.insert(OperationType::LinearSort, 770_784.0);
        costs.insert(OperationType::MergeSort, 770_784.0);
        costs.insert(OperationType::Join, 462_768.0);
        costs.insert(OperationType::Addition, 315_456.0);
        costs.insert(OperationType::Multiplication, 916_608.0);
        costs.insert(OperationType::AggregationSum, 229_152.0);
        costs
    };
}

/// Nodes to schedule in one round.
#[derive(Clone, Debug)]
pub struct SchedulingRequest {
    pub graph: SchedulingGraph,
    pub tables: Tables,
    /// Nodes to start from, derived from the graph if empty.
    pub available_nodes: BTreeSet<String>,
    pub processed_nodes: BTreeSet<String>,
    /// Nodes that may not share a run with their producers.
    pub first_nodes: BTreeSet<String>,
}

impl SchedulingRequest {
    pub fn new(graph: SchedulingGraph, tables: Tables) -> Self {
        SchedulingRequest {
            graph,
            tables,
            available_nodes: BTreeSet::new(),
            processed_nodes: BTreeSet::new(),
            first_nodes: BTreeSet::new(),
        }
    }
}

/// Runs chosen in one round plus what is needed to schedule the rest.
#[derive(Debug)]
pub struct SchedulingResult {
    pub runs: Vec<ScheduledRun>,
    /// Memory links of every run.
    pub reuse_links: Vec<NodeLinks>,
    /// Bitstreams to write before every run.
    pub bitstream_loads: Vec<BitstreamLoadPlan>,
    /// Modules on the fabric after the last run.
    pub resulting_configuration: Run,
    pub processed_nodes: BTreeSet<String>,
    /// Nodes left for the next round.
    pub remaining_nodes: BTreeSet<String>,
    pub graph: SchedulingGraph,
    pub tables: Tables,
    pub timed_out: bool,
    pub stats: SearchStats,
    pub plan_count: usize,
    pub data_amount: i64,
    pub configuration_amount: f64,
}

impl SchedulingResult {
    /// True once every node of the query has been scheduled.
    pub fn is_finished(&self) -> bool {
        self.remaining_nodes.is_empty() && self.graph.is_empty()
    }

    /// Request for the nodes this round left behind.
    pub fn next_request(&self, first_nodes: BTreeSet<String>) -> SchedulingRequest {
        SchedulingRequest {
            graph: self.graph.clone(),
            tables: self.tables.clone(),
            available_nodes: self.remaining_nodes.clone(),
            processed_nodes: self.processed_nodes.clone(),
            first_nodes,
        }
    }
}

/// Totals over all benchmarked scheduling rounds, times in seconds.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct BenchmarkStats {
    pub schedule_count: u64,
    pub discarded_placements: u64,
    pub placed_nodes: u64,
    pub plan_count: u64,
    pub timeouts: u64,
    pub run_count: u64,
    pub data_amount: i64,
    pub configuration_amount: f64,
    pub pre_process_time: f64,
    pub schedule_time: f64,
    pub cost_eval_time: f64,
    pub overall_time: f64,
}

impl BenchmarkStats {
    pub fn to_json(&self) -> Result<String, SchedulerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

struct Timings {
    pre_process: Duration,
    schedule: Duration,
    cost_eval: Duration,
    overall: Duration,
}

/// Schedules query nodes onto the PR fabric.
pub struct ElasticResourceScheduler {
    config: SchedulerConfig,
    hw_library: HwLibrary,
    library: Box<dyn AcceleratorLibrary>,
    heuristic: HeuristicChoice,
}

impl ElasticResourceScheduler {
    /// Creates a scheduler with the stock operation rules.
    ///
    /// # Arguments
    ///
    /// * `config` - Scheduler config, checked against the library.
    /// * `hw_library` - Catalog of PR bitstreams.
    pub fn new(config: SchedulerConfig, hw_library: HwLibrary) -> Result<Self, SchedulerError> {
        Self::with_library(config, hw_library, Box::new(DefaultAcceleratorLibrary::new()))
    }

    /// Creates a scheduler with custom operation rules.
    pub fn with_library(
        config: SchedulerConfig,
        hw_library: HwLibrary,
        library: Box<dyn AcceleratorLibrary>,
    ) -> Result<Self, SchedulerError> {
        let heuristics = default_heuristics();
        config.validate(hw_library.column_count(), heuristics.len())?;
        let heuristic = heuristics[config.heuristic_choice].clone();
        Ok(ElasticResourceScheduler {
            config,
            hw_library,
            library,
            heuristic,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn hw_library(&self) -> &HwLibrary {
        &self.hw_library
    }

    /// Annotates the graph and drops nodes with nothing to do.
    ///
    /// Dropped nodes are added to `processed_nodes`.
    pub fn preprocess(
        &self,
        graph: &mut SchedulingGraph,
        tables: &mut Tables,
        available_nodes: &mut BTreeSet<String>,
        processed_nodes: &mut BTreeSet<String>,
    ) -> Result<(), SchedulerError> {
        let processor = PreSchedulingProcessor::new(&self.hw_library, self.library.as_ref());
        let removed = processor.add_satisfying_bitstream_locations_to_graph(
            graph,
            tables,
            available_nodes,
            processed_nodes,
        )?;
        if !removed.is_empty() {
            debug!("Preprocessing removed {:?}", removed);
        }
        processed_nodes.extend(removed);
        Ok(())
    }

    /// Estimated seconds to configure every node once and stream all bound tables.
    pub fn calculate_time_limit(
        &self,
        graph: &SchedulingGraph,
        tables: &Tables,
    ) -> Result<f64, SchedulerError> {
        let mut config_size = 0.0;
        let mut table_sizes = 0;
        for (_, node) in graph.iter() {
            config_size += self
                .config
                .operation_cost(node.operation, &DEFAULT_OPERATION_COSTS);
            for table_name in node.data_tables.iter().filter(|name| !name.is_empty()) {
                table_sizes += common::require(
                    tables.get(table_name),
                    &format!("Table {}", table_name),
                )?
                .size_in_bytes();
            }
        }
        Ok(config_size / self.config.configuration_speed
            + table_sizes as f64 / self.config.streaming_speed)
    }

    /// Searches all plans for a preprocessed graph.
    ///
    /// # Arguments
    ///
    /// * `available_nodes` - Nodes that can be scheduled now.
    /// * `processed_nodes` - Nodes that are already scheduled.
    /// * `graph` - Preprocessed graph.
    /// * `tables` - Table metadata.
    /// * `first_nodes` - Nodes that may not share a run with their producers.
    pub fn schedule_and_get_all_plans(
        &self,
        available_nodes: BTreeSet<String>,
        processed_nodes: BTreeSet<String>,
        graph: SchedulingGraph,
        tables: Tables,
        first_nodes: BTreeSet<String>,
    ) -> Result<SearchOutcome, SchedulerError> {
        let mut time_limit = self.config.time_limit_seconds;
        if time_limit < 0.0 {
            time_limit = self.calculate_time_limit(&graph, &tables)?;
        }
        if !time_limit.is_finite() || time_limit > MAX_TIME_LIMIT_SECONDS {
            return Err(SchedulerError::ValidationError(format!(
                "Search time limit {} outside of the supported range",
                time_limit
            )));
        }
        debug!("Search time limit {:.6}s", time_limit);
        let search = PlacementSearch::new(
            &self.hw_library,
            self.library.as_ref(),
            self.heuristic.clone(),
            first_nodes,
            &graph,
            self.config.reduce_single_runs,
            self.config.use_max_runs_cap,
        );
        search.run(
            available_nodes,
            processed_nodes,
            graph,
            tables,
            Duration::from_secs_f64(time_limit.max(0.0)),
        )
    }

    /// Schedules the next set of runs.
    ///
    /// # Arguments
    ///
    /// * `request` - Graph, tables and node sets of this round.
    /// * `current_configuration` - Modules on the fabric before the first run.
    pub fn get_next_set_of_runs(
        &self,
        request: SchedulingRequest,
        current_configuration: &[ScheduledModule],
    ) -> Result<SchedulingResult, SchedulerError> {
        let (result, _) = self.schedule_round(request, current_configuration)?;
        Ok(result)
    }

    /// Schedules the next set of runs and adds the round to `stats`.
    pub fn benchmark_scheduling(
        &self,
        request: SchedulingRequest,
        current_configuration: &[ScheduledModule],
        stats: &mut BenchmarkStats,
    ) -> Result<SchedulingResult, SchedulerError> {
        let (result, timings) = self.schedule_round(request, current_configuration)?;
        stats.schedule_count += 1;
        stats.discarded_placements += result.stats.discarded_placements;
        stats.placed_nodes += result.stats.placed_nodes;
        stats.plan_count += result.plan_count as u64;
        if result.timed_out {
            stats.timeouts += 1;
        }
        stats.run_count += result.runs.len() as u64;
        stats.data_amount += result.data_amount;
        stats.configuration_amount += result.configuration_amount;
        stats.pre_process_time += timings.pre_process.as_secs_f64();
        stats.schedule_time += timings.schedule.as_secs_f64();
        stats.cost_eval_time += timings.cost_eval.as_secs_f64();
        stats.overall_time += timings.overall.as_secs_f64();
        Ok(result)
    }

    fn schedule_round(
        &self,
        request: SchedulingRequest,
        current_configuration: &[ScheduledModule],
    ) -> Result<(SchedulingResult, Timings), SchedulerError> {
        let start = Instant::now();
        request.graph.validate()?;
        let SchedulingRequest {
            mut graph,
            mut tables,
            mut available_nodes,
            mut processed_nodes,
            first_nodes,
        } = request;
        let wiring = graph.clone();
        if available_nodes.is_empty() {
            available_nodes = graph.starting_nodes(&processed_nodes);
        }

        info!("Scheduling preprocessing");
        self.preprocess(
            &mut graph,
            &mut tables,
            &mut available_nodes,
            &mut processed_nodes,
        )?;
        let pre_process = start.elapsed();

        let outcome = self.schedule_and_get_all_plans(
            available_nodes,
            processed_nodes,
            graph,
            tables,
            first_nodes,
        )?;
        info!(
            "Main scheduling loop time = {}[milliseconds]",
            outcome.elapsed.as_millis()
        );
        info!("Plan count: {}", outcome.plans.len());
        if outcome.plans.is_empty() {
            return Err(SchedulerError::NoPlanError(String::from(
                "Time limit hit before any plan was found",
            )));
        }
        let plan_count = outcome.plans.len();
        let timed_out = outcome.timed_out;
        let search_stats = outcome.stats;

        let cost_eval_start = Instant::now();
        let best = choose_best_plan(&self.config, outcome.plans, current_configuration)?;
        let cost_eval = cost_eval_start.elapsed();
        info!(
            "Chose plan {} with {} runs",
            best.plan_index,
            best.plan.len()
        );

        let runs = get_queue_of_resulting_runs(&best.plan, &self.hw_library)?;
        let skipped_nodes: BTreeSet<String> = best
            .data
            .processed_nodes
            .iter()
            .filter(|name| !runs.iter().any(|run| run.contains_node(name)))
            .cloned()
            .collect();
        let reuse_links = link_peripheral_nodes_from_given_runs(&runs, &wiring, &skipped_nodes)?;
        let mut configuration = current_configuration.to_vec();
        let mut bitstream_loads = Vec::new();
        for run in runs.iter() {
            bitstream_loads.push(get_pr_bitstreams_to_load_with_passthrough_modules(
                &self.config,
                &mut configuration,
                &run.modules,
            )?);
        }

        let overall = start.elapsed();
        info!("Total scheduling time = {}[milliseconds]", overall.as_millis());
        let result = SchedulingResult {
            runs,
            reuse_links,
            bitstream_loads,
            resulting_configuration: configuration,
            processed_nodes: best.data.processed_nodes,
            remaining_nodes: best.data.available_nodes,
            graph: best.data.graph,
            tables: best.data.tables,
            timed_out,
            stats: search_stats,
            plan_count,
            data_amount: best.data_amount,
            configuration_amount: best.configuration_amount,
        };
        let timings = Timings {
            pre_process,
            schedule: outcome.elapsed,
            cost_eval,
            overall,
        };
        Ok((result, timings))
    }
}
