use crate::plan::{ExecutionPlan, PlanData, PlanSet, Run};
use common::{PlanSelection, ScheduledModule, SchedulerConfig, SchedulerError};
use std::collections::BTreeSet;

/// Plan picked by the evaluator.
#[derive(Debug)]
pub struct BestPlan {
    /// Position of the plan in discovery order.
    pub plan_index: usize,
    pub plan: ExecutionPlan,
    pub data: PlanData,
    /// Modules left on the fabric after the last run.
    pub resulting_configuration: Run,
    /// Bytes streamed by the plan.
    pub data_amount: i64,
    /// Configuration bytes written by the plan.
    pub configuration_amount: f64,
}

/// Configuration bytes written to go from `current` to `next`.
///
/// Modules on the same columns with the same bitstream stay. Every column of
/// a module that has to be loaded or cleared gets written once. Returns the
/// written bytes and the configuration left on the fabric.
///
/// # Arguments
///
/// * `config` - Column types and their cost.
/// * `current` - Modules on the fabric.
/// * `next` - Modules of the next run.
pub fn find_config_written_for_configuration(
    config: &SchedulerConfig,
    current: &[ScheduledModule],
    next: &[ScheduledModule],
) -> Result<(f64, Run), SchedulerError> {
    let mut kept_current = vec![false; current.len()];
    let mut reduced_next = Vec::new();
    for next_module in next {
        let matching = current
            .iter()
            .enumerate()
            .find(|(i, module)| !kept_current[*i] && module.is_same_placement(next_module));
        match matching {
            Some((i, _)) => kept_current[i] = true,
            None => reduced_next.push(next_module.clone()),
        }
    }

    let mut written_columns = BTreeSet::new();
    let reduced_current = current
        .iter()
        .zip(kept_current.iter())
        .filter(|(_, kept)| !**kept)
        .map(|(module, _)| module);
    for module in reduced_next.iter().chain(reduced_current) {
        written_columns.extend(module.start()..=module.end());
    }
    let mut written = 0.0;
    for column in written_columns {
        written += config.column_cost(column)?;
    }

    let mut left_over: Run = current
        .iter()
        .zip(kept_current.iter())
        .filter(|(_, kept)| **kept)
        .map(|(module, _)| module.clone())
        .collect();
    left_over.extend(reduced_next);
    Ok((written, left_over))
}

/// Configuration bytes written over all runs of a plan.
pub fn find_config_written(
    config: &SchedulerConfig,
    plan: &[Run],
    starting_configuration: &[ScheduledModule],
) -> Result<(f64, Run), SchedulerError> {
    let mut total = 0.0;
    let mut configuration = starting_configuration.to_vec();
    for run in plan {
        let (written, next_configuration) =
            find_config_written_for_configuration(config, &configuration, run)?;
        total += written;
        configuration = next_configuration;
    }
    Ok((total, configuration))
}

/// Index of the plan with the lowest streaming plus configuration time.
fn lowest_runtime(config: &SchedulerConfig, streamed: &[i64], written: &[f64]) -> usize {
    let mut best = 0;
    let mut best_runtime = f64::INFINITY;
    for (i, (data, frames)) in streamed.iter().zip(written.iter()).enumerate() {
        let runtime =
            *data as f64 / config.streaming_speed + frames / config.configuration_speed;
        if runtime < best_runtime {
            best = i;
            best_runtime = runtime;
        }
    }
    best
}

/// Index of the plan with the best weighted utility and configuration score.
fn max_utility_per_frame(config: &SchedulerConfig, run_counts: &[usize], written: &[f64]) -> usize {
    let utilities: Vec<f64> = run_counts
        .iter()
        .map(|runs| 1.0 / (*runs).max(1) as f64)
        .collect();
    // Plans writing nothing would divide by zero.
    let written: Vec<f64> = written
        .iter()
        .map(|w| if *w == 0.0 { 0.1 } else { *w })
        .collect();
    let minimised_written: Vec<f64> = written.iter().map(|w| 1.0 / w).collect();
    let per_frame: Vec<f64> = utilities
        .iter()
        .zip(written.iter())
        .map(|(u, w)| u / w)
        .collect();

    let max_of = |values: &[f64]| values.iter().cloned().fold(f64::MIN, f64::max);
    let max_utility = max_of(&utilities);
    let max_frames = max_of(&minimised_written);
    let max_ratio = max_of(&per_frame);

    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for i in 0..utilities.len() {
        let score = utilities[i] / max_utility * config.utility_scaler
            + minimised_written[i] / max_frames * config.config_written_scaler
            + per_frame[i] / max_ratio * config.utility_per_frame_scaler;
        if score > best_score {
            best = i;
            best_score = score;
        }
    }
    best
}

/// Evaluates every plan and returns the best one under the configured selection.
///
/// # Arguments
///
/// * `config` - Selection mode, speeds and weights.
/// * `plans` - Plans found by the search.
/// * `starting_configuration` - Modules on the fabric before the first run.
pub fn choose_best_plan(
    config: &SchedulerConfig,
    plans: PlanSet,
    starting_configuration: &[ScheduledModule],
) -> Result<BestPlan, SchedulerError> {
    if plans.is_empty() {
        return Err(SchedulerError::NoPlanError(String::from(
            "No plans to choose from",
        )));
    }
    let mut streamed = Vec::new();
    let mut written = Vec::new();
    let mut run_counts = Vec::new();
    let mut configurations = Vec::new();
    for (plan, data) in plans.iter() {
        let (frames, configuration) = find_config_written(config, plan, starting_configuration)?;
        streamed.push(data.streamed_data_size);
        written.push(frames);
        run_counts.push(plan.len());
        configurations.push(configuration);
    }
    let plan_index = match config.plan_selection {
        PlanSelection::LowestRuntime => lowest_runtime(config, &streamed, &written),
        PlanSelection::MaxUtilityPerFrame => max_utility_per_frame(config, &run_counts, &written),
    };
    debug!(
        "Plan {} of {} chosen with {} runs",
        plan_index,
        plans.len(),
        run_counts[plan_index]
    );
    let (plan, data) = common::require(plans.take(plan_index), "Chosen plan")?;
    Ok(BestPlan {
        plan_index,
        plan,
        data,
        resulting_configuration: configurations.swap_remove(plan_index),
        data_amount: streamed[plan_index],
        configuration_amount: written[plan_index],
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use common::{OperationType, SchedulingGraph, Tables};

    fn module(node: &str, bitstream: &str, position: (usize, usize)) -> ScheduledModule {
        ScheduledModule::new(node, OperationType::Filter, bitstream, position)
    }

    fn data(streamed: i64) -> PlanData {
        PlanData {
            available_nodes: BTreeSet::new(),
            processed_nodes: BTreeSet::new(),
            graph: SchedulingGraph::new(),
            tables: Tables::new(),
            streamed_data_size: streamed,
        }
    }

    #[test]
    fn test_config_written_for_configuration() {
        let config = SchedulerConfig::default();
        let m = config.column_cost(0).unwrap();
        let d = config.column_cost(2).unwrap();
        let current = vec![module("old", "a", (0, 1)), module("old", "b", (2, 2))];
        let next = vec![module("new", "a", (0, 1)), module("new", "c", (3, 3))];
        let (written, left_over) =
            find_config_written_for_configuration(&config, &current, &next).unwrap();
        // Column 2 gets cleared, column 3 loaded, columns 0 and 1 stay.
        assert_eq!(written, d + m);
        assert_eq!(left_over, vec![current[0].clone(), next[1].clone()]);

        let (written, left_over) =
            find_config_written_for_configuration(&config, &[], &current).unwrap();
        assert_eq!(written, m + m + d);
        assert_eq!(left_over, current);
    }

    #[test]
    fn test_config_written_over_plan() {
        let config = SchedulerConfig::default();
        let m = config.column_cost(0).unwrap();
        let plan = vec![vec![module("x", "a", (0, 0))], vec![module("y", "a", (0, 0))]];
        let (written, configuration) = find_config_written(&config, &plan, &[]).unwrap();
        assert_eq!(written, m);
        assert_eq!(configuration[0].node_name, "x");
    }

    #[test]
    fn test_lowest_runtime() {
        let config = SchedulerConfig::default();
        let mut plans = PlanSet::new();
        plans.insert(
            vec![vec![module("x", "a", (0, 0))], vec![module("x", "b", (1, 1))]],
            data(100),
        );
        plans.insert(vec![vec![module("x", "a", (0, 0))]], data(1000));
        plans.insert(vec![vec![module("x", "c", (0, 0))]], data(1000));
        let best = choose_best_plan(&config, plans, &[]).unwrap();
        assert_eq!(best.plan_index, 1);
        assert_eq!(best.data_amount, 1000);
        assert_eq!(best.resulting_configuration, vec![module("x", "a", (0, 0))]);
    }

    #[test]
    fn test_max_utility_per_frame() {
        let mut config = SchedulerConfig::default();
        config.plan_selection = PlanSelection::MaxUtilityPerFrame;
        config.utility_scaler = 1.0;
        config.config_written_scaler = 0.0;
        config.utility_per_frame_scaler = 0.0;
        let mut plans = PlanSet::new();
        plans.insert(
            vec![vec![module("x", "a", (0, 0))], vec![module("x", "b", (1, 1))]],
            data(0),
        );
        plans.insert(vec![vec![module("x", "a", (0, 3))]], data(0));
        let best = choose_best_plan(&config, plans, &[]).unwrap();
        assert_eq!(best.plan_index, 1);

        // Only configuration matters now, the two run plan writes less.
        config.utility_scaler = 0.0;
        config.config_written_scaler = 1.0;
        let mut plans = PlanSet::new();
        plans.insert(
            vec![vec![module("x", "a", (0, 0))], vec![module("x", "b", (1, 1))]],
            data(0),
        );
        plans.insert(vec![vec![module("x", "a", (0, 3))]], data(0));
        let best = choose_best_plan(&config, plans, &[]).unwrap();
        assert_eq!(best.plan_index, 0);
    }

    #[test]
    fn test_no_plans() {
        let config = SchedulerConfig::default();
        assert!(choose_best_plan(&config, PlanSet::new(), &[]).is_err());
    }
}
