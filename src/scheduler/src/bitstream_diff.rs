use crate::plan::Run;
use common::{OperationType, ScheduledModule, SchedulerConfig, SchedulerError};

/// What has to be written to the fabric before a run can start.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct BitstreamLoadPlan {
    /// Module bitstreams followed by the routing bitstreams of cleared columns.
    pub bitstreams_to_load: Vec<String>,
    /// Every module left on the fabric in column order, true if the run doesn't use it.
    pub passthrough_modules: Vec<(OperationType, bool)>,
}

/// Modules of `current` that share no column with a module of `next`.
fn old_non_overlapping_modules<'a>(
    current: &'a [ScheduledModule],
    next: &[ScheduledModule],
) -> Vec<&'a ScheduledModule> {
    current
        .iter()
        .filter(|module| !next.iter().any(|n| n.overlaps(module)))
        .collect()
}

/// Splits both configurations into the modules without a same placement counterpart.
fn config_complements(
    current: &[ScheduledModule],
    next: &[ScheduledModule],
) -> (Vec<ScheduledModule>, Vec<ScheduledModule>) {
    let reduced_next = next
        .iter()
        .filter(|module| !current.iter().any(|c| c.is_same_placement(module)))
        .cloned()
        .collect();
    let reduced_current = current
        .iter()
        .filter(|module| !next.iter().any(|n| n.is_same_placement(module)))
        .cloned()
        .collect();
    (reduced_next, reduced_current)
}

/// Works out the bitstreams to load for the next run and updates the configuration.
///
/// Old modules away from the new ones stay on the fabric and get routed
/// through. Columns of other outdated modules get cleared with routing
/// bitstreams unless a new module covers them.
///
/// # Arguments
///
/// * `config` - Routing bitstream of every column.
/// * `current_configuration` - Modules on the fabric, replaced by the resulting configuration.
/// * `next_configuration` - Modules of the next run.
pub fn get_pr_bitstreams_to_load_with_passthrough_modules(
    config: &SchedulerConfig,
    current_configuration: &mut Run,
    next_configuration: &[ScheduledModule],
) -> Result<BitstreamLoadPlan, SchedulerError> {
    let old_routing_modules = old_non_overlapping_modules(current_configuration, next_configuration);
    let (reduced_next, reduced_current) =
        config_complements(current_configuration, next_configuration);
    let removable_modules: Vec<ScheduledModule> = reduced_current
        .into_iter()
        .filter(|module| !old_routing_modules.contains(&module))
        .collect();

    let mut written_columns = vec![false; config.routing_bitstreams.len()];
    for module in removable_modules.iter() {
        for column in module.start()..=module.end() {
            *common::require(written_columns.get_mut(column), "Routing column")? = true;
        }
    }
    let mut bitstreams_to_load = Vec::new();
    for module in reduced_next.iter() {
        for column in module.start()..=module.end() {
            *common::require(written_columns.get_mut(column), "Routing column")? = false;
        }
        bitstreams_to_load.push(module.bitstream.clone());
    }
    for (column, written) in written_columns.iter().enumerate() {
        if *written {
            bitstreams_to_load.push(config.routing_bitstreams[column].clone());
        }
    }

    let mut left_over: Run = current_configuration
        .iter()
        .filter(|module| !removable_modules.contains(module))
        .cloned()
        .collect();
    left_over.extend(reduced_next);
    left_over.sort_by_key(|module| module.start());

    let passthrough_modules = left_over
        .iter()
        .map(|module| {
            let used = next_configuration
                .iter()
                .any(|next| next.bitstream == module.bitstream);
            (module.operation, !used)
        })
        .collect();

    *current_configuration = left_over;
    Ok(BitstreamLoadPlan {
        bitstreams_to_load,
        passthrough_modules,
    })
}
