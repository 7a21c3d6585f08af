use crate::{OperationType, SchedulerError};
use std::collections::BTreeMap;

/// Longest search budget a config may ask for, one year.
pub const MAX_TIME_LIMIT_SECONDS: f64 = 31_536_000.0;

/// How the best plan is picked from the discovered ones.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanSelection {
    /// Least streaming plus configuration time.
    LowestRuntime,
    /// Best weighted mix of utility and written configuration.
    MaxUtilityPerFrame,
}

impl Default for PlanSelection {
    fn default() -> Self {
        PlanSelection::LowestRuntime
    }
}

/// Tunables of the scheduler.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Do not close a run early while nodes can still be placed in it.
    pub reduce_single_runs: bool,
    /// Prune branches with more runs than the shortest plan found.
    pub use_max_runs_cap: bool,
    /// Index into the placement heuristic table.
    pub heuristic_choice: usize,
    /// Bytes per second streamed through the fabric.
    pub streaming_speed: f64,
    /// Bytes per second written to the configuration port.
    pub configuration_speed: f64,
    /// Search time limit, negative to derive it from the cost estimate.
    pub time_limit_seconds: f64,
    /// Column type letter of every column.
    pub resource_string: String,
    /// Configuration bytes written per column type.
    pub cost_of_columns: BTreeMap<char, f64>,
    pub plan_selection: PlanSelection,
    pub utility_scaler: f64,
    pub config_written_scaler: f64,
    pub utility_per_frame_scaler: f64,
    /// Routing bitstream clearing each column.
    pub routing_bitstreams: Vec<String>,
    /// Configuration bytes per operation used by the time limit estimate.
    pub operation_costs: Option<BTreeMap<OperationType, f64>>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let mut cost_of_columns = BTreeMap::new();
        cost_of_columns.insert('M', 216.0 * 372.0);
        cost_of_columns.insert('D', 200.0 * 372.0);
        cost_of_columns.insert('B', 196.0 * 372.0);
        let resource_string = String::from("MMDMDBMMDBMMDMDBMMDBMMDMDBMMDBM");
        let routing_bitstreams = (0..resource_string.len())
            .map(|col| format!("RT_{}.bin", 95 - 3 * col))
            .collect();
        SchedulerConfig {
            reduce_single_runs: true,
            use_max_runs_cap: true,
            heuristic_choice: 0,
            streaming_speed: 4_800_000_000.0,
            configuration_speed: 66_000_000.0,
            time_limit_seconds: -1.0,
            resource_string,
            cost_of_columns,
            plan_selection: PlanSelection::LowestRuntime,
            utility_scaler: -1.0,
            config_written_scaler: -1.0,
            utility_per_frame_scaler: -1.0,
            routing_bitstreams,
            operation_costs: None,
        }
    }
}

impl SchedulerConfig {
    /// Reads a config, missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, SchedulerError> {
        serde_json::from_str(json)
            .map_err(|e| SchedulerError::ValidationError(format!("Malformed config: {}", e)))
    }

    /// Checks the config against the fabric it schedules for.
    ///
    /// # Arguments
    ///
    /// * `column_count` - Columns of the PR library.
    /// * `heuristic_count` - Number of available placement heuristics.
    pub fn validate(&self, column_count: usize, heuristic_count: usize) -> Result<(), SchedulerError> {
        if self.heuristic_choice >= heuristic_count {
            return Err(SchedulerError::ValidationError(format!(
                "Heuristic {} out of range, {} available",
                self.heuristic_choice, heuristic_count
            )));
        }
        if self.streaming_speed <= 0.0 || self.configuration_speed <= 0.0 {
            return Err(SchedulerError::ValidationError(String::from(
                "Streaming and configuration speeds must be positive",
            )));
        }
        if !self.time_limit_seconds.is_finite() || self.time_limit_seconds > MAX_TIME_LIMIT_SECONDS {
            return Err(SchedulerError::ValidationError(format!(
                "Time limit {} outside of the supported range",
                self.time_limit_seconds
            )));
        }
        if column_count > self.resource_string.len() {
            return Err(SchedulerError::ValidationError(format!(
                "Resource string covers {} columns, library uses {}",
                self.resource_string.len(),
                column_count
            )));
        }
        if column_count > self.routing_bitstreams.len() {
            return Err(SchedulerError::ValidationError(format!(
                "{} routing bitstreams given for {} columns",
                self.routing_bitstreams.len(),
                column_count
            )));
        }
        if let Some(c) = self
            .resource_string
            .chars()
            .find(|c| !self.cost_of_columns.contains_key(c))
        {
            return Err(SchedulerError::ValidationError(format!(
                "No column cost for resource {}",
                c
            )));
        }
        Ok(())
    }

    /// Configuration bytes of an operation for the time limit estimate.
    pub fn operation_cost(&self, op: OperationType, defaults: &BTreeMap<OperationType, f64>) -> f64 {
        self.operation_costs
            .as_ref()
            .and_then(|costs| costs.get(&op))
            .or_else(|| defaults.get(&op))
            .copied()
            .unwrap_or(0.0)
    }

    /// Configuration bytes of one column.
    pub fn column_cost(&self, column: usize) -> Result<f64, SchedulerError> {
        let resource = crate::require(
            self.resource_string.chars().nth(column),
            &format!("Resource of column {}", column),
        )?;
        crate::require(
            self.cost_of_columns.get(&resource).copied(),
            &format!("Cost of resource {}", resource),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.resource_string.len(), 31);
        assert_eq!(config.routing_bitstreams.len(), 31);
        assert_eq!(config.routing_bitstreams[0], "RT_95.bin");
        assert_eq!(config.routing_bitstreams[30], "RT_5.bin");
        assert_eq!(config.column_cost(0).unwrap(), 216.0 * 372.0);
        assert_eq!(config.column_cost(5).unwrap(), 196.0 * 372.0);
        assert!(config.column_cost(31).is_err());
        assert!(config.validate(31, 5).is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config =
            SchedulerConfig::from_json(r#"{"heuristic_choice": 3, "plan_selection": "MaxUtilityPerFrame"}"#)
                .unwrap();
        assert_eq!(config.heuristic_choice, 3);
        assert_eq!(config.plan_selection, PlanSelection::MaxUtilityPerFrame);
        assert!(config.reduce_single_runs);
        assert_eq!(config.cost_of_columns.len(), 3);
    }

    #[test]
    fn test_validate() {
        let mut config = SchedulerConfig::default();
        config.heuristic_choice = 5;
        assert!(config.validate(31, 5).is_err());
        let mut config = SchedulerConfig::default();
        assert!(config.validate(32, 5).is_err());
        config.resource_string = String::from("MX");
        assert!(config.validate(2, 5).is_err());
        let mut config = SchedulerConfig::default();
        config.streaming_speed = 0.0;
        assert!(config.validate(4, 5).is_err());
        let mut config = SchedulerConfig::default();
        config.time_limit_seconds = 1e20;
        assert!(config.validate(4, 5).is_err());
        config.time_limit_seconds = f64::NAN;
        assert!(config.validate(4, 5).is_err());
        config.time_limit_seconds = -1.0;
        assert!(config.validate(4, 5).is_ok());
    }

    #[test]
    fn test_operation_cost() {
        let mut defaults = BTreeMap::new();
        defaults.insert(OperationType::Filter, 10.0);
        let mut config = SchedulerConfig::default();
        assert_eq!(config.operation_cost(OperationType::Filter, &defaults), 10.0);
        assert_eq!(config.operation_cost(OperationType::Sobel, &defaults), 0.0);
        let mut overrides = BTreeMap::new();
        overrides.insert(OperationType::Filter, 3.0);
        config.operation_costs = Some(overrides);
        assert_eq!(config.operation_cost(OperationType::Filter, &defaults), 3.0);
    }
}
